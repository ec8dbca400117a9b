//! Output formatting utilities

use colored::*;
use keel_health::HealthReport;
use keel_types::{HealthStatus, PromotionStage, StageTransition, TransitionTrigger};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Tables for humans
    #[default]
    Table,
    /// JSON for scripts
    Json,
}

/// One labelled value
#[derive(Debug, Serialize, Tabled)]
pub struct Field {
    #[tabled(rename = "FIELD")]
    pub name: String,
    #[tabled(rename = "VALUE")]
    pub value: String,
}

impl Field {
    pub fn new(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A row of the stage history table
#[derive(Debug, Serialize, Tabled)]
pub struct TransitionRow {
    #[tabled(rename = "AT")]
    pub at: String,
    #[tabled(rename = "FROM")]
    pub from: String,
    #[tabled(rename = "TO")]
    pub to: String,
    #[tabled(rename = "TRIGGER")]
    pub trigger: String,
    #[tabled(rename = "ACTOR")]
    pub actor: String,
    #[tabled(rename = "REASON")]
    pub reason: String,
}

impl From<&StageTransition> for TransitionRow {
    fn from(t: &StageTransition) -> Self {
        Self {
            at: t.at.format("%Y-%m-%d %H:%M:%S").to_string(),
            from: t.from.to_string(),
            to: t.to.to_string(),
            trigger: trigger_label(&t.trigger),
            actor: t.actor.clone(),
            reason: t.reason.clone().unwrap_or_default(),
        }
    }
}

pub fn trigger_label(trigger: &TransitionTrigger) -> String {
    match trigger {
        TransitionTrigger::Promote => "promote".to_string(),
        TransitionTrigger::FirstHeartbeat => "first heartbeat".to_string(),
        TransitionTrigger::Rollback { mode } => format!("rollback ({})", mode),
    }
}

/// Print rows as a table, or as a JSON array
pub fn print_rows<T: Serialize + Tabled>(rows: Vec<T>, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No results".dimmed());
            } else {
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => print_json(&rows),
    }
}

/// Print a single value as JSON
pub fn print_json<T: Serialize + ?Sized>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("cannot render JSON: {}", e)),
    }
}

/// Print a health report
pub fn print_report(report: &HealthReport, format: OutputFormat) {
    if let OutputFormat::Json = format {
        print_json(report);
        return;
    }

    let fields = vec![
        Field::new("instance", &report.instance),
        Field::new("status", colored_health(report.status)),
        Field::new(
            "container",
            report
                .container
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "absent".to_string()),
        ),
        Field::new(
            "run mode",
            report
                .run_mode
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".into()),
        ),
        Field::new("restarts", format!("{} ({} in window)", report.restart_count, report.restarts_in_window)),
        Field::new("uptime", report.uptime_secs.map(duration).unwrap_or_else(|| "-".into())),
        Field::new("boot marker", yes_no(report.booted)),
        Field::new("history loaded", yes_no(report.history_loaded)),
        Field::new("notification ack", yes_no(report.notification_acked)),
        Field::new(
            "last heartbeat",
            report
                .heartbeat_age_secs
                .map(|age| format!("{} ago", duration(age)))
                .unwrap_or_else(|| "never".into()),
        ),
        Field::new("would execute", report.would_execute),
        Field::new("live executions", report.live_executions),
        Field::new("log lines", report.log_lines),
    ];
    println!("{}", Table::new(fields));
    for finding in &report.findings {
        println!("  {} {}", "•".yellow(), finding);
    }
}

pub fn colored_health(status: HealthStatus) -> String {
    let text = status.to_string();
    match status {
        HealthStatus::Healthy => text.green().to_string(),
        HealthStatus::Degraded => text.yellow().to_string(),
        HealthStatus::Failed => text.red().bold().to_string(),
        HealthStatus::Unknown => text.dimmed().to_string(),
    }
}

pub fn colored_stage(stage: PromotionStage) -> String {
    let text = stage.to_string();
    match stage {
        PromotionStage::Simulation => text.cyan().to_string(),
        PromotionStage::Live => text.yellow().bold().to_string(),
        PromotionStage::Monitoring => text.green().bold().to_string(),
    }
}

/// `3725` as `1h02m05s`
pub fn duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

//! Health Verifier - classify an instance from its runtime state and logs

use crate::audit::{LogMarkerAudit, NotificationAudit};
use crate::config::HealthConfig;
use crate::crash_loop::CrashLoopDetector;
use crate::error::HealthResult;
use crate::logline::LogLine;
use crate::report::HealthReport;
use chrono::{DateTime, Duration, Utc};
use keel_container::{ContainerError, ContainerRuntime, LogQuery};
use keel_types::{
    ContainerStatus, EventSource, HealthStatus, InstanceHandle, InstanceName, InstanceState,
    KeelEvent, KeelEventEnvelope,
};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

/// Log timestamps and the runtime's start time come from different clocks.
const START_SKEW_SECS: i64 = 2;

/// Advisory health verifier for the supervised instance
pub struct HealthVerifier {
    runtime: Arc<dyn ContainerRuntime>,
    config: HealthConfig,
    audit: Arc<dyn NotificationAudit>,
    detector: Mutex<CrashLoopDetector>,
    event_tx: broadcast::Sender<KeelEventEnvelope>,
}

/// What the logs of one check contained
struct LogEvidence {
    booted: bool,
    history_loaded: bool,
    notification_acked: bool,
    last_heartbeat: Option<DateTime<Utc>>,
    would_execute: usize,
    live_executions: usize,
    current_lines: usize,
}

impl HealthVerifier {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: HealthConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let audit = Arc::new(LogMarkerAudit::new(config.markers.notify_ack.clone()));
        let detector = Mutex::new(CrashLoopDetector::new(config.crash_window_secs));
        Self {
            runtime,
            config,
            audit,
            detector,
            event_tx,
        }
    }

    /// Use a different notification audit.
    pub fn with_audit(mut self, audit: Arc<dyn NotificationAudit>) -> Self {
        self.audit = audit;
        self
    }

    /// Share an existing event channel.
    pub fn with_events(mut self, event_tx: broadcast::Sender<KeelEventEnvelope>) -> Self {
        self.event_tx = event_tx;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeelEventEnvelope> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Check the instance behind `handle`.
    pub async fn check(&self, handle: &InstanceHandle) -> HealthResult<HealthReport> {
        let mut report = self.check_instance(&handle.name).await?;
        if report.container.is_some() {
            if let Some(state) = self.runtime.inspect(&handle.name).await? {
                if state.container_id != handle.container_id {
                    report
                        .findings
                        .push(format!("instance was replaced since {}", handle.short_id()));
                }
            }
        }
        Ok(report)
    }

    /// Check the named instance.
    #[instrument(skip(self), fields(target = %self.runtime.target()))]
    pub async fn check_instance(&self, name: &InstanceName) -> HealthResult<HealthReport> {
        let now = Utc::now();

        let Some(state) = self.runtime.inspect(name).await? else {
            let report = self.absent_report(name, now);
            self.emit(&report);
            return Ok(report);
        };

        let restarts_in_window = self.detector.lock().await.observe(
            &state.container_id,
            state.restart_count,
            state.started_at,
            now,
        );

        let raw = match self
            .runtime
            .logs(name, &LogQuery::tail(self.config.tail_lines))
            .await
        {
            Ok(lines) => lines,
            // Removed between inspect and logs
            Err(ContainerError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let lines: Vec<LogLine> = raw.iter().map(|l| LogLine::parse(l)).collect();
        let evidence = self.gather(name, &state, &lines).await?;

        let mut findings = Vec::new();
        let status = self.classify(&state, restarts_in_window, &evidence, now, &mut findings);

        let report = HealthReport {
            instance: name.clone(),
            status,
            checked_at: now,
            container: Some(state.status.clone()),
            run_mode: state.run_mode,
            restart_count: state.restart_count,
            restarts_in_window,
            uptime_secs: state.uptime_secs(now),
            booted: evidence.booted,
            history_loaded: evidence.history_loaded,
            notification_acked: evidence.notification_acked,
            last_heartbeat: evidence.last_heartbeat,
            heartbeat_age_secs: evidence
                .last_heartbeat
                .map(|t| (now - t).num_seconds().max(0)),
            would_execute: evidence.would_execute,
            live_executions: evidence.live_executions,
            log_lines: lines.len(),
            findings,
        };

        match report.status {
            HealthStatus::Healthy => info!(status = %report.status, "Health check"),
            HealthStatus::Unknown => debug!(status = %report.status, findings = ?report.findings, "Health check"),
            _ => warn!(status = %report.status, findings = ?report.findings, "Health check"),
        }
        self.emit(&report);
        Ok(report)
    }

    /// Poll until the instance is HEALTHY or FAILED, or `timeout` elapses.
    ///
    /// Returns the last report either way.
    pub async fn await_verdict(
        &self,
        handle: &InstanceHandle,
        timeout: std::time::Duration,
        poll: std::time::Duration,
    ) -> HealthResult<HealthReport> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let report = self.check(handle).await?;
            let now = tokio::time::Instant::now();
            if report.status.is_settled() || now >= deadline {
                return Ok(report);
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    async fn gather(
        &self,
        name: &InstanceName,
        state: &InstanceState,
        lines: &[LogLine],
    ) -> HealthResult<LogEvidence> {
        let markers = &self.config.markers;

        // Counters span the container's lifetime; markers only the current process.
        let would_execute = lines.iter().filter(|l| l.contains(&markers.would_execute)).count();
        let live_executions = lines.iter().filter(|l| l.contains(&markers.live_execute)).count();

        let run_start = state
            .started_at
            .map(|t| t - Duration::seconds(START_SKEW_SECS));
        let current: Vec<LogLine> = lines
            .iter()
            .filter(|l| match (run_start, l.timestamp) {
                (Some(start), Some(ts)) => ts >= start,
                _ => true,
            })
            .cloned()
            .collect();

        let booted = current.iter().any(|l| l.contains(&markers.boot));
        let history_loaded = current.iter().any(|l| l.contains(&markers.history));
        let last_heartbeat = current
            .iter()
            .filter(|l| l.contains(&markers.heartbeat))
            .filter_map(|l| l.timestamp)
            .max();
        let notification_acked = self.audit.started_acknowledged(name, &current).await?;

        Ok(LogEvidence {
            booted,
            history_loaded,
            notification_acked,
            last_heartbeat,
            would_execute,
            live_executions,
            current_lines: current.len(),
        })
    }

    fn classify(
        &self,
        state: &InstanceState,
        restarts_in_window: u32,
        evidence: &LogEvidence,
        now: DateTime<Utc>,
        findings: &mut Vec<String>,
    ) -> HealthStatus {
        let config = &self.config;

        // FAILED
        if restarts_in_window >= config.restart_threshold {
            findings.push(format!(
                "crash-loop: {} restarts in the last {}s",
                restarts_in_window, config.crash_window_secs
            ));
            return HealthStatus::Failed;
        }
        match state.status {
            ContainerStatus::Exited { exit_code } if exit_code != 0 => {
                findings.push(format!("exited with code {} and is not restarting", exit_code));
                return HealthStatus::Failed;
            }
            ContainerStatus::Dead => {
                findings.push("container is dead".to_string());
                return HealthStatus::Failed;
            }
            _ => {}
        }

        // UNKNOWN
        let uptime = state.uptime_secs(now);
        let within_grace = uptime
            .map(|u| u < config.boot_grace_secs as i64)
            .unwrap_or(true);
        if !evidence.booted && (evidence.current_lines < config.min_lines || within_grace) {
            findings.push(format!(
                "waiting for boot marker ({} lines so far)",
                evidence.current_lines
            ));
            return HealthStatus::Unknown;
        }

        // DEGRADED
        if !state.status.is_running() {
            findings.push(format!("container is {}", state.status));
        }
        if !evidence.booted {
            findings.push("boot marker missing".to_string());
        }
        if !evidence.history_loaded {
            findings.push("historical data marker missing".to_string());
        }
        if config.require_notify_ack && !evidence.notification_acked {
            findings.push("started notification not acknowledged".to_string());
        }
        let max_age = config.max_heartbeat_age_secs();
        match evidence.last_heartbeat {
            Some(t) => {
                let age = (now - t).num_seconds();
                if age > max_age {
                    findings.push(format!("heartbeat {}s old (limit {}s)", age, max_age));
                }
            }
            None => {
                if uptime.map(|u| u > max_age).unwrap_or(false) {
                    findings.push(format!("no heartbeat after {}s", uptime.unwrap_or(0)));
                }
            }
        }

        if findings.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    fn absent_report(&self, name: &InstanceName, now: DateTime<Utc>) -> HealthReport {
        HealthReport {
            instance: name.clone(),
            status: HealthStatus::Failed,
            checked_at: now,
            container: None,
            run_mode: None,
            restart_count: 0,
            restarts_in_window: 0,
            uptime_secs: None,
            booted: false,
            history_loaded: false,
            notification_acked: false,
            last_heartbeat: None,
            heartbeat_age_secs: None,
            would_execute: 0,
            live_executions: 0,
            log_lines: 0,
            findings: vec!["instance not found".to_string()],
        }
    }

    fn emit(&self, report: &HealthReport) {
        let envelope = KeelEventEnvelope::new(
            KeelEvent::HealthChecked {
                name: report.instance.clone(),
                status: report.status,
            },
            EventSource::Health,
            self.runtime.target(),
        );
        let _ = self.event_tx.send(envelope);
    }
}

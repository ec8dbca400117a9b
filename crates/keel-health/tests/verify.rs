//! Health classification against the in-memory runtime.

use chrono::{Duration, Utc};
use keel_container::{ContainerConfig, ContainerLifecycleManager, InMemoryRuntime};
use keel_health::{HealthConfig, HealthVerifier};
use keel_types::{
    ContainerStatus, DeploymentConfig, ExchangeCredentials, HealthStatus, InstanceHandle,
    InstanceName, KeelEvent, LogLevel, NotificationIdentity, ReleaseId, RunMode, Secret,
};
use std::sync::Arc;

const CONTEXT: &str = "/opt/keel/current";

fn config(run_mode: RunMode) -> DeploymentConfig {
    DeploymentConfig {
        exchange: ExchangeCredentials {
            api_key: Secret::new("key"),
            api_secret: Secret::new("secret"),
            testnet: true,
        },
        notification: NotificationIdentity {
            bot_token: Secret::new("token"),
            chat_id: "1001".into(),
        },
        run_mode,
        storage_path: "/app/data/bot.db".into(),
        log_level: LogLevel::Info,
    }
}

async fn started(run_mode: RunMode) -> (Arc<InMemoryRuntime>, HealthVerifier, InstanceHandle) {
    let runtime = Arc::new(InMemoryRuntime::new("trading-bot"));
    runtime.add_context(CONTEXT, &["Dockerfile", "requirements.txt", "main.py"]);
    let manager = ContainerLifecycleManager::new(runtime.clone(), ContainerConfig::default());
    let image = manager.build(CONTEXT, &ReleaseId::new("a1")).await.unwrap();
    let handle = manager.run(&image, &config(run_mode)).await.unwrap();
    let verifier = HealthVerifier::new(runtime.clone(), HealthConfig::default());
    (runtime, verifier, handle)
}

fn boot(runtime: &InMemoryRuntime) {
    runtime.push_log("bot", "[INFO] [BOOT] Historical data loaded for all coins.");
    runtime.push_log("bot", "[INFO] [NOTIFY] started");
    runtime.push_log("bot", "[INFO] [BOOT] ✅ All systems go. Running...");
}

#[tokio::test]
async fn booted_instance_with_fresh_heartbeat_is_healthy() {
    let (runtime, verifier, handle) = started(RunMode::Simulation).await;
    runtime.age("bot", 300);
    boot(&runtime);
    runtime.push_log("bot", "[INFO] [HEARTBEAT] alive");

    let report = verifier.check(&handle).await.unwrap();

    assert_eq!(report.status, HealthStatus::Healthy, "{}", report);
    assert!(report.booted && report.history_loaded && report.notification_acked);
    assert!(report.has_heartbeat());
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn young_instance_without_logs_is_unknown() {
    let (runtime, verifier, handle) = started(RunMode::Simulation).await;
    runtime.push_log("bot", "[INFO] starting");

    let report = verifier.check(&handle).await.unwrap();
    assert_eq!(report.status, HealthStatus::Unknown);
}

#[tokio::test]
async fn stale_heartbeat_is_degraded() {
    let (runtime, verifier, handle) = started(RunMode::Live).await;
    runtime.age("bot", 600);
    boot(&runtime);
    let stale = Utc::now() - Duration::seconds(400);
    runtime.push_raw_log(
        "bot",
        format!("{} [INFO] [HEARTBEAT] alive", stale.to_rfc3339()),
    );

    let report = verifier.check(&handle).await.unwrap();

    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report.heartbeat_age_secs.unwrap() >= 400);
    assert!(report.findings.iter().any(|f| f.contains("heartbeat")));
}

#[tokio::test]
async fn missing_notification_ack_is_degraded() {
    let (runtime, verifier, handle) = started(RunMode::Live).await;
    runtime.age("bot", 300);
    runtime.push_log("bot", "[INFO] [BOOT] Historical data loaded for all coins.");
    runtime.push_log("bot", "[INFO] [BOOT] ✅ All systems go. Running...");
    runtime.push_log("bot", "[INFO] [HEARTBEAT] alive");

    let report = verifier.check(&handle).await.unwrap();

    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report
        .findings
        .iter()
        .any(|f| f.contains("notification not acknowledged")));
}

#[tokio::test]
async fn markers_from_previous_process_do_not_count() {
    let (runtime, verifier, handle) = started(RunMode::Live).await;
    let before = Utc::now() - Duration::seconds(900);
    runtime.push_raw_log(
        "bot",
        format!("{} [INFO] [BOOT] ✅ All systems go. Running...", before.to_rfc3339()),
    );
    runtime.record_restart("bot");

    let report = verifier.check(&handle).await.unwrap();

    assert!(!report.booted);
    assert_eq!(report.status, HealthStatus::Unknown);
}

#[tokio::test]
async fn repeated_restarts_are_a_crash_loop() {
    let (runtime, verifier, handle) = started(RunMode::Live).await;
    verifier.check(&handle).await.unwrap();
    for _ in 0..3 {
        runtime.record_restart("bot");
    }

    let report = verifier.check(&handle).await.unwrap();

    assert_eq!(report.status, HealthStatus::Failed);
    assert_eq!(report.restarts_in_window, 3);
    assert!(report.findings[0].starts_with("crash-loop"));
}

#[tokio::test]
async fn one_recent_restart_after_older_ones_is_not_a_crash_loop() {
    let (runtime, verifier, handle) = started(RunMode::Live).await;
    for _ in 0..3 {
        runtime.record_restart("bot");
    }

    // First look at this container: the lifetime count cannot be dated.
    let report = verifier.check(&handle).await.unwrap();

    assert_eq!(report.restart_count, 3);
    assert_eq!(report.restarts_in_window, 1);
    assert_ne!(report.status, HealthStatus::Failed);
    assert!(!report.findings.iter().any(|f| f.starts_with("crash-loop")));
}

#[tokio::test]
async fn non_zero_exit_is_failed() {
    let (runtime, verifier, handle) = started(RunMode::Live).await;
    runtime.set_status("bot", ContainerStatus::Exited { exit_code: 1 });

    let report = verifier.check(&handle).await.unwrap();
    assert_eq!(report.status, HealthStatus::Failed);
}

#[tokio::test]
async fn absent_instance_is_failed() {
    let runtime = Arc::new(InMemoryRuntime::default());
    let verifier = HealthVerifier::new(runtime, HealthConfig::default());

    let report = verifier
        .check_instance(&InstanceName::new("bot"))
        .await
        .unwrap();

    assert_eq!(report.status, HealthStatus::Failed);
    assert!(report.container.is_none());
}

#[tokio::test]
async fn simulation_counts_would_execute_without_live_orders() {
    let (runtime, verifier, handle) = started(RunMode::Simulation).await;
    runtime.age("bot", 300);
    boot(&runtime);
    runtime.push_log(
        "bot",
        "[INFO] [DRY RUN] 🔔 WOULD EXECUTE: LONG ETHUSDT on Slot #1",
    );
    runtime.push_log("bot", "[INFO] [HEARTBEAT] alive");

    let report = verifier.check(&handle).await.unwrap();

    assert_eq!(report.would_execute, 1);
    assert_eq!(report.live_executions, 0);
}

#[tokio::test]
async fn replaced_instance_is_noted() {
    let (runtime, verifier, mut handle) = started(RunMode::Simulation).await;
    runtime.age("bot", 300);
    boot(&runtime);
    handle.container_id = "feedfacefeedface".into();

    let report = verifier.check(&handle).await.unwrap();
    assert!(report.findings.iter().any(|f| f.contains("replaced")));
}

#[tokio::test]
async fn checks_are_published() {
    let (runtime, verifier, handle) = started(RunMode::Simulation).await;
    let mut events = verifier.subscribe();
    runtime.push_log("bot", "[INFO] starting");

    verifier.check(&handle).await.unwrap();

    let envelope = events.try_recv().unwrap();
    assert!(matches!(
        envelope.event,
        KeelEvent::HealthChecked {
            status: HealthStatus::Unknown,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn await_verdict_returns_last_report_at_timeout() {
    let (runtime, verifier, handle) = started(RunMode::Simulation).await;
    runtime.push_log("bot", "[INFO] starting");

    let report = verifier
        .await_verdict(
            &handle,
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(report.status, HealthStatus::Unknown);
}

#[tokio::test(start_paused = true)]
async fn await_verdict_stops_once_settled() {
    let (runtime, verifier, handle) = started(RunMode::Simulation).await;
    runtime.age("bot", 300);
    boot(&runtime);
    runtime.push_log("bot", "[INFO] [HEARTBEAT] alive");

    let before = tokio::time::Instant::now();
    let report = verifier
        .await_verdict(
            &handle,
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert!(report.is_healthy());
    assert_eq!(tokio::time::Instant::now(), before);
}

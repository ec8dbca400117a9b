//! Promotion stage machine against the in-memory runtime.

use chrono::{Duration, Utc};
use keel_container::{ContainerConfig, ContainerLifecycleManager, InMemoryRuntime};
use keel_control::{
    ControlError, InMemoryStageStore, JsonFileStageStore, OperatorConfirmation, PromotionGate,
    PromotionPolicy, StageController, StageRecord, StageStore,
};
use keel_health::{HealthConfig, HealthVerifier};
use keel_types::{
    ContainerStatus, DeploymentConfig, ExchangeCredentials, KeelEvent, LogLevel,
    NotificationIdentity, PromotionStage, ReleaseId, RollbackMode, RunMode, Secret,
    TransitionTrigger,
};
use std::sync::Arc;

const CONTEXT: &str = "/opt/keel/current";
const ENV_FILE: &str = "/opt/keel/shared/.env";

fn config() -> DeploymentConfig {
    DeploymentConfig {
        exchange: ExchangeCredentials {
            api_key: Secret::new("key"),
            api_secret: Secret::new("secret"),
            testnet: false,
        },
        notification: NotificationIdentity {
            bot_token: Secret::new("token"),
            chat_id: "1001".into(),
        },
        run_mode: RunMode::Simulation,
        storage_path: "/app/data/bot.db".into(),
        log_level: LogLevel::Info,
    }
}

fn live_config() -> DeploymentConfig {
    config().with_run_mode(RunMode::Live)
}

struct Fixture {
    runtime: Arc<InMemoryRuntime>,
    lifecycle: Arc<ContainerLifecycleManager>,
    controller: StageController,
}

async fn fixture_with(store: Arc<dyn StageStore>, policy: PromotionPolicy) -> Fixture {
    let runtime = Arc::new(InMemoryRuntime::new("trading-bot"));
    runtime.add_context(CONTEXT, &["Dockerfile", "requirements.txt", "main.py"]);
    let lifecycle = Arc::new(ContainerLifecycleManager::new(
        runtime.clone(),
        ContainerConfig::default(),
    ));
    let image = lifecycle.build(CONTEXT, &ReleaseId::new("a1")).await.unwrap();
    lifecycle.run(&image, &config()).await.unwrap();

    let verifier = Arc::new(HealthVerifier::new(runtime.clone(), HealthConfig::default()));
    let controller = StageController::new(store, lifecycle.clone(), verifier, policy);
    Fixture {
        runtime,
        lifecycle,
        controller,
    }
}

async fn fixture() -> Fixture {
    fixture_with(Arc::new(InMemoryStageStore::new()), PromotionPolicy::default()).await
}

fn healthy_logs(runtime: &InMemoryRuntime) {
    runtime.age("bot", 300);
    runtime.push_log("bot", "[INFO] [BOOT] Historical data loaded for all coins.");
    runtime.push_log("bot", "[INFO] [NOTIFY] started");
    runtime.push_log("bot", "[INFO] [BOOT] ✅ All systems go. Running...");
    runtime.push_log("bot", "[INFO] [HEARTBEAT] alive");
}

fn ack() -> OperatorConfirmation {
    OperatorConfirmation::new("ops", true)
}

#[tokio::test]
async fn promotion_requires_acknowledged_signals() {
    let f = fixture().await;

    let err = f
        .controller
        .promote(&live_config(), &OperatorConfirmation::new("ops", false))
        .await
        .unwrap_err();

    assert!(matches!(err, ControlError::ConfirmationRequired));
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Simulation);
    assert_eq!(f.runtime.runs(), 1);
}

#[tokio::test]
async fn promotion_with_dry_run_still_set_is_blocked() {
    let f = fixture().await;
    let mut events = f.controller.subscribe();

    let err = f.controller.promote(&config(), &ack()).await.unwrap_err();

    match err {
        ControlError::PromotionBlocked(reason) => assert!(reason.contains("DRY_RUN")),
        other => panic!("expected PromotionBlocked, got {other:?}"),
    }
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Simulation);
    assert_eq!(f.runtime.runs(), 1);
    assert_eq!(
        f.runtime.container("bot").unwrap().run_mode,
        Some(RunMode::Simulation)
    );
    assert!(matches!(
        events.try_recv().unwrap().event,
        KeelEvent::PromotionBlocked { .. }
    ));
}

#[tokio::test]
async fn advisory_gate_warns_and_promotes() {
    let f = fixture().await;
    let mut events = f.controller.subscribe();

    let handle = f.controller.promote(&live_config(), &ack()).await.unwrap();

    assert_eq!(handle.run_mode, RunMode::Live);
    assert_eq!(f.runtime.container("bot").unwrap().run_mode, Some(RunMode::Live));
    assert!(f.runtime.env_file(ENV_FILE).unwrap().contains("DRY_RUN=false"));
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Live);

    let kinds: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| match e.event {
            KeelEvent::PromotionWarning { .. } => "warning",
            KeelEvent::StageChanged { .. } => "stage",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["warning", "stage"]);
}

#[tokio::test]
async fn require_healthy_gate_blocks_unverified_promotion() {
    let policy = PromotionPolicy {
        gate: PromotionGate::RequireHealthy,
        ..Default::default()
    };
    let f = fixture_with(Arc::new(InMemoryStageStore::new()), policy).await;

    let err = f.controller.promote(&live_config(), &ack()).await.unwrap_err();

    assert!(matches!(err, ControlError::PromotionBlocked(_)));
    assert_eq!(f.runtime.runs(), 1);
    assert_eq!(
        f.runtime.container("bot").unwrap().run_mode,
        Some(RunMode::Simulation)
    );
}

#[tokio::test]
async fn require_healthy_gate_allows_observed_healthy_instance() {
    let store = Arc::new(InMemoryStageStore::new());
    store
        .save(&StageRecord::new(Utc::now() - Duration::hours(48)))
        .await
        .unwrap();
    let policy = PromotionPolicy {
        gate: PromotionGate::RequireHealthy,
        ..Default::default()
    };
    let f = fixture_with(store, policy).await;
    healthy_logs(&f.runtime);

    f.controller.promote(&live_config(), &ack()).await.unwrap();
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Live);
}

#[tokio::test]
async fn promote_outside_simulation_is_invalid() {
    let f = fixture().await;
    f.controller.promote(&live_config(), &ack()).await.unwrap();

    let err = f.controller.promote(&live_config(), &ack()).await.unwrap_err();
    assert!(matches!(
        err,
        ControlError::InvalidTransition {
            from: PromotionStage::Live,
            ..
        }
    ));
}

#[tokio::test]
async fn first_heartbeat_moves_live_to_monitoring() {
    let f = fixture().await;
    f.controller.promote(&live_config(), &ack()).await.unwrap();

    f.controller.observe().await.unwrap();
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Live);

    healthy_logs(&f.runtime);
    let report = f.controller.observe().await.unwrap();
    assert!(report.is_healthy());

    let record = f.controller.record().await.unwrap();
    assert_eq!(record.stage, PromotionStage::Monitoring);
    let last = record.last_transition.unwrap();
    assert_eq!(last.trigger, TransitionTrigger::FirstHeartbeat);
    assert_eq!(last.actor, "keel");
}

#[tokio::test]
async fn heartbeat_from_simulation_instance_does_not_enter_monitoring() {
    let f = fixture().await;
    let promoted = f.controller.promote(&live_config(), &ack()).await.unwrap();
    f.lifecycle.replace(&promoted.image, &config()).await.unwrap();
    healthy_logs(&f.runtime);

    let report = f.controller.observe().await.unwrap();

    assert!(report.is_healthy());
    assert_eq!(report.run_mode, Some(RunMode::Simulation));
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Live);
}

#[tokio::test]
async fn healthy_simulation_is_never_promoted_automatically() {
    let f = fixture().await;
    healthy_logs(&f.runtime);

    for _ in 0..5 {
        let report = f.controller.observe().await.unwrap();
        assert!(report.is_healthy());
    }

    let record = f.controller.record().await.unwrap();
    assert_eq!(record.stage, PromotionStage::Simulation);
    assert!(record.history.is_empty());
    assert_eq!(f.runtime.runs(), 1);
}

#[tokio::test]
async fn rollback_in_monitoring_replaces_with_simulation_in_one_cycle() {
    let f = fixture().await;
    f.controller.promote(&live_config(), &ack()).await.unwrap();
    healthy_logs(&f.runtime);
    f.runtime
        .push_log("bot", "[INFO] [EXECUTE] LONG ETHUSDT on Slot #1");
    f.controller.observe().await.unwrap();
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Monitoring);
    let runs_before = f.runtime.runs();

    let handle = f
        .controller
        .rollback(
            RollbackMode::Simulate,
            &live_config(),
            "ops",
            Some("unexpected fills".into()),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(handle.run_mode, RunMode::Simulation);
    assert_eq!(f.runtime.runs(), runs_before + 1);
    assert_eq!(
        f.runtime.container("bot").unwrap().run_mode,
        Some(RunMode::Simulation)
    );
    assert!(f.runtime.env_file(ENV_FILE).unwrap().contains("DRY_RUN=true"));

    let record = f.controller.record().await.unwrap();
    assert_eq!(record.stage, PromotionStage::Simulation);
    assert_eq!(record.run_mode, RunMode::Simulation);
    assert_eq!(
        record.last_transition.unwrap().reason.as_deref(),
        Some("unexpected fills")
    );

    let report = f.controller.observe().await.unwrap();
    assert_eq!(report.live_executions, 0);
}

#[tokio::test]
async fn halt_rollback_stops_without_replacing() {
    let f = fixture().await;
    f.controller.promote(&live_config(), &ack()).await.unwrap();
    let runs_before = f.runtime.runs();

    let handle = f
        .controller
        .rollback(RollbackMode::Halt, &config(), "ops", None)
        .await
        .unwrap();

    assert!(handle.is_none());
    assert_eq!(f.runtime.runs(), runs_before);
    assert_eq!(
        f.runtime.container("bot").unwrap().status,
        ContainerStatus::Exited { exit_code: 0 }
    );
    assert_eq!(f.controller.stage().await.unwrap(), PromotionStage::Simulation);
}

#[tokio::test]
async fn stage_survives_a_new_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stage.json");

    let f = fixture_with(
        Arc::new(JsonFileStageStore::new(&path)),
        PromotionPolicy::default(),
    )
    .await;
    f.controller.promote(&live_config(), &ack()).await.unwrap();
    drop(f);

    let again = fixture_with(
        Arc::new(JsonFileStageStore::new(&path)),
        PromotionPolicy::default(),
    )
    .await;
    let record = again.controller.record().await.unwrap();
    assert_eq!(record.stage, PromotionStage::Live);
    assert_eq!(record.history.len(), 1);
}

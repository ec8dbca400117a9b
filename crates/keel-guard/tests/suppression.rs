use keel_config::ConfigStore;
use keel_guard::{
    boot, DecisionPoint, Direction, ExecutionGuard, GuardError, Outcome, RecordingNotifier,
    RecordingOrderSink,
};
use keel_types::{DeploymentConfig, RunMode};
use proptest::prelude::*;
use std::sync::Arc;

fn config(dry_run: &str) -> DeploymentConfig {
    let store = ConfigStore::from_map(vec![
        ("BYBIT_API_KEY", "key-123"),
        ("BYBIT_API_SECRET", "secret-456"),
        ("TELEGRAM_BOT_TOKEN", "tg-token"),
        ("TELEGRAM_CHAT_ID", "42"),
        ("DRY_RUN", dry_run),
        ("DB_PATH", "/app/data/bot.db"),
    ]);
    boot(&store).unwrap()
}

fn guard(dry_run: &str) -> (ExecutionGuard, Arc<RecordingOrderSink>, Arc<RecordingNotifier>) {
    let sink = Arc::new(RecordingOrderSink::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let guard = ExecutionGuard::new(config(dry_run), sink.clone(), notifier.clone());
    (guard, sink, notifier)
}

fn eth_long() -> DecisionPoint {
    DecisionPoint {
        symbol: "ETHUSDT".into(),
        direction: Direction::Long,
        slot: 1,
        size: 50.0,
    }
}

#[tokio::test]
async fn dry_run_signal_is_advisory_only() {
    let (guard, sink, notifier) = guard("true");
    assert_eq!(guard.run_mode(), RunMode::Simulation);

    let outcome = guard.handle(&eth_long()).await.unwrap();

    assert_eq!(outcome, Outcome::Simulated);
    assert_eq!(sink.count(), 0);
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("DRY RUN SIGNAL"));
    assert!(messages[0].contains("LONG"));
    assert!(messages[0].contains("ETHUSDT"));
    assert!(messages[0].contains("$50.00"));
}

#[tokio::test]
async fn missing_dry_run_defaults_to_simulation() {
    let store = ConfigStore::from_map(vec![
        ("BYBIT_API_KEY", "key-123"),
        ("BYBIT_API_SECRET", "secret-456"),
        ("TELEGRAM_BOT_TOKEN", "tg-token"),
        ("TELEGRAM_CHAT_ID", "42"),
    ]);
    let config = boot(&store).unwrap();
    assert_eq!(config.run_mode, RunMode::Simulation);
}

#[tokio::test]
async fn undeliverable_notification_does_not_fail_simulation() {
    let (guard, sink, notifier) = guard("true");
    notifier.fail(true);

    let outcome = guard.handle(&eth_long()).await.unwrap();

    assert_eq!(outcome, Outcome::Simulated);
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn live_mode_places_the_order() {
    let (guard, sink, notifier) = guard("false");

    let outcome = guard.handle(&eth_long()).await.unwrap();

    match outcome {
        Outcome::Executed(receipt) => assert_eq!(receipt.order_id, "order-1"),
        other => panic!("expected an order, got {:?}", other),
    }
    assert_eq!(sink.placed(), vec![eth_long()]);
    assert!(notifier.messages()[0].contains("NEW TRADE"));
}

#[tokio::test]
async fn rejected_live_order_is_an_error() {
    let (guard, sink, notifier) = guard("false");
    sink.reject(true);

    let err = guard.handle(&eth_long()).await.unwrap_err();

    assert!(matches!(err, GuardError::Order(_)));
    assert!(notifier.messages().is_empty());
}

fn decision() -> impl Strategy<Value = DecisionPoint> {
    (
        "[A-Z]{2,6}USDT",
        prop_oneof![Just(Direction::Long), Just(Direction::Short)],
        1u32..=20,
        1.0f64..10_000.0,
    )
        .prop_map(|(symbol, direction, slot, size)| DecisionPoint {
            symbol,
            direction,
            slot,
            size,
        })
}

proptest! {
    #[test]
    fn simulation_never_reaches_the_order_sink(decisions in prop::collection::vec(decision(), 0..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (guard, sink, notifier) = guard("true");

        rt.block_on(async {
            for d in &decisions {
                let outcome = guard.handle(d).await.unwrap();
                assert_eq!(outcome, Outcome::Simulated);
            }
        });

        prop_assert_eq!(sink.count(), 0);
        prop_assert_eq!(notifier.messages().len(), decisions.len());
    }
}

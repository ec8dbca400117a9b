//! Execution Guard - the single gate between a decision point and an order
//!
//! The guard owns the service's configuration. In simulation every decision
//! point is logged with the would-execute marker and sent as an advisory
//! notification; the order sink is never called. In live mode the order is
//! placed and logged with the execute marker.

use crate::error::GuardResult;
use crate::notify::Notifier;
use async_trait::async_trait;
use keel_types::{markers, DeploymentConfig, RunMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// A detected condition that would normally place an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPoint {
    pub symbol: String,
    pub direction: Direction,
    pub slot: u32,
    /// Position size in quote currency
    pub size: f64,
}

/// Exchange acknowledgment of a placed order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: String,
}

/// Places real orders
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn place(&self, decision: &DecisionPoint) -> GuardResult<OrderReceipt>;

    /// Get the sink name
    fn name(&self) -> &str;
}

/// What the guard did with a decision point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Logged and notified only
    Simulated,
    /// Order placed
    Executed(OrderReceipt),
}

/// Gate between decision points and the order sink
pub struct ExecutionGuard {
    config: DeploymentConfig,
    sink: Arc<dyn OrderSink>,
    notifier: Arc<dyn Notifier>,
}

impl ExecutionGuard {
    pub fn new(
        config: DeploymentConfig,
        sink: Arc<dyn OrderSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            sink,
            notifier,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn run_mode(&self) -> RunMode {
        self.config.run_mode
    }

    /// Act on a decision point according to the run mode.
    #[instrument(skip(self, decision), fields(symbol = %decision.symbol, direction = %decision.direction, run_mode = %self.config.run_mode))]
    pub async fn handle(&self, decision: &DecisionPoint) -> GuardResult<Outcome> {
        match self.config.run_mode {
            RunMode::Simulation => {
                info!(
                    "{}: {} {} on Slot #{}. Size: ${:.2}",
                    markers::WOULD_EXECUTE,
                    decision.direction,
                    decision.symbol,
                    decision.slot,
                    decision.size
                );
                let text = format!(
                    "📋 <b>DRY RUN SIGNAL</b>\n\n{} {} <code>{}</code>\nSlot #{}\nSize: ${:.2}",
                    emoji(decision.direction),
                    decision.direction,
                    decision.symbol,
                    decision.slot,
                    decision.size
                );
                self.notify(&text).await;
                Ok(Outcome::Simulated)
            }
            RunMode::Live => {
                let receipt = self.sink.place(decision).await?;
                info!(
                    order_id = %receipt.order_id,
                    "{} {} {} on Slot #{}. Size: ${:.2}",
                    markers::LIVE_EXECUTE,
                    decision.direction,
                    decision.symbol,
                    decision.slot,
                    decision.size
                );
                let text = format!(
                    "{} <b>NEW TRADE: {}</b>\n\nSymbol: <code>{}</code>\nSlot: #{}\nSize: ${:.2}",
                    emoji(decision.direction),
                    decision.direction,
                    decision.symbol,
                    decision.slot,
                    decision.size
                );
                self.notify(&text).await;
                Ok(Outcome::Executed(receipt))
            }
        }
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.notifier.send(text).await {
            warn!(notifier = self.notifier.name(), error = %e, "Notification not delivered");
        }
    }
}

fn emoji(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "🟢",
        Direction::Short => "🔴",
    }
}

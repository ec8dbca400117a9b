//! Order sink double

use crate::error::{GuardError, GuardResult};
use crate::guard::{DecisionPoint, OrderReceipt, OrderSink};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Records every placement instead of calling an exchange
#[derive(Default)]
pub struct RecordingOrderSink {
    placed: Mutex<Vec<DecisionPoint>>,
    next_id: AtomicU64,
    reject: AtomicBool,
}

impl RecordingOrderSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject subsequent orders.
    pub fn reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn placed(&self) -> Vec<DecisionPoint> {
        self.placed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self) -> usize {
        self.placed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl OrderSink for RecordingOrderSink {
    async fn place(&self, decision: &DecisionPoint) -> GuardResult<OrderReceipt> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(GuardError::Order("rejected".into()));
        }
        self.placed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(decision.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderReceipt {
            order_id: format!("order-{}", n),
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}

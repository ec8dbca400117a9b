//! Periodic liveness marker

use keel_types::markers;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

/// Background task logging the heartbeat marker at a fixed interval
///
/// The first beat is logged immediately.
pub struct Heartbeat {
    beats: Arc<AtomicU64>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn spawn(interval: Duration) -> Self {
        let beats = Arc::new(AtomicU64::new(0));
        let (stop, mut stopped) = oneshot::channel();

        let counter = beats.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        info!(beat = n, uptime_secs = started.elapsed().as_secs(), "{} alive", markers::HEARTBEAT);
                    }
                    _ = &mut stopped => break,
                }
            }
        });

        Self {
            beats,
            stop: Some(stop),
            handle,
        }
    }

    /// Beats logged so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_beats_at_interval() {
        let heartbeat = Heartbeat::spawn(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(heartbeat.beats(), 3);
        heartbeat.stop().await;
    }
}

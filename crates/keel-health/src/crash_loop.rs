//! Sliding-window restart tracking

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Tracks a container's restart counter across checks
///
/// The runtime only reports a cumulative restart count. The detector keeps
/// the (time, count) samples inside the window and reports how many
/// restarts happened within it. A new container id resets the history.
#[derive(Debug, Clone)]
pub struct CrashLoopDetector {
    window: Duration,
    container_id: Option<String>,
    samples: VecDeque<(DateTime<Utc>, u32)>,
}

impl CrashLoopDetector {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::seconds(window_secs as i64),
            container_id: None,
            samples: VecDeque::new(),
        }
    }

    /// Record an observation and return restarts within the window.
    ///
    /// On the first sample of a container only the restart that produced the
    /// current process can be placed in time, so at most one counts.
    pub fn observe(
        &mut self,
        container_id: &str,
        restart_count: u32,
        last_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> u32 {
        if self.container_id.as_deref() != Some(container_id) {
            self.container_id = Some(container_id.to_string());
            self.samples.clear();
            let baseline = match last_start {
                Some(t) if now - t <= self.window => restart_count.saturating_sub(1),
                _ => restart_count,
            };
            self.samples.push_back((now, baseline));
        }

        self.samples.push_back((now, restart_count));
        let horizon = now - self.window;
        // Keep one sample at or before the horizon as the baseline.
        while self.samples.len() > 1 && self.samples[1].0 <= horizon {
            self.samples.pop_front();
        }

        let baseline = self.samples.front().map(|(_, c)| *c).unwrap_or(restart_count);
        restart_count.saturating_sub(baseline)
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.container_id = None;
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_714_557_600 + secs, 0).unwrap()
    }

    #[test]
    fn test_restarts_accumulate_in_window() {
        let mut d = CrashLoopDetector::new(600);
        assert_eq!(d.observe("c1", 0, Some(t(0)), t(10)), 0);
        assert_eq!(d.observe("c1", 2, Some(t(50)), t(60)), 2);
        assert_eq!(d.observe("c1", 4, Some(t(110)), t(120)), 4);
    }

    #[test]
    fn test_old_restarts_slide_out() {
        let mut d = CrashLoopDetector::new(600);
        d.observe("c1", 0, Some(t(0)), t(0));
        d.observe("c1", 3, Some(t(100)), t(100));
        // Long quiet period afterwards.
        d.observe("c1", 3, Some(t(100)), t(800));
        assert_eq!(d.observe("c1", 3, Some(t(100)), t(1500)), 0);
        assert_eq!(d.observe("c1", 4, Some(t(1550)), t(1560)), 1);
    }

    #[test]
    fn test_first_sample_with_recent_start_counts_one_restart() {
        let mut d = CrashLoopDetector::new(600);
        assert_eq!(d.observe("c1", 3, Some(t(95)), t(100)), 1);
        assert_eq!(d.observe("c1", 5, Some(t(150)), t(160)), 3);
    }

    #[test]
    fn test_fresh_container_has_no_restarts() {
        let mut d = CrashLoopDetector::new(600);
        assert_eq!(d.observe("c1", 0, Some(t(95)), t(100)), 0);
    }

    #[test]
    fn test_first_sample_with_old_start_is_baseline() {
        let mut d = CrashLoopDetector::new(600);
        assert_eq!(d.observe("c1", 5, Some(t(0)), t(5000)), 0);
    }

    #[test]
    fn test_new_container_resets() {
        let mut d = CrashLoopDetector::new(600);
        d.observe("c1", 0, Some(t(0)), t(0));
        assert_eq!(d.observe("c1", 6, Some(t(50)), t(60)), 6);
        assert_eq!(d.observe("c2", 0, Some(t(70)), t(80)), 0);
    }
}

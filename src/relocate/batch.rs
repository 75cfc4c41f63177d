// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTiming {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for BatchTiming {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<&Settings> for BatchTiming {
    fn from(settings: &Settings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.batch_wait_timeout_ms),
            poll_interval: Duration::from_millis(settings.batch_poll_interval_ms.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchWait {
    Completed,
    TimedOut { completed: usize },
}

/// Counts completed file operations of one batch. Every operation releases
/// exactly once, whether it succeeded or not.
#[derive(Debug, Default)]
pub struct BatchTracker {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self, ok: bool) {
        if !ok {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Polls until `expected` releases arrived or the deadline passed. Giving
    /// up is not an error; callers carry on with whatever finished.
    pub async fn wait(&self, expected: usize, timing: BatchTiming) -> BatchWait {
        let deadline = Instant::now() + timing.timeout;
        loop {
            let completed = self.completed();
            if completed >= expected {
                return BatchWait::Completed;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Gave up waiting for file operations after {:?}: {} of {} finished",
                    timing.timeout,
                    completed,
                    expected
                );
                return BatchWait::TimedOut { completed };
            }
            sleep(timing.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_error() {
        let tracker = BatchTracker::new();
        tracker.release(true);

        let started = Instant::now();
        let result = tracker.wait(3, BatchTiming::default()).await;

        assert_eq!(result, BatchWait::TimedOut { completed: 1 });
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert!(started.elapsed() < Duration::from_millis(5200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sees_late_releases() {
        let tracker = Arc::new(BatchTracker::new());
        let releaser = tracker.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            releaser.release(true);
            releaser.release(false);
        });

        let result = tracker.wait(2, BatchTiming::default()).await;
        assert_eq!(result, BatchWait::Completed);
        assert_eq!(tracker.failed(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let tracker = BatchTracker::new();
        assert_eq!(tracker.wait(0, BatchTiming::default()).await, BatchWait::Completed);
    }

    #[test]
    fn test_timing_from_settings() {
        let settings = Settings {
            batch_wait_timeout_ms: 750,
            batch_poll_interval_ms: 0,
            ..Settings::default()
        };
        let timing = BatchTiming::from(&settings);
        assert_eq!(timing.timeout, Duration::from_millis(750));
        assert_eq!(timing.poll_interval, Duration::from_millis(1));
    }
}

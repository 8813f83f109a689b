//! Cooperative cancellation shared between a running routine and whoever
//! supervises it

use crate::error::{AutomationError, AutomationResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Longest uninterrupted sleep; a stop is noticed within this bound.
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Running/stopped flag handed explicitly to every long-running call.
///
/// Clones share the same flag. Starts in the running state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    running: Arc<AtomicBool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Setting the current value again is a no-op.
    pub fn set_running(&self, running: bool) {
        let previous = self.running.swap(running, Ordering::SeqCst);
        if previous != running {
            log::debug!("⏯️ Running state -> {}", running);
        }
    }

    pub fn stop(&self) {
        self.set_running(false);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// `Err(Stopped)` once a stop has been requested.
    pub fn check_running(&self) -> AutomationResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(AutomationError::Stopped)
        }
    }

    /// Sleep for `duration` in slices of at most [`SLEEP_SLICE`], checking
    /// the flag before each slice.
    pub async fn sleep(&self, duration: Duration) -> AutomationResult<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check_running()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(SLEEP_SLICE)).await;
        }
    }

    pub async fn sleep_secs(&self, seconds: f64) -> AutomationResult<()> {
        self.sleep(Duration::from_secs_f64(seconds.max(0.0))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_requests_are_no_ops() {
        let token = CancelToken::new();
        assert!(token.is_running());
        token.set_running(true);
        assert!(token.is_running());
        assert!(token.check_running().is_ok());

        token.stop();
        token.stop();
        assert!(!token.is_running());
        assert!(token.check_running().unwrap_err().is_stop());

        token.set_running(true);
        assert!(token.is_running());
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.stop();
        assert!(!token.is_running());
    }

    #[tokio::test]
    async fn sleep_completes_when_running() {
        let token = CancelToken::new();
        let started = std::time::Instant::now();
        token.sleep(Duration::from_millis(250)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn sleep_on_stopped_token_fails_immediately() {
        let token = CancelToken::new();
        token.stop();
        let started = std::time::Instant::now();
        let err = token.sleep(Duration::from_secs(5)).await.unwrap_err();
        assert!(err.is_stop());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_interrupts_long_sleep() {
        let token = CancelToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            stopper.stop();
        });

        let started = std::time::Instant::now();
        let err = token.sleep(Duration::from_secs(10)).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_stop());
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2100), "{elapsed:?}");
    }
}

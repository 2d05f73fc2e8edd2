//! Pause abstraction for the settling delay between rollout phases
//!
//! Production code uses `TokioPause` which delegates to `tokio::time::sleep`.
//! Tests use `RecordingPause` to skip the wait and assert on the requested delays.

use async_trait::async_trait;
use std::time::Duration;

/// Trait for waiting out a settling delay
///
/// Injected into the driver to allow tests to run a full rollout instantly.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Production pause that actually sleeps
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Pause double that returns immediately and remembers every request
#[cfg(test)]
#[allow(clippy::expect_used)]
#[derive(Default)]
pub struct RecordingPause {
    naps: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn naps(&self) -> Vec<Duration> {
        self.naps.lock().expect("RecordingPause lock poisoned").clone()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.naps
            .lock()
            .expect("RecordingPause lock poisoned")
            .push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_pause_sleeps_for_duration() {
        let start = tokio::time::Instant::now();
        TokioPause.pause(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_recording_pause_records_in_order() {
        let pause = RecordingPause::new();
        pause.pause(Duration::from_secs(1)).await;
        pause.pause(Duration::from_secs(60)).await;
        assert_eq!(
            pause.naps(),
            vec![Duration::from_secs(1), Duration::from_secs(60)]
        );
    }
}

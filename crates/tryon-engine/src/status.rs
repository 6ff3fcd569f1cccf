//! Detection status with hysteresis, so a few missed frames do not flicker
//! a "nothing detected" state.

use std::time::{Duration, Instant};

pub const DEFAULT_NOT_DETECTED_AFTER: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    /// No frame observed yet, or failures shorter than the hysteresis window.
    Searching,
    Detected,
    NotDetected,
}

#[derive(Debug)]
pub struct DetectionMonitor {
    not_detected_after: Duration,
    failing_since: Option<Instant>,
    status: DetectionStatus,
}

impl Default for DetectionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_NOT_DETECTED_AFTER)
    }
}

impl DetectionMonitor {
    pub fn new(not_detected_after: Duration) -> Self {
        Self {
            not_detected_after,
            failing_since: None,
            status: DetectionStatus::Searching,
        }
    }

    pub fn status(&self) -> DetectionStatus {
        self.status
    }

    /// Record one frame's outcome. Returns the new status when it changed.
    pub fn observe(&mut self, detected: bool, now: Instant) -> Option<DetectionStatus> {
        let next = if detected {
            self.failing_since = None;
            DetectionStatus::Detected
        } else {
            let since = *self.failing_since.get_or_insert(now);
            if now.saturating_duration_since(since) >= self.not_detected_after {
                DetectionStatus::NotDetected
            } else {
                self.status
            }
        };
        if next == self.status {
            return None;
        }
        self.status = next;
        Some(next)
    }
}

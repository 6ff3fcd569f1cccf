//! Detection provider traits and the shared provider error type.
//!
//! Every provider is a long-lived handle over a lazily loaded model. A provider
//! either returns its result, reports [`ProviderError::NotDetected`] when the
//! subject is absent from the frame, or fails with an infrastructure error.

use crate::mask::{BodyPartGrid, CategoryGrid};
use crate::types::{FaceMesh, HandSkeleton, Subject, Timestamp};
use async_trait::async_trait;
use image::RgbaImage;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("model file not found: {0} (set TRYON_MODEL_DIR to the directory holding it)")]
    ModelNotFound(String),
    #[error("model load failed: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("no {0} detected")]
    NotDetected(Subject),
    #[error("timestamp {got} is not after previous frame {previous}")]
    NonMonotonic { previous: Timestamp, got: Timestamp },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl ProviderError {
    /// True for the soft "nothing in frame" signal, false for infrastructure failures.
    pub fn is_not_detected(&self) -> bool {
        matches!(self, ProviderError::NotDetected(_))
    }
}

/// Hand landmark detection. Returns one skeleton per detected hand, at most
/// one per handedness: nail smoothing is keyed by side and finger. Callers
/// keep the most confident hand when a detector reports two of one side.
#[async_trait]
pub trait HandDetector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(
        &self,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<Vec<HandSkeleton>, ProviderError>;

    /// Load the underlying model without running inference.
    async fn warm_up(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Release the model. The next `detect` reloads it.
    fn dispose(&self) {}
}

/// Dense face mesh detection for the most prominent face.
#[async_trait]
pub trait FaceLandmarker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, frame: &RgbaImage, timestamp: Timestamp)
        -> Result<FaceMesh, ProviderError>;

    async fn warm_up(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn dispose(&self) {}
}

/// Per-pixel category segmentation (background, hair, skin, clothes, ...).
#[async_trait]
pub trait CategorySegmenter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn segment(
        &self,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<CategoryGrid, ProviderError>;

    async fn warm_up(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn dispose(&self) {}
}

/// Per-pixel body part segmentation at reduced resolution.
#[async_trait]
pub trait BodyPartSegmenter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn segment(
        &self,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<BodyPartGrid, ProviderError>;

    async fn warm_up(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn dispose(&self) {}
}

/// Rejects frames whose timestamp does not advance past the previous one.
///
/// Video-mode detectors carry tracking state between frames and assume a
/// strictly increasing clock.
#[derive(Debug, Default)]
pub struct TimestampGuard {
    last: Mutex<Option<Timestamp>>,
}

impl TimestampGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, timestamp: Timestamp) -> Result<(), ProviderError> {
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = *last {
            if timestamp <= previous {
                return Err(ProviderError::NonMonotonic {
                    previous,
                    got: timestamp,
                });
            }
        }
        *last = Some(timestamp);
        Ok(())
    }

    /// Forget the previous timestamp, e.g. when a new stream starts.
    pub fn reset(&self) {
        *self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_detected_is_soft() {
        assert!(ProviderError::NotDetected(Subject::Hands).is_not_detected());
        assert!(!ProviderError::ModelNotFound("x.onnx".into()).is_not_detected());
        assert!(!ProviderError::InferenceFailed("boom".into()).is_not_detected());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ProviderError::NotDetected(Subject::Face).to_string(),
            "no face detected"
        );
    }

    #[test]
    fn test_timestamp_guard_rejects_repeat() {
        let guard = TimestampGuard::new();
        guard.advance(Timestamp(1.0)).unwrap();
        guard.advance(Timestamp(2.0)).unwrap();
        let err = guard.advance(Timestamp(2.0)).unwrap_err();
        assert!(matches!(err, ProviderError::NonMonotonic { .. }));
        assert!(guard.advance(Timestamp(0.5)).is_err());
    }

    #[test]
    fn test_timestamp_guard_reset() {
        let guard = TimestampGuard::new();
        guard.advance(Timestamp(10.0)).unwrap();
        guard.reset();
        guard.advance(Timestamp(1.0)).unwrap();
    }
}

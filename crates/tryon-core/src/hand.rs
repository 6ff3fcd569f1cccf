//! MediaPipe hand landmark network via ONNX Runtime.
//!
//! The network regresses 21 landmarks for the single most prominent hand in a
//! letterboxed 224×224 RGB input, plus a hand-presence score and handedness.

use crate::lazy::LazyModel;
use crate::provider::{HandDetector, ProviderError, TimestampGuard};
use crate::tensor::{self, InputRange, Letterbox, OnnxModel, OutputTensor, TensorLayout};
use crate::types::{HandSkeleton, Handedness, Landmark, Subject, Timestamp, HAND_LANDMARK_COUNT};
use async_trait::async_trait;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const HAND_MODEL_FILE: &str = "hand_landmark.onnx";

const HAND_INPUT_SIZE: usize = 224;
const HAND_PRESENCE_THRESHOLD: f32 = 0.5;
/// Handedness output above this is a right hand.
const HAND_RIGHT_THRESHOLD: f32 = 0.5;

static HAND_MODEL: LazyModel<OnnxModel> = LazyModel::new("hand_landmark");

/// Hand landmarker backed by a process-wide lazily loaded session.
pub struct OnnxHandLandmarker {
    model_path: PathBuf,
    guard: TimestampGuard,
}

impl OnnxHandLandmarker {
    pub fn new(model_dir: &Path) -> Self {
        Self {
            model_path: model_dir.join(HAND_MODEL_FILE),
            guard: TimestampGuard::new(),
        }
    }

    async fn model(&self) -> Result<Arc<OnnxModel>, ProviderError> {
        let path = self.model_path.clone();
        HAND_MODEL
            .get_or_load(move || OnnxModel::load(HAND_MODEL.name(), &path))
            .await
    }
}

#[async_trait]
impl HandDetector for OnnxHandLandmarker {
    fn name(&self) -> &'static str {
        "hand_landmark"
    }

    async fn detect(
        &self,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<Vec<HandSkeleton>, ProviderError> {
        self.guard.advance(timestamp)?;
        let model = self.model().await?;
        let (input, letterbox) = tensor::letterbox_rgb(
            frame,
            HAND_INPUT_SIZE,
            HAND_INPUT_SIZE,
            InputRange::ZeroToOne,
            TensorLayout::Nchw,
        );
        let outputs = tensor::run_blocking(model, input).await?;
        let hand = decode_hand(&outputs, &letterbox)?;
        tracing::trace!(
            %timestamp,
            handedness = %hand.handedness,
            confidence = hand.confidence,
            "hand detected"
        );
        Ok(vec![hand])
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        self.model().await.map(|_| ())
    }

    fn dispose(&self) {
        HAND_MODEL.dispose();
        self.guard.reset();
    }
}

/// Decode `[landmarks(63), presence(1), handedness(1)]` into a skeleton in
/// normalized frame coordinates.
pub fn decode_hand(
    outputs: &[OutputTensor],
    letterbox: &Letterbox,
) -> Result<HandSkeleton, ProviderError> {
    let coords = tensor::output(outputs, 0, HAND_LANDMARK_COUNT * 3)?;
    let presence = tensor::output(outputs, 1, 1)?.scalar().unwrap_or(0.0);
    let handedness = tensor::output(outputs, 2, 1)?.scalar().unwrap_or(0.0);

    if presence.is_nan() || presence < HAND_PRESENCE_THRESHOLD {
        return Err(ProviderError::NotDetected(Subject::Hands));
    }

    // Depth shares the x scale of the input.
    let z_scale = letterbox.scale * letterbox.src_width as f32;
    let mut landmarks = [Landmark::default(); HAND_LANDMARK_COUNT];
    for (i, lm) in landmarks.iter_mut().enumerate() {
        let (x, y) = letterbox.to_normalized(coords.data[i * 3], coords.data[i * 3 + 1]);
        *lm = Landmark::new(x, y, coords.data[i * 3 + 2] / z_scale);
    }

    Ok(HandSkeleton {
        landmarks,
        handedness: if handedness > HAND_RIGHT_THRESHOLD {
            Handedness::Right
        } else {
            Handedness::Left
        },
        confidence: presence,
    })
}

//! MediaPipe face mesh (468 landmarks) via ONNX Runtime.

use crate::lazy::LazyModel;
use crate::provider::{FaceLandmarker, ProviderError, TimestampGuard};
use crate::tensor::{self, InputRange, Letterbox, OnnxModel, OutputTensor, TensorLayout};
use crate::types::{FaceMesh, Landmark, Subject, Timestamp, FACE_MESH_LANDMARK_COUNT};
use async_trait::async_trait;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FACE_MODEL_FILE: &str = "face_landmark.onnx";

const FACE_INPUT_SIZE: usize = 192;
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

static FACE_MODEL: LazyModel<OnnxModel> = LazyModel::new("face_landmark");

pub struct OnnxFaceLandmarker {
    model_path: PathBuf,
    guard: TimestampGuard,
}

impl OnnxFaceLandmarker {
    pub fn new(model_dir: &Path) -> Self {
        Self {
            model_path: model_dir.join(FACE_MODEL_FILE),
            guard: TimestampGuard::new(),
        }
    }

    async fn model(&self) -> Result<Arc<OnnxModel>, ProviderError> {
        let path = self.model_path.clone();
        FACE_MODEL
            .get_or_load(move || OnnxModel::load(FACE_MODEL.name(), &path))
            .await
    }
}

#[async_trait]
impl FaceLandmarker for OnnxFaceLandmarker {
    fn name(&self) -> &'static str {
        "face_landmark"
    }

    async fn detect(
        &self,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<FaceMesh, ProviderError> {
        self.guard.advance(timestamp)?;
        let model = self.model().await?;
        let (input, letterbox) = tensor::letterbox_rgb(
            frame,
            FACE_INPUT_SIZE,
            FACE_INPUT_SIZE,
            InputRange::MinusOneToOne,
            TensorLayout::Nchw,
        );
        let outputs = tensor::run_blocking(model, input).await?;
        decode_face_mesh(&outputs, &letterbox)
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        self.model().await.map(|_| ())
    }

    fn dispose(&self) {
        FACE_MODEL.dispose();
        self.guard.reset();
    }
}

/// Decode `[landmarks(1404), face_flag(1)]`. The face flag is a logit.
pub fn decode_face_mesh(
    outputs: &[OutputTensor],
    letterbox: &Letterbox,
) -> Result<FaceMesh, ProviderError> {
    let coords = tensor::output(outputs, 0, FACE_MESH_LANDMARK_COUNT * 3)?;
    let flag = tensor::output(outputs, 1, 1)?.scalar().unwrap_or(f32::NEG_INFINITY);

    let presence = tensor::sigmoid(flag);
    if presence.is_nan() || presence < FACE_PRESENCE_THRESHOLD {
        return Err(ProviderError::NotDetected(Subject::Face));
    }

    let z_scale = letterbox.scale * letterbox.src_width as f32;
    let landmarks = coords.data[..FACE_MESH_LANDMARK_COUNT * 3]
        .chunks_exact(3)
        .map(|c| {
            let (x, y) = letterbox.to_normalized(c[0], c[1]);
            Landmark::new(x, y, c[2] / z_scale)
        })
        .collect();

    Ok(FaceMesh { landmarks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(flag: f32) -> Vec<OutputTensor> {
        let data = (0..FACE_MESH_LANDMARK_COUNT)
            .flat_map(|i| [48.0 + (i % 96) as f32, 96.0, 0.0])
            .collect();
        vec![
            OutputTensor {
                shape: vec![1, 1404],
                data,
            },
            OutputTensor {
                shape: vec![1, 1],
                data: vec![flag],
            },
        ]
    }

    #[test]
    fn test_decode_face_mesh() {
        let lb = Letterbox::fit(384, 384, FACE_INPUT_SIZE, FACE_INPUT_SIZE);
        let mesh = decode_face_mesh(&outputs(4.0), &lb).unwrap();
        assert_eq!(mesh.landmarks.len(), FACE_MESH_LANDMARK_COUNT);
        assert!((mesh.landmarks[0].x - 0.25).abs() < 1e-5);
        assert!((mesh.landmarks[0].y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_negative_flag_is_not_detected() {
        let lb = Letterbox::fit(384, 384, FACE_INPUT_SIZE, FACE_INPUT_SIZE);
        let err = decode_face_mesh(&outputs(-3.0), &lb).unwrap_err();
        assert!(err.is_not_detected());
    }

    #[test]
    fn test_missing_flag_output() {
        let lb = Letterbox::fit(384, 384, FACE_INPUT_SIZE, FACE_INPUT_SIZE);
        let mut outs = outputs(4.0);
        outs.pop();
        assert!(matches!(
            decode_face_mesh(&outs, &lb),
            Err(ProviderError::InferenceFailed(_))
        ));
    }
}

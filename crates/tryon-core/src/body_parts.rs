//! Body-part segmenter (ResNet backbone, 24 part heatmaps) via ONNX Runtime.
//!
//! Outputs are at output stride 16, so a 513×513 input yields a 33×33 grid.

use crate::lazy::LazyModel;
use crate::mask::BodyPartGrid;
use crate::provider::{BodyPartSegmenter, ProviderError, TimestampGuard};
use crate::tensor::{
    self, sigmoid, CellMap, InputRange, Letterbox, OnnxModel, OutputTensor, TensorLayout,
    RESNET_MEAN,
};
use crate::types::{Subject, Timestamp};
use async_trait::async_trait;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const BODY_PARTS_MODEL_FILE: &str = "body_parts_resnet50.onnx";

const BODY_PARTS_INPUT_SIZE: usize = 513;
const BODY_PARTS_COUNT: usize = 24;
/// Person probability below this is background.
const SEGMENTATION_THRESHOLD: f32 = 0.7;

static BODY_PARTS_MODEL: LazyModel<OnnxModel> = LazyModel::new("body_parts");

pub struct OnnxBodyPartSegmenter {
    model_path: PathBuf,
    guard: TimestampGuard,
}

impl OnnxBodyPartSegmenter {
    pub fn new(model_dir: &Path) -> Self {
        Self {
            model_path: model_dir.join(BODY_PARTS_MODEL_FILE),
            guard: TimestampGuard::new(),
        }
    }

    async fn model(&self) -> Result<Arc<OnnxModel>, ProviderError> {
        let path = self.model_path.clone();
        BODY_PARTS_MODEL
            .get_or_load(move || OnnxModel::load(BODY_PARTS_MODEL.name(), &path))
            .await
    }
}

#[async_trait]
impl BodyPartSegmenter for OnnxBodyPartSegmenter {
    fn name(&self) -> &'static str {
        "body_parts"
    }

    async fn segment(
        &self,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<BodyPartGrid, ProviderError> {
        self.guard.advance(timestamp)?;
        let model = self.model().await?;
        let (input, letterbox) = tensor::letterbox_rgb(
            frame,
            BODY_PARTS_INPUT_SIZE,
            BODY_PARTS_INPUT_SIZE,
            InputRange::MeanSubtracted(RESNET_MEAN),
            TensorLayout::Nchw,
        );
        let outputs = tensor::run_blocking(model, input).await?;
        decode_body_parts(&outputs, &letterbox)
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        self.model().await.map(|_| ())
    }

    fn dispose(&self) {
        BODY_PARTS_MODEL.dispose();
        self.guard.reset();
    }
}

/// Pick the `[1, H, W, channels]` output with the requested channel count.
fn find_output(outputs: &[OutputTensor], channels: usize) -> Option<(usize, usize, &OutputTensor)> {
    outputs.iter().find_map(|o| match o.shape.as_slice() {
        [_, h, w, c] if *c == channels && o.data.len() >= h * w * c => Some((*h, *w, o)),
        _ => None,
    })
}

/// Combine segmentation logits and part heatmaps into a frame-aligned part grid.
pub fn decode_body_parts(
    outputs: &[OutputTensor],
    letterbox: &Letterbox,
) -> Result<BodyPartGrid, ProviderError> {
    let (seg_h, seg_w, segments) = find_output(outputs, 1).ok_or_else(|| {
        ProviderError::InferenceFailed("missing [1,H,W,1] segmentation output".into())
    })?;
    let (part_h, part_w, heatmaps) = find_output(outputs, BODY_PARTS_COUNT).ok_or_else(|| {
        ProviderError::InferenceFailed(format!(
            "missing [1,H,W,{BODY_PARTS_COUNT}] part heatmap output"
        ))
    })?;
    if (seg_h, seg_w) != (part_h, part_w) {
        return Err(ProviderError::InferenceFailed(format!(
            "segmentation grid {seg_w}x{seg_h} does not match part grid {part_w}x{part_h}"
        )));
    }

    let cells = CellMap::new(
        letterbox,
        BODY_PARTS_INPUT_SIZE,
        BODY_PARTS_INPUT_SIZE,
        seg_w,
        seg_h,
    );
    let parts: Vec<i8> = cells
        .source
        .iter()
        .map(|&idx| {
            if sigmoid(segments.data[idx]) < SEGMENTATION_THRESHOLD {
                return BodyPartGrid::BACKGROUND;
            }
            let scores = &heatmaps.data[idx * BODY_PARTS_COUNT..(idx + 1) * BODY_PARTS_COUNT];
            let mut best = 0;
            for (i, &s) in scores.iter().enumerate() {
                if s > scores[best] {
                    best = i;
                }
            }
            best as i8
        })
        .collect();

    let grid = BodyPartGrid::new(cells.width, cells.height, parts);
    if !grid.has_person() {
        return Err(ProviderError::NotDetected(Subject::Person));
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(seg_logit: f32, part: usize) -> Vec<OutputTensor> {
        let cells = 3 * 3;
        let mut heat = vec![0.0f32; cells * BODY_PARTS_COUNT];
        for c in 0..cells {
            heat[c * BODY_PARTS_COUNT + part] = 5.0;
        }
        // Heatmaps first to check outputs are picked by shape, not position.
        vec![
            OutputTensor {
                shape: vec![1, 3, 3, BODY_PARTS_COUNT],
                data: heat,
            },
            OutputTensor {
                shape: vec![1, 3, 3, 1],
                data: vec![seg_logit; cells],
            },
        ]
    }

    #[test]
    fn test_decode_person() {
        let lb = Letterbox::fit(100, 100, BODY_PARTS_INPUT_SIZE, BODY_PARTS_INPUT_SIZE);
        let grid = decode_body_parts(&outputs(3.0, 12), &lb).unwrap();
        assert_eq!((grid.width, grid.height), (3, 3));
        assert!(grid.parts.iter().all(|&p| p == BodyPartGrid::TORSO_FRONT));
    }

    #[test]
    fn test_low_person_probability_is_background() {
        // sigmoid(0.5) ≈ 0.62 < 0.7
        let lb = Letterbox::fit(100, 100, BODY_PARTS_INPUT_SIZE, BODY_PARTS_INPUT_SIZE);
        let err = decode_body_parts(&outputs(0.5, 0), &lb).unwrap_err();
        assert!(matches!(err, ProviderError::NotDetected(Subject::Person)));
    }

    #[test]
    fn test_missing_heatmaps() {
        let lb = Letterbox::fit(100, 100, BODY_PARTS_INPUT_SIZE, BODY_PARTS_INPUT_SIZE);
        let mut outs = outputs(3.0, 0);
        outs.remove(0);
        assert!(matches!(
            decode_body_parts(&outs, &lb),
            Err(ProviderError::InferenceFailed(_))
        ));
    }
}

//! Selfie multiclass segmenter (hair, skin, clothes) via ONNX Runtime.

use crate::lazy::LazyModel;
use crate::mask::CategoryGrid;
use crate::provider::{CategorySegmenter, ProviderError, TimestampGuard};
use crate::tensor::{self, CellMap, InputRange, Letterbox, OnnxModel, OutputTensor, TensorLayout};
use crate::types::{Subject, Timestamp};
use async_trait::async_trait;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SELFIE_MODEL_FILE: &str = "selfie_multiclass.onnx";

const SELFIE_INPUT_SIZE: usize = 256;
const SELFIE_CATEGORIES: usize = 6;

static SELFIE_MODEL: LazyModel<OnnxModel> = LazyModel::new("selfie_multiclass");

pub struct OnnxSelfieSegmenter {
    model_path: PathBuf,
    guard: TimestampGuard,
}

impl OnnxSelfieSegmenter {
    pub fn new(model_dir: &Path) -> Self {
        Self {
            model_path: model_dir.join(SELFIE_MODEL_FILE),
            guard: TimestampGuard::new(),
        }
    }

    async fn model(&self) -> Result<Arc<OnnxModel>, ProviderError> {
        let path = self.model_path.clone();
        SELFIE_MODEL
            .get_or_load(move || OnnxModel::load(SELFIE_MODEL.name(), &path))
            .await
    }
}

#[async_trait]
impl CategorySegmenter for OnnxSelfieSegmenter {
    fn name(&self) -> &'static str {
        "selfie_multiclass"
    }

    async fn segment(
        &self,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<CategoryGrid, ProviderError> {
        self.guard.advance(timestamp)?;
        let model = self.model().await?;
        let (input, letterbox) = tensor::letterbox_rgb(
            frame,
            SELFIE_INPUT_SIZE,
            SELFIE_INPUT_SIZE,
            InputRange::ZeroToOne,
            TensorLayout::Nhwc,
        );
        let outputs = tensor::run_blocking(model, input).await?;
        decode_categories(&outputs, &letterbox)
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        self.model().await.map(|_| ())
    }

    fn dispose(&self) {
        SELFIE_MODEL.dispose();
        self.guard.reset();
    }
}

/// Argmax `[1, H, W, 6]` confidences into a frame-aligned category grid.
pub fn decode_categories(
    outputs: &[OutputTensor],
    letterbox: &Letterbox,
) -> Result<CategoryGrid, ProviderError> {
    let (out_h, out_w, classes) = match outputs.first().map(|o| o.shape.as_slice()) {
        Some([_, h, w, c]) => (*h, *w, *c),
        _ => (SELFIE_INPUT_SIZE, SELFIE_INPUT_SIZE, SELFIE_CATEGORIES),
    };
    if classes == 0 {
        return Err(ProviderError::InferenceFailed(
            "segmenter produced zero categories".into(),
        ));
    }
    let scores = tensor::output(outputs, 0, out_h * out_w * classes)?;

    let cells = CellMap::new(letterbox, SELFIE_INPUT_SIZE, SELFIE_INPUT_SIZE, out_w, out_h);
    let labels: Vec<u8> = cells
        .source
        .iter()
        .map(|&idx| {
            let px = &scores.data[idx * classes..(idx + 1) * classes];
            argmax(px) as u8
        })
        .collect();

    let grid = CategoryGrid::new(cells.width, cells.height, labels);
    if !grid.contains(CategoryGrid::HAIR) {
        return Err(ProviderError::NotDetected(Subject::Hair));
    }
    Ok(grid)
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x4 output: top half hair, bottom half face skin.
    fn outputs() -> Vec<OutputTensor> {
        let mut data = Vec::new();
        for y in 0..4 {
            for _ in 0..4 {
                let mut px = [0.0f32; SELFIE_CATEGORIES];
                px[if y < 2 { 1 } else { 3 }] = 0.9;
                data.extend_from_slice(&px);
            }
        }
        vec![OutputTensor {
            shape: vec![1, 4, 4, SELFIE_CATEGORIES],
            data,
        }]
    }

    #[test]
    fn test_decode_categories() {
        let lb = Letterbox::fit(100, 100, SELFIE_INPUT_SIZE, SELFIE_INPUT_SIZE);
        let grid = decode_categories(&outputs(), &lb).unwrap();
        assert_eq!((grid.width, grid.height), (4, 4));
        assert_eq!(grid.get(0, 0), CategoryGrid::HAIR);
        assert_eq!(grid.get(3, 3), CategoryGrid::FACE_SKIN);
    }

    #[test]
    fn test_no_hair_is_not_detected() {
        let lb = Letterbox::fit(100, 100, SELFIE_INPUT_SIZE, SELFIE_INPUT_SIZE);
        let outs = vec![OutputTensor {
            shape: vec![1, 2, 2, SELFIE_CATEGORIES],
            data: vec![0.0; 2 * 2 * SELFIE_CATEGORIES],
        }];
        let err = decode_categories(&outs, &lb).unwrap_err();
        assert!(matches!(err, ProviderError::NotDetected(Subject::Hair)));
    }

    #[test]
    fn test_argmax_ties_take_first() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}

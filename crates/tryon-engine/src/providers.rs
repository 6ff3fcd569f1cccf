//! The set of detection providers shared by both pipelines.

use crate::config::Config;
use crate::pipeline::{HairPipeline, NailPipeline};
use std::path::Path;
use std::sync::Arc;
use tryon_core::body_parts::OnnxBodyPartSegmenter;
use tryon_core::face_mesh::OnnxFaceLandmarker;
use tryon_core::hand::OnnxHandLandmarker;
use tryon_core::selfie::OnnxSelfieSegmenter;
use tryon_core::{BodyPartSegmenter, CategorySegmenter, FaceLandmarker, HandDetector};

#[derive(Clone)]
pub struct Providers {
    pub hands: Arc<dyn HandDetector>,
    pub face: Arc<dyn FaceLandmarker>,
    pub segmenter: Arc<dyn CategorySegmenter>,
    pub body_parts: Arc<dyn BodyPartSegmenter>,
}

impl Providers {
    /// ONNX-backed providers reading model files from `model_dir`.
    /// Nothing is loaded until first use.
    pub fn onnx(model_dir: &Path) -> Self {
        Self {
            hands: Arc::new(OnnxHandLandmarker::new(model_dir)),
            face: Arc::new(OnnxFaceLandmarker::new(model_dir)),
            segmenter: Arc::new(OnnxSelfieSegmenter::new(model_dir)),
            body_parts: Arc::new(OnnxBodyPartSegmenter::new(model_dir)),
        }
    }

    pub fn hair_pipeline(&self, config: &Config) -> HairPipeline {
        HairPipeline::new()
            .with_body_parts(Arc::clone(&self.body_parts))
            .with_segmenter(Arc::clone(&self.segmenter))
            .with_face(Arc::clone(&self.face))
            .with_blur_radius(config.blur_radius)
            .with_mask_threshold(config.mask_threshold)
    }

    pub fn nail_pipeline(&self, config: &Config) -> NailPipeline {
        NailPipeline::new(Arc::clone(&self.hands), config.smoothing_window)
            .with_min_confidence(config.min_nail_confidence)
    }

    /// Release every loaded model. Later calls reload on demand.
    pub fn dispose_all(&self) {
        self.hands.dispose();
        self.face.dispose();
        self.segmenter.dispose();
        self.body_parts.dispose();
        tracing::info!("providers disposed");
    }
}

//! Hair and nail pipelines.
//!
//! Hair tries its tiers in fidelity order (body parts, category segmenter,
//! face-mesh estimate) and falls through on any tier failure. Nails have a
//! single detector. A tier only touches the canvas once its detection
//! succeeded.

use async_trait::async_trait;
use image::RgbaImage;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tryon_core::geometry::{finger_key, nail_beds_for_hand};
use tryon_core::mask::{
    body_parts_to_hair_mask, box_blur, categories_to_hair_mask, estimate_hair_region,
};
use tryon_core::{
    BodyPartSegmenter, CategorySegmenter, FaceLandmarker, FingerType, HairSettings, HandDetector,
    HandSkeleton, NailBedSmoother, NailSettings, ProviderError, Subject, Timestamp,
};
use tryon_render::hair::{
    paint_hair_estimate, recolor_with_grid, recolor_with_mask, DEFAULT_MASK_THRESHOLD,
};
use tryon_render::{Canvas, NailRenderer, RenderError};

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Nothing to render this frame. Not a fault.
    #[error("no {0} detected")]
    NotDetected(Subject),
    #[error("{0} provider unavailable")]
    Unavailable(HairTier),
    #[error("provider: {0}")]
    Provider(ProviderError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
}

impl PipelineError {
    pub fn is_not_detected(&self) -> bool {
        matches!(self, PipelineError::NotDetected(_))
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotDetected(subject) => PipelineError::NotDetected(subject),
            other => PipelineError::Provider(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HairTier {
    BodyParts,
    Segmenter,
    FaceEstimate,
}

impl HairTier {
    /// Highest fidelity first.
    pub const ORDER: [HairTier; 3] = [HairTier::BodyParts, HairTier::Segmenter, HairTier::FaceEstimate];

    pub fn as_str(self) -> &'static str {
        match self {
            HairTier::BodyParts => "body-parts",
            HairTier::Segmenter => "segmenter",
            HairTier::FaceEstimate => "face-estimate",
        }
    }
}

impl fmt::Display for HairTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a processed frame rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendered {
    Hair(HairTier),
    /// Number of nails drawn.
    Nails(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Hair,
    Nails,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Hair => f.write_str("hair"),
            Modality::Nails => f.write_str("nails"),
        }
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hair" => Ok(Modality::Hair),
            "nails" | "nail" => Ok(Modality::Nails),
            other => Err(format!("unknown modality '{other}' (expected hair or nails)")),
        }
    }
}

/// Something the frame driver can run once per frame.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    fn modality(&self) -> Modality;

    /// `canvas` already holds `frame`; detection runs on `frame`.
    async fn process_frame(
        &self,
        canvas: &mut Canvas,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<Rendered, PipelineError>;
}

pub struct HairPipeline {
    body_parts: Option<Arc<dyn BodyPartSegmenter>>,
    segmenter: Option<Arc<dyn CategorySegmenter>>,
    face: Option<Arc<dyn FaceLandmarker>>,
    blur_radius: u32,
    mask_threshold: u8,
}

impl Default for HairPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl HairPipeline {
    /// A pipeline with no providers; every tier reports unavailable until set.
    pub fn new() -> Self {
        Self {
            body_parts: None,
            segmenter: None,
            face: None,
            blur_radius: 5,
            mask_threshold: DEFAULT_MASK_THRESHOLD,
        }
    }

    pub fn with_body_parts(mut self, provider: Arc<dyn BodyPartSegmenter>) -> Self {
        self.body_parts = Some(provider);
        self
    }

    pub fn with_segmenter(mut self, provider: Arc<dyn CategorySegmenter>) -> Self {
        self.segmenter = Some(provider);
        self
    }

    pub fn with_face(mut self, provider: Arc<dyn FaceLandmarker>) -> Self {
        self.face = Some(provider);
        self
    }

    pub fn with_blur_radius(mut self, radius: u32) -> Self {
        self.blur_radius = radius;
        self
    }

    pub fn with_mask_threshold(mut self, threshold: u8) -> Self {
        self.mask_threshold = threshold;
        self
    }

    /// Recolor hair with the best tier that succeeds.
    ///
    /// When every tier fails, the last tier's failure decides the result:
    /// `NotDetected(Face)` if it found nothing, otherwise its error.
    pub async fn process(
        &self,
        canvas: &mut Canvas,
        frame: &RgbaImage,
        settings: &HairSettings,
        timestamp: Timestamp,
    ) -> Result<HairTier, PipelineError> {
        let mut last_failure = None;
        for tier in HairTier::ORDER {
            match self.run_tier(tier, canvas, frame, settings, timestamp).await {
                Ok(()) => {
                    tracing::trace!(%tier, %timestamp, "hair rendered");
                    return Ok(tier);
                }
                Err(err @ PipelineError::NotDetected(_)) => {
                    tracing::debug!(%tier, reason = %err, "hair tier found nothing; falling back");
                    last_failure = Some(err);
                }
                Err(err @ PipelineError::Unavailable(_)) => {
                    tracing::debug!(%tier, "hair tier skipped");
                    last_failure = Some(err);
                }
                Err(err) => {
                    tracing::warn!(%tier, error = %err, "hair tier failed; falling back");
                    last_failure = Some(err);
                }
            }
        }
        match last_failure {
            Some(PipelineError::NotDetected(_)) | None => {
                Err(PipelineError::NotDetected(Subject::Face))
            }
            Some(err) => Err(err),
        }
    }

    async fn run_tier(
        &self,
        tier: HairTier,
        canvas: &mut Canvas,
        frame: &RgbaImage,
        settings: &HairSettings,
        timestamp: Timestamp,
    ) -> Result<(), PipelineError> {
        let (width, height) = canvas.dimensions();
        match tier {
            HairTier::BodyParts => {
                let provider = self
                    .body_parts
                    .as_ref()
                    .ok_or(PipelineError::Unavailable(tier))?;
                let grid = provider.segment(frame, timestamp).await?;
                let mask = body_parts_to_hair_mask(&grid, width, height);
                if mask.coverage(self.mask_threshold) == 0 {
                    return Err(PipelineError::NotDetected(Subject::Hair));
                }
                let mask = box_blur(&mask, self.blur_radius);
                recolor_with_mask(canvas, &mask, settings, self.mask_threshold);
            }
            HairTier::Segmenter => {
                let provider = self
                    .segmenter
                    .as_ref()
                    .ok_or(PipelineError::Unavailable(tier))?;
                let grid = provider.segment(frame, timestamp).await?;
                if self.blur_radius == 0 {
                    recolor_with_grid(canvas, &grid, settings);
                } else {
                    let mask = categories_to_hair_mask(&grid, width, height);
                    let mask = box_blur(&mask, self.blur_radius);
                    recolor_with_mask(canvas, &mask, settings, self.mask_threshold);
                }
            }
            HairTier::FaceEstimate => {
                let provider = self.face.as_ref().ok_or(PipelineError::Unavailable(tier))?;
                let mesh = provider.detect(frame, timestamp).await?;
                let region = estimate_hair_region(&mesh, width, height)
                    .ok_or(PipelineError::NotDetected(Subject::Face))?;
                paint_hair_estimate(canvas, &region, settings);
            }
        }
        Ok(())
    }
}

pub struct NailPipeline {
    detector: Arc<dyn HandDetector>,
    smoother: Mutex<NailBedSmoother>,
    renderer: Mutex<NailRenderer>,
}

impl NailPipeline {
    pub fn new(detector: Arc<dyn HandDetector>, smoothing_window: usize) -> Self {
        Self {
            detector,
            smoother: Mutex::new(NailBedSmoother::new(smoothing_window)),
            renderer: Mutex::new(NailRenderer::new()),
        }
    }

    pub fn with_min_confidence(self, min_confidence: f32) -> Self {
        let renderer = self
            .renderer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .with_min_confidence(min_confidence);
        Self {
            renderer: Mutex::new(renderer),
            ..self
        }
    }

    pub fn with_renderer(self, renderer: NailRenderer) -> Self {
        Self {
            renderer: Mutex::new(renderer),
            ..self
        }
    }

    /// Whether any finger currently has smoothing history.
    pub fn is_tracking(&self) -> bool {
        !self
            .smoother
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn reset_tracking(&self) {
        self.smoother
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Detect hands and draw polish on every confident nail. Returns the
    /// number of nails drawn.
    pub async fn process(
        &self,
        canvas: &mut Canvas,
        frame: &RgbaImage,
        settings: &NailSettings,
        timestamp: Timestamp,
    ) -> Result<usize, PipelineError> {
        let hands = match self.detector.detect(frame, timestamp).await {
            Ok(hands) if !hands.is_empty() => hands,
            Ok(_) | Err(ProviderError::NotDetected(_)) => {
                self.reset_tracking();
                tracing::debug!(%timestamp, "no hands detected");
                return Err(PipelineError::NotDetected(Subject::Hands));
            }
            Err(err) => {
                self.reset_tracking();
                return Err(err.into());
            }
        };

        let hands = one_hand_per_side(hands);
        let (width, height) = canvas.dimensions();
        let beds = {
            let mut smoother = self.smoother.lock().unwrap_or_else(PoisonError::into_inner);
            let mut beds = Vec::with_capacity(hands.len() * FingerType::ALL.len());
            for hand in &hands {
                for bed in nail_beds_for_hand(hand, width, height) {
                    let key = finger_key(hand, bed.finger);
                    beds.push(smoother.smooth(&key, bed));
                }
            }
            beds
        };

        let drawn = self
            .renderer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .draw_nail_beds(canvas, &beds, settings);
        tracing::trace!(%timestamp, hands = hands.len(), drawn, "nails rendered");
        Ok(drawn)
    }
}

/// Keep the most confident hand of each handedness. Smoothing keys are per
/// side and finger, so two "left" hands would otherwise share one history.
fn one_hand_per_side(mut hands: Vec<HandSkeleton>) -> Vec<HandSkeleton> {
    hands.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut seen = Vec::with_capacity(2);
    hands.retain(|hand| {
        if seen.contains(&hand.handedness) {
            tracing::debug!(handedness = %hand.handedness, "dropping duplicate hand");
            return false;
        }
        seen.push(hand.handedness);
        true
    });
    hands
}

/// The modality currently shown, with its settings.
pub enum ActiveModality {
    Hair {
        pipeline: HairPipeline,
        settings: HairSettings,
    },
    Nails {
        pipeline: NailPipeline,
        settings: NailSettings,
    },
}

#[async_trait]
impl FrameProcessor for ActiveModality {
    fn modality(&self) -> Modality {
        match self {
            ActiveModality::Hair { .. } => Modality::Hair,
            ActiveModality::Nails { .. } => Modality::Nails,
        }
    }

    async fn process_frame(
        &self,
        canvas: &mut Canvas,
        frame: &RgbaImage,
        timestamp: Timestamp,
    ) -> Result<Rendered, PipelineError> {
        match self {
            ActiveModality::Hair { pipeline, settings } => pipeline
                .process(canvas, frame, settings, timestamp)
                .await
                .map(Rendered::Hair),
            ActiveModality::Nails { pipeline, settings } => pipeline
                .process(canvas, frame, settings, timestamp)
                .await
                .map(Rendered::Nails),
        }
    }
}

//! Model preloading with weighted progress, so the first frame does not pay
//! for model loads.

use crate::pipeline::Modality;
use crate::providers::Providers;
use std::time::Instant;
use tryon_core::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    FaceLandmarker,
    BodyParts,
    Segmenter,
    HandLandmarker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadStep {
    pub name: &'static str,
    pub model: ModelKind,
    /// Share of the total progress, in percent.
    pub weight: u8,
}

const HAIR_STEPS: [PreloadStep; 3] = [
    PreloadStep {
        name: "Face Landmarker",
        model: ModelKind::FaceLandmarker,
        weight: 30,
    },
    PreloadStep {
        name: "Body Parts Segmenter",
        model: ModelKind::BodyParts,
        weight: 50,
    },
    PreloadStep {
        name: "Hair Segmenter",
        model: ModelKind::Segmenter,
        weight: 20,
    },
];

const NAIL_STEPS: [PreloadStep; 1] = [PreloadStep {
    name: "Hand Landmarker",
    model: ModelKind::HandLandmarker,
    weight: 100,
}];

pub fn steps(modality: Modality) -> &'static [PreloadStep] {
    match modality {
        Modality::Hair => &HAIR_STEPS,
        Modality::Nails => &NAIL_STEPS,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreloadState {
    Loading { model: &'static str, progress: u8 },
    Ready,
    Failed {
        model: &'static str,
        progress: u8,
        error: String,
    },
}

/// Load every model `modality` needs, in order, reporting progress after
/// each step. Stops at the first failure.
pub async fn preload<F>(
    providers: &Providers,
    modality: Modality,
    mut on_progress: F,
) -> Result<(), ProviderError>
where
    F: FnMut(&PreloadState),
{
    let start = Instant::now();
    let mut progress = 0u8;
    for step in steps(modality) {
        on_progress(&PreloadState::Loading {
            model: step.name,
            progress,
        });
        let result = match step.model {
            ModelKind::FaceLandmarker => providers.face.warm_up().await,
            ModelKind::BodyParts => providers.body_parts.warm_up().await,
            ModelKind::Segmenter => providers.segmenter.warm_up().await,
            ModelKind::HandLandmarker => providers.hands.warm_up().await,
        };
        if let Err(err) = result {
            tracing::warn!(%modality, model = step.name, error = %err, "model preload failed");
            on_progress(&PreloadState::Failed {
                model: step.name,
                progress,
                error: err.to_string(),
            });
            return Err(err);
        }
        progress = progress.saturating_add(step.weight).min(100);
    }
    tracing::info!(
        %modality,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "models preloaded"
    );
    on_progress(&PreloadState::Ready);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::RgbaImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tryon_core::{
        BodyPartGrid, BodyPartSegmenter, CategoryGrid, CategorySegmenter, FaceLandmarker,
        FaceMesh, HandDetector, HandSkeleton, Timestamp,
    };

    #[derive(Default)]
    struct Stub {
        warmed: AtomicUsize,
        broken: bool,
    }

    impl Stub {
        fn warm(&self) -> Result<(), ProviderError> {
            if self.broken {
                return Err(ProviderError::ModelNotFound("missing.onnx".into()));
            }
            self.warmed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl HandDetector for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn detect(&self, _: &RgbaImage, _: Timestamp) -> Result<Vec<HandSkeleton>, ProviderError> {
            Ok(Vec::new())
        }
        async fn warm_up(&self) -> Result<(), ProviderError> {
            self.warm()
        }
    }

    #[async_trait]
    impl FaceLandmarker for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn detect(&self, _: &RgbaImage, _: Timestamp) -> Result<FaceMesh, ProviderError> {
            Ok(FaceMesh { landmarks: Vec::new() })
        }
        async fn warm_up(&self) -> Result<(), ProviderError> {
            self.warm()
        }
    }

    #[async_trait]
    impl CategorySegmenter for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn segment(&self, _: &RgbaImage, _: Timestamp) -> Result<CategoryGrid, ProviderError> {
            Ok(CategoryGrid::new(0, 0, Vec::new()))
        }
        async fn warm_up(&self) -> Result<(), ProviderError> {
            self.warm()
        }
    }

    #[async_trait]
    impl BodyPartSegmenter for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn segment(&self, _: &RgbaImage, _: Timestamp) -> Result<BodyPartGrid, ProviderError> {
            Ok(BodyPartGrid::new(0, 0, Vec::new()))
        }
        async fn warm_up(&self) -> Result<(), ProviderError> {
            self.warm()
        }
    }

    fn providers(face: Arc<Stub>, body: Arc<Stub>) -> Providers {
        Providers {
            hands: Arc::new(Stub::default()),
            face,
            segmenter: Arc::new(Stub::default()),
            body_parts: body,
        }
    }

    #[test]
    fn test_weights_sum_to_hundred() {
        for modality in [Modality::Hair, Modality::Nails] {
            let total: u32 = steps(modality).iter().map(|s| s.weight as u32).sum();
            assert_eq!(total, 100, "{modality}");
        }
    }

    #[tokio::test]
    async fn test_hair_progress_sequence() {
        let face = Arc::new(Stub::default());
        let providers = providers(face.clone(), Arc::new(Stub::default()));
        let mut seen = Vec::new();
        preload(&providers, Modality::Hair, |s| seen.push(s.clone()))
            .await
            .unwrap();

        let progress: Vec<u8> = seen
            .iter()
            .filter_map(|s| match s {
                PreloadState::Loading { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0, 30, 80]);
        assert_eq!(seen.last(), Some(&PreloadState::Ready));
        assert_eq!(face.warmed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_stops_with_partial_progress() {
        let broken = Arc::new(Stub {
            warmed: AtomicUsize::new(0),
            broken: true,
        });
        let providers = providers(Arc::new(Stub::default()), broken);
        let mut last = None;
        let err = preload(&providers, Modality::Hair, |s| last = Some(s.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound(_)));
        assert!(matches!(
            last,
            Some(PreloadState::Failed {
                model: "Body Parts Segmenter",
                progress: 30,
                ..
            })
        ));
    }
}

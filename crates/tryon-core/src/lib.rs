//! tryon-core — Detection providers, nail geometry and temporal smoothing.
//!
//! Wraps the MediaPipe hand/face landmark networks and the hair/body-part
//! segmenters behind async provider traits, all running via ONNX Runtime for
//! CPU inference.

pub mod body_parts;
pub mod face_mesh;
pub mod geometry;
pub mod hand;
pub mod lazy;
pub mod mask;
pub mod presets;
pub mod provider;
pub mod selfie;
pub mod smoother;
pub mod tensor;
pub mod types;

pub use mask::{AlphaMask, BodyPartGrid, CategoryGrid, HairRegion, PixelRect};
pub use provider::{
    BodyPartSegmenter, CategorySegmenter, FaceLandmarker, HandDetector, ProviderError,
};
pub use smoother::NailBedSmoother;
pub use types::{
    hex_to_rgb, BlendMode, FaceMesh, FingerType, FrameClock, HairSettings, HandSkeleton,
    Handedness, Landmark, NailBed, NailPattern, NailSettings, Point, Rgb, Subject, Timestamp,
};

use std::path::PathBuf;

/// Default directory searched for ONNX model files.
///
/// `$XDG_DATA_HOME/tryon/models`, falling back to `~/.local/share/tryon/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("tryon")
        .join("models")
}

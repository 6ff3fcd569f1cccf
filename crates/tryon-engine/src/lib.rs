//! tryon-engine — Per-frame orchestration.
//!
//! Runs the hair and nail pipelines (detection, geometry, smoothing,
//! compositing) over frames pulled by the [`driver::FrameDriver`], never more
//! than one frame in flight.

pub mod config;
pub mod driver;
pub mod pipeline;
pub mod preload;
pub mod providers;
pub mod status;

pub use config::Config;
pub use driver::{FrameDriver, FrameEvent, FrameStatus, TickOutcome};
pub use pipeline::{
    ActiveModality, FrameProcessor, HairPipeline, HairTier, Modality, NailPipeline, PipelineError,
    Rendered,
};
pub use providers::Providers;
pub use status::{DetectionMonitor, DetectionStatus};

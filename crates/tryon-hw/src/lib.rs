//! tryon-hw — Video sources for the try-on pipeline.
//!
//! Provides V4L2 camera capture converted to RGBA, and a still image looped
//! as a stream for offline rendering.

pub mod camera;
pub mod frame;
pub mod still;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use still::StillSource;

/// Anything that yields RGBA video frames.
pub trait FrameSource {
    /// Pull the next frame. Blocks until one is available.
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Frame size in pixels.
    fn dimensions(&self) -> (u32, u32);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        (**self).next_frame()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }
}

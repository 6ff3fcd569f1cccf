//! A still image served as an endless video stream.

use crate::camera::CameraError;
use crate::frame::{Frame, FrameError};
use crate::FrameSource;
use image::RgbaImage;
use std::path::Path;
use std::time::Instant;

pub struct StillSource {
    image: RgbaImage,
    sequence: u32,
}

impl StillSource {
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let image = image::open(path)?.to_rgba8();
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded still image"
        );
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image, sequence: 0 }
    }
}

impl FrameSource for StillSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Frame {
            image: self.image.clone(),
            timestamp: Instant::now(),
            sequence,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

//! Frame type and pixel format conversion to RGBA.

use image::RgbaImage;
use std::time::Instant;

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub timestamp: Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("decode: {0}")]
    Decode(#[from] image::ImageError),
}

fn check_len(format: &'static str, buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn from_raw(width: u32, height: u32, rgba: Vec<u8>) -> RgbaImage {
    // Length is checked by the callers, so this never falls back.
    RgbaImage::from_raw(width, height, rgba).unwrap_or_else(|| RgbaImage::new(width, height))
}

/// BT.601 limited-range YCbCr to RGB.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = cb as i32 - 128;
    let e = cr as i32 - 128;
    let clip = |v: i32| ((v + 128) >> 8).clamp(0, 255) as u8;
    [
        clip(c + 409 * e),
        clip(c - 100 * d - 208 * e),
        clip(c + 516 * d),
    ]
}

/// Convert packed YUYV (4:2:2) to RGBA.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], sharing chroma.
pub fn yuyv_to_rgba(yuyv: &[u8], width: u32, height: u32) -> Result<RgbaImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len("YUYV", yuyv, pixels * 2)?;
    let mut rgba = Vec::with_capacity(pixels * 4);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            rgba.extend_from_slice(&ycbcr_to_rgb(y, u, v));
            rgba.push(u8::MAX);
        }
    }
    Ok(from_raw(width, height, rgba))
}

pub fn rgb24_to_rgba(rgb: &[u8], width: u32, height: u32) -> Result<RgbaImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len("RGB24", rgb, pixels * 3)?;
    let mut rgba = Vec::with_capacity(pixels * 4);
    for px in rgb[..pixels * 3].chunks_exact(3) {
        rgba.extend_from_slice(px);
        rgba.push(u8::MAX);
    }
    Ok(from_raw(width, height, rgba))
}

pub fn grey_to_rgba(grey: &[u8], width: u32, height: u32) -> Result<RgbaImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len("GREY", grey, pixels)?;
    let rgba = grey[..pixels]
        .iter()
        .flat_map(|&g| [g, g, g, u8::MAX])
        .collect();
    Ok(from_raw(width, height, rgba))
}

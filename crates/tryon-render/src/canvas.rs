//! In-memory RGBA drawing surface.
//!
//! Vector drawing goes through tiny-skia, rendering straight into the
//! canvas buffer. Canvas pixels are always opaque, which makes the straight
//! RGBA bytes valid premultiplied data for tiny-skia as well.

use crate::paint::{skia_blend, Paint};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use thiserror::Error;
use tiny_skia::{FillRule, Path, PixmapMut, Rect, Stroke, Transform};
use tryon_core::BlendMode;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("canvas is empty (0×0)")]
    EmptyCanvas,
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

/// Drawing surface the pipelines composite onto. Starts as a copy of the
/// current video frame and is mutated in place.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
        }
    }

    /// Any transparency in `image` is dropped.
    pub fn from_image(mut image: RgbaImage) -> Self {
        make_opaque(&mut image);
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Direct pixel access for per-pixel compositors. Alpha must stay 255.
    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Replace the canvas content with `frame`, resizing the canvas to match.
    pub fn draw_frame(&mut self, frame: &RgbaImage) {
        if self.image.dimensions() == frame.dimensions() {
            self.image.copy_from_slice(frame.as_raw());
        } else {
            tracing::debug!(
                from = ?self.image.dimensions(),
                to = ?frame.dimensions(),
                "canvas resized to frame"
            );
            self.image = frame.clone();
        }
        make_opaque(&mut self.image);
    }

    /// Fill `path` (given in `transform`'s source space) with anti-aliasing.
    pub fn fill_path(
        &mut self,
        path: &Path,
        paint: &Paint,
        opacity: f32,
        blend: BlendMode,
        transform: Transform,
    ) {
        let Some(paint) = skia_paint(paint, opacity, blend) else {
            return;
        };
        if let Some(mut pixmap) = self.pixmap() {
            pixmap.fill_path(path, &paint, FillRule::Winding, transform, None);
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, paint: &Paint, opacity: f32, blend: BlendMode) {
        let Some(paint) = skia_paint(paint, opacity, blend) else {
            return;
        };
        if let Some(mut pixmap) = self.pixmap() {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    /// Stroke `path` with round joins; `line_width` is in source units.
    pub fn stroke_path(
        &mut self,
        path: &Path,
        line_width: f32,
        paint: &Paint,
        opacity: f32,
        blend: BlendMode,
        transform: Transform,
    ) {
        if !(line_width > 0.0 && line_width.is_finite()) {
            return;
        }
        let Some(paint) = skia_paint(paint, opacity, blend) else {
            return;
        };
        let stroke = Stroke {
            width: line_width,
            line_join: tiny_skia::LineJoin::Round,
            ..Stroke::default()
        };
        if let Some(mut pixmap) = self.pixmap() {
            pixmap.stroke_path(path, &paint, &stroke, transform, None);
        }
    }

    /// Borrow the buffer as a tiny-skia pixmap; `None` for an empty canvas.
    fn pixmap(&mut self) -> Option<PixmapMut<'_>> {
        let (w, h) = self.image.dimensions();
        let data: &mut [u8] = &mut self.image;
        PixmapMut::from_bytes(data, w, h)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(RenderError::EmptyCanvas);
        }
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }
}

fn skia_paint(paint: &Paint, opacity: f32, blend: BlendMode) -> Option<tiny_skia::Paint<'static>> {
    Some(tiny_skia::Paint {
        shader: paint.shader(opacity)?,
        blend_mode: skia_blend(blend),
        anti_alias: true,
        ..tiny_skia::Paint::default()
    })
}

fn make_opaque(image: &mut RgbaImage) {
    for px in image.pixels_mut() {
        px.0[3] = u8::MAX;
    }
}

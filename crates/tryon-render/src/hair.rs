//! Hair color compositors: per-pixel recoloring from a mask or category grid,
//! and a painted estimate when only the face is known.

use crate::canvas::Canvas;
use crate::paint::{ColorStop, Paint};
use tiny_skia::{Path, PathBuilder, Rect, Transform};
use tryon_core::{AlphaMask, CategoryGrid, HairRegion, HairSettings, Point};

/// Mask alpha at or below this is left untouched.
pub const DEFAULT_MASK_THRESHOLD: u8 = 10;

/// Recolor one pixel, preserving its luminance. `mask_alpha` scales the blend.
pub fn recolor_pixel(px: &mut [u8; 4], settings: &HairSettings, mask_alpha: u8) {
    let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
    let luminance = (0.299 * r + 0.587 * g + 0.114 * b) / 255.0;
    let brightness = settings.brightness.max(0.0);

    let mut target = [
        settings.color.r as f32 * luminance * brightness,
        settings.color.g as f32 * luminance * brightness,
        settings.color.b as f32 * luminance * brightness,
    ];
    if settings.saturation != 1.0 {
        let gray = (target[0] + target[1] + target[2]) / 3.0;
        for t in &mut target {
            *t = gray + (*t - gray) * settings.saturation;
        }
    }

    let weight = settings.opacity.clamp(0.0, 1.0) * mask_alpha as f32 / 255.0;
    for (c, t) in target.iter().enumerate() {
        let orig = px[c] as f32;
        px[c] = (orig * (1.0 - weight) + t * weight).round().clamp(0.0, 255.0) as u8;
    }
}

/// Recolor every canvas pixel whose mask alpha exceeds `threshold`.
/// Returns the number of pixels touched.
pub fn recolor_with_mask(
    canvas: &mut Canvas,
    mask: &AlphaMask,
    settings: &HairSettings,
    threshold: u8,
) -> usize {
    if (mask.width, mask.height) != canvas.dimensions() {
        tracing::warn!(
            mask = ?(mask.width, mask.height),
            canvas = ?canvas.dimensions(),
            "hair mask does not match canvas; skipping"
        );
        return 0;
    }
    let mut touched = 0;
    for (px, &alpha) in canvas.pixels_mut().pixels_mut().zip(mask.alpha.iter()) {
        if alpha > threshold {
            recolor_pixel(&mut px.0, settings, alpha);
            touched += 1;
        }
    }
    touched
}

/// Recolor hair cells of a low-resolution category grid, mapped onto the
/// canvas by nearest neighbour.
pub fn recolor_with_grid(canvas: &mut Canvas, grid: &CategoryGrid, settings: &HairSettings) -> usize {
    if grid.width == 0 || grid.height == 0 {
        return 0;
    }
    let (w, h) = canvas.dimensions();
    let mut touched = 0;
    for (x, y, px) in canvas.pixels_mut().enumerate_pixels_mut() {
        if grid.sample(x, y, w, h) == CategoryGrid::HAIR {
            recolor_pixel(&mut px.0, settings, u8::MAX);
            touched += 1;
        }
    }
    touched
}

/// Paint a soft crown and two side locks over the estimated hair region.
pub fn paint_hair_estimate(canvas: &mut Canvas, region: &HairRegion, settings: &HairSettings) {
    let hair = region.hair;
    let face = region.face;
    if !(hair.width > 0.0 && hair.height > 0.0) {
        return;
    }
    let color = settings.color;
    let opacity = settings.opacity.clamp(0.0, 1.0);
    let blend = settings.blend_mode;

    let crown_center = Point::new(hair.center_x(), hair.bottom() - hair.height * 0.35);
    let (rx, ry) = (hair.width / 2.0, hair.height * 0.65);
    let Some(crown) = ellipse(crown_center, rx, ry) else {
        return;
    };
    let crown_paint = Paint::Radial {
        center: crown_center,
        radius: rx.max(ry),
        stops: vec![
            ColorStop::new(0.0, color, opacity),
            ColorStop::new(0.7, color, opacity * 0.6),
            ColorStop::new(1.0, color, 0.0),
        ],
    };
    canvas.fill_path(&crown, &crown_paint, 1.0, blend, Transform::identity());

    let side_rx = hair.width * 0.15;
    let side_ry = (face.height * 0.45).max(side_rx);
    let side_y = face.y + face.height * 0.25;
    for side_x in [hair.x + side_rx, hair.x + hair.width - side_rx] {
        let center = Point::new(side_x, side_y);
        let Some(side) = ellipse(center, side_rx, side_ry) else {
            continue;
        };
        let paint = Paint::Radial {
            center,
            radius: side_rx.max(side_ry),
            stops: vec![
                ColorStop::new(0.0, color, opacity * 0.7),
                ColorStop::new(1.0, color, 0.0),
            ],
        };
        canvas.fill_path(&side, &paint, 1.0, blend, Transform::identity());
    }
}

fn ellipse(center: Point, rx: f32, ry: f32) -> Option<Path> {
    let bounds = Rect::from_xywh(center.x - rx, center.y - ry, rx * 2.0, ry * 2.0)?;
    PathBuilder::from_oval(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tryon_core::{BlendMode, PixelRect, Rgb};

    fn settings() -> HairSettings {
        HairSettings {
            color: Rgb::new(255, 0, 0),
            opacity: 1.0,
            ..HairSettings::default()
        }
    }

    #[test]
    fn test_recolor_preserves_luminance_scale() {
        let mut px = [255, 255, 255, 255];
        recolor_pixel(&mut px, &settings(), 255);
        assert_eq!(px, [255, 0, 0, 255]);

        let mut dark = [0, 0, 0, 255];
        recolor_pixel(&mut dark, &settings(), 255);
        assert_eq!(dark, [0, 0, 0, 255]);
    }

    #[test]
    fn test_recolor_zero_saturation_is_gray() {
        let mut px = [255, 255, 255, 255];
        let s = HairSettings {
            saturation: 0.0,
            ..settings()
        };
        recolor_pixel(&mut px, &s, 255);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[0], 85);
    }

    #[test]
    fn test_mask_alpha_scales_blend() {
        let mut px = [200, 200, 200, 255];
        recolor_pixel(&mut px, &settings(), 0);
        assert_eq!(px, [200, 200, 200, 255]);
    }

    #[test]
    fn test_recolor_with_mask_threshold() {
        let mut canvas = Canvas::from_image(RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255])));
        let mask = AlphaMask {
            width: 2,
            height: 1,
            alpha: vec![10, 255],
        };
        let touched = recolor_with_mask(&mut canvas, &mask, &settings(), DEFAULT_MASK_THRESHOLD);
        assert_eq!(touched, 1);
        assert_eq!(canvas.image().get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(canvas.image().get_pixel(1, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_recolor_with_mismatched_mask() {
        let mut canvas = Canvas::new(4, 4);
        let mask = AlphaMask::new(2, 2);
        assert_eq!(recolor_with_mask(&mut canvas, &mask, &settings(), 0), 0);
    }

    #[test]
    fn test_recolor_with_grid() {
        let mut canvas = Canvas::from_image(RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255])));
        let grid = CategoryGrid::new(2, 1, vec![CategoryGrid::HAIR, CategoryGrid::FACE_SKIN]);
        assert_eq!(recolor_with_grid(&mut canvas, &grid, &settings()), 4);
        assert_eq!(canvas.image().get_pixel(0, 1).0, [255, 0, 0, 255]);
        assert_eq!(canvas.image().get_pixel(3, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_paint_estimate_tints_crown_only() {
        let mut canvas = Canvas::from_image(RgbaImage::from_pixel(100, 100, Rgba([200, 200, 200, 255])));
        let region = HairRegion {
            face: PixelRect {
                x: 40.0,
                y: 50.0,
                width: 20.0,
                height: 40.0,
            },
            hair: PixelRect {
                x: 35.0,
                y: 18.0,
                width: 30.0,
                height: 32.0,
            },
        };
        let s = HairSettings {
            color: Rgb::new(0, 0, 255),
            opacity: 1.0,
            blend_mode: BlendMode::SourceOver,
            ..HairSettings::default()
        };
        paint_hair_estimate(&mut canvas, &region, &s);
        let crown = canvas.image().get_pixel(50, 40).0;
        assert!(crown[2] > crown[0]);
        assert_eq!(canvas.image().get_pixel(5, 95).0, [200, 200, 200, 255]);
    }
}

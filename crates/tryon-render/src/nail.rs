//! Nail polish compositor.
//!
//! Each nail is drawn in nail-local coordinates (origin at the nail center,
//! `-y` toward the fingertip) and mapped onto the canvas by rotation and
//! translation.

use crate::canvas::Canvas;
use crate::paint::{ColorStop, Paint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiny_skia::{Path, PathBuilder, Transform};
use tryon_core::{BlendMode, NailBed, NailPattern, NailSettings, Point, Rgb};

/// Nails at or below this confidence are skipped.
pub const MIN_NAIL_CONFIDENCE: f32 = 0.3;

const CORNER_RADIUS_RATIO: f32 = 0.4;
const SHADOW_OFFSET: f32 = 1.0;
const SHADOW_ALPHA: f32 = 0.25;
const EDGE_BRIGHTNESS: f32 = 0.85;
const CENTER_BRIGHTNESS: f32 = 1.1;
const GLOSS_ALPHA: f32 = 0.45;
const FRENCH_TIP_RATIO: f32 = 0.3;
const GLITTER_DOTS: usize = 15;
const OUTLINE_WIDTH: f32 = 1.5;
const OUTLINE_ALPHA: f32 = 0.3;

const WHITE: Rgb = Rgb::new(255, 255, 255);
const BLACK: Rgb = Rgb::new(0, 0, 0);

pub struct NailRenderer {
    rng: StdRng,
    min_confidence: f32,
}

impl NailRenderer {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            min_confidence: MIN_NAIL_CONFIDENCE,
        }
    }

    /// Deterministic glitter placement.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            min_confidence: MIN_NAIL_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Draw every bed above the confidence floor. Returns how many were drawn.
    pub fn draw_nail_beds(
        &mut self,
        canvas: &mut Canvas,
        beds: &[NailBed],
        settings: &NailSettings,
    ) -> usize {
        let mut drawn = 0;
        for bed in beds {
            if bed.confidence > self.min_confidence {
                self.draw_nail(canvas, bed.center, bed.width, bed.height, settings, bed.rotation);
                drawn += 1;
            }
        }
        drawn
    }

    /// Draw one polished nail centered at `center`, rotated by `rotation` radians.
    pub fn draw_nail(
        &mut self,
        canvas: &mut Canvas,
        center: Point,
        width: f32,
        height: f32,
        settings: &NailSettings,
        rotation: f32,
    ) {
        if !center.x.is_finite() || !center.y.is_finite() || !rotation.is_finite() {
            return;
        }
        let (hw, hh) = (width / 2.0, height / 2.0);
        let radius = width * CORNER_RADIUS_RATIO;
        let Some(shape) = rounded_rect(-hw, -hh, width, height, radius) else {
            return;
        };
        let to_canvas =
            Transform::from_rotate(rotation.to_degrees()).post_translate(center.x, center.y);
        let opacity = settings.opacity.clamp(0.0, 1.0);
        let over = BlendMode::SourceOver;

        canvas.fill_path(
            &shape,
            &Paint::solid_alpha(BLACK, SHADOW_ALPHA),
            1.0,
            over,
            to_canvas.post_translate(0.0, SHADOW_OFFSET),
        );

        let edge = scale_rgb(settings.color, EDGE_BRIGHTNESS);
        let base = Paint::Linear {
            start: Point::new(-hw, 0.0),
            end: Point::new(hw, 0.0),
            stops: vec![
                ColorStop::new(0.0, edge, 1.0),
                ColorStop::new(0.5, scale_rgb(settings.color, CENTER_BRIGHTNESS), 1.0),
                ColorStop::new(1.0, edge, 1.0),
            ],
        };
        canvas.fill_path(&shape, &base, opacity, over, to_canvas);

        let gloss = settings.glossiness.clamp(0.0, 1.0);
        if gloss > 0.0 {
            let highlight = Paint::Radial {
                center: Point::new(-width * 0.2, -height * 0.25),
                radius: width * 0.5,
                stops: vec![
                    ColorStop::new(0.0, WHITE, GLOSS_ALPHA * gloss),
                    ColorStop::new(1.0, WHITE, 0.0),
                ],
            };
            canvas.fill_path(&shape, &highlight, 1.0, over, to_canvas);
        }

        match settings.pattern {
            NailPattern::Solid => {}
            NailPattern::French => {
                if let Some(tip) = french_tip(width, height, radius) {
                    canvas.fill_path(&tip, &Paint::solid(WHITE), 1.0, over, to_canvas);
                }
            }
            NailPattern::Glitter => {
                for _ in 0..GLITTER_DOTS {
                    let x = self.rng.gen_range(-0.4..=0.4) * width;
                    let y = self.rng.gen_range(-0.4..=0.4) * height;
                    let r = self.rng.gen_range(0.5..=1.5);
                    let alpha = self.rng.gen_range(0.5..=1.0);
                    if let Some(dot) = PathBuilder::from_circle(x, y, r) {
                        canvas.fill_path(&dot, &Paint::solid_alpha(WHITE, alpha), 1.0, over, to_canvas);
                    }
                }
            }
            NailPattern::Ombre => {
                let color = settings.color;
                let ombre = Paint::Linear {
                    start: Point::new(0.0, -hh),
                    end: Point::new(0.0, hh),
                    stops: vec![
                        ColorStop::new(0.0, color, opacity),
                        ColorStop::new(0.4, color, opacity * 0.8),
                        ColorStop::new(0.7, mix_rgb(color, WHITE, 0.5), opacity * 0.6),
                        ColorStop::new(1.0, WHITE, opacity * 0.5),
                    ],
                };
                canvas.fill_path(&shape, &ombre, 1.0, over, to_canvas);
            }
        }

        canvas.stroke_path(
            &shape,
            OUTLINE_WIDTH,
            &Paint::solid_alpha(BLACK, OUTLINE_ALPHA),
            1.0,
            over,
            to_canvas,
        );
    }
}

impl Default for NailRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rectangle with quadratic corners of radius `r`, clamped to half the
/// shorter side. `None` for an empty or non-finite rectangle.
fn rounded_rect(x: f32, y: f32, width: f32, height: f32, r: f32) -> Option<Path> {
    if !(width > 0.0 && height > 0.0) {
        return None;
    }
    let r = r.clamp(0.0, width.min(height) / 2.0);
    let (right, bottom) = (x + width, y + height);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.quad_to(right, y, right, y + r);
    pb.line_to(right, bottom - r);
    pb.quad_to(right, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.quad_to(x, bottom, x, bottom - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Tip cap for a french manicure: the top of the nail down to a curved smile line.
fn french_tip(width: f32, height: f32, radius: f32) -> Option<Path> {
    let (hw, hh) = (width / 2.0, height / 2.0);
    let tip = height * FRENCH_TIP_RATIO;
    let r = radius.min(hw).min(tip);
    let line_y = -hh + tip;
    let mut pb = PathBuilder::new();
    pb.move_to(-hw, line_y);
    pb.line_to(-hw, -hh + r);
    pb.quad_to(-hw, -hh, -hw + r, -hh);
    pb.line_to(hw - r, -hh);
    pb.quad_to(hw, -hh, hw, -hh + r);
    pb.line_to(hw, line_y);
    pb.quad_to(0.0, line_y - tip * 0.6, -hw, line_y);
    pb.close();
    pb.finish()
}

fn scale_rgb(c: Rgb, f: f32) -> Rgb {
    let s = |v: u8| (v as f32 * f).round().clamp(0.0, 255.0) as u8;
    Rgb::new(s(c.r), s(c.g), s(c.b))
}

fn mix_rgb(a: Rgb, b: Rgb, t: f32) -> Rgb {
    let m = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    Rgb::new(m(a.r, b.r), m(a.g, b.g), m(a.b, b.b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tryon_core::FingerType;

    fn gray_canvas() -> Canvas {
        Canvas::from_image(RgbaImage::from_pixel(64, 64, Rgba([128, 128, 128, 255])))
    }

    fn distance(px: [u8; 4], c: Rgb) -> f32 {
        let d = |a: u8, b: u8| (a as f32 - b as f32).powi(2);
        (d(px[0], c.r) + d(px[1], c.g) + d(px[2], c.b)).sqrt()
    }

    fn bed(confidence: f32) -> NailBed {
        NailBed {
            center: Point::new(32.0, 32.0),
            width: 16.0,
            height: 20.0,
            rotation: 0.3,
            curvature: 0.0,
            finger: FingerType::Index,
            confidence,
        }
    }

    #[test]
    fn test_nail_center_moves_toward_polish() {
        let mut canvas = gray_canvas();
        let red = Rgb::new(220, 20, 60);
        let before = distance(canvas.image().get_pixel(32, 32).0, red);
        let settings = NailSettings {
            color: red,
            glossiness: 0.0,
            ..NailSettings::default()
        };
        NailRenderer::with_seed(1).draw_nail(
            &mut canvas,
            Point::new(32.0, 32.0),
            16.0,
            20.0,
            &settings,
            0.0,
        );
        let after = distance(canvas.image().get_pixel(32, 32).0, red);
        assert!(after < before, "after {after} should be below {before}");
    }

    #[test]
    fn test_pixels_outside_nail_untouched() {
        let mut canvas = gray_canvas();
        NailRenderer::with_seed(1).draw_nail(
            &mut canvas,
            Point::new(32.0, 32.0),
            8.0,
            10.0,
            &NailSettings::default(),
            0.0,
        );
        assert_eq!(canvas.image().get_pixel(2, 2).0, [128, 128, 128, 255]);
        assert_eq!(canvas.image().get_pixel(60, 60).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_low_confidence_beds_skipped() {
        let mut canvas = gray_canvas();
        let drawn = NailRenderer::with_seed(1).draw_nail_beds(
            &mut canvas,
            &[bed(0.2), bed(0.3), bed(0.9)],
            &NailSettings::default(),
        );
        assert_eq!(drawn, 1);
    }

    #[test]
    fn test_degenerate_nail_is_noop() {
        let mut canvas = gray_canvas();
        let original = canvas.image().clone();
        NailRenderer::with_seed(1).draw_nail(
            &mut canvas,
            Point::new(32.0, 32.0),
            0.0,
            0.0,
            &NailSettings::default(),
            0.0,
        );
        assert_eq!(canvas.image(), &original);
    }

    #[test]
    fn test_french_tip_is_white() {
        let mut canvas = gray_canvas();
        let settings = NailSettings {
            color: Rgb::new(0, 0, 128),
            glossiness: 0.0,
            pattern: NailPattern::French,
            ..NailSettings::default()
        };
        NailRenderer::with_seed(1).draw_nail(
            &mut canvas,
            Point::new(32.0, 32.0),
            20.0,
            30.0,
            &settings,
            0.0,
        );
        // Tip region (toward -y) is near white, base keeps the polish hue.
        let tip = canvas.image().get_pixel(32, 20).0;
        let base = canvas.image().get_pixel(32, 42).0;
        assert!(tip[0] > 200 && tip[1] > 200);
        assert!(base[2] > base[0]);
    }

    #[test]
    fn test_rotation_turns_nail_sideways() {
        let mut canvas = gray_canvas();
        let settings = NailSettings {
            color: Rgb::new(255, 0, 0),
            opacity: 1.0,
            glossiness: 0.0,
            ..NailSettings::default()
        };
        // A tall 8x30 nail turned a quarter turn lies along the x axis.
        NailRenderer::with_seed(1).draw_nail(
            &mut canvas,
            Point::new(32.0, 32.0),
            8.0,
            30.0,
            &settings,
            std::f32::consts::FRAC_PI_2,
        );
        assert!(canvas.image().get_pixel(44, 32).0[0] > 200);
        assert_eq!(canvas.image().get_pixel(32, 44).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_rounded_rect_rejects_empty() {
        assert!(rounded_rect(0.0, 0.0, 0.0, 5.0, 1.0).is_none());
        let bounds = rounded_rect(-5.0, -10.0, 10.0, 20.0, 50.0).unwrap().bounds();
        assert_eq!((bounds.left(), bounds.right()), (-5.0, 5.0));
        assert_eq!((bounds.top(), bounds.bottom()), (-10.0, 10.0));
    }

    #[test]
    fn test_glitter_is_deterministic_with_seed() {
        let settings = NailSettings {
            pattern: NailPattern::Glitter,
            ..NailSettings::default()
        };
        let mut a = gray_canvas();
        let mut b = gray_canvas();
        NailRenderer::with_seed(7).draw_nail(&mut a, Point::new(32.0, 32.0), 20.0, 24.0, &settings, 0.5);
        NailRenderer::with_seed(7).draw_nail(&mut b, Point::new(32.0, 32.0), 20.0, 24.0, &settings, 0.5);
        assert_eq!(a.image(), b.image());
    }
}

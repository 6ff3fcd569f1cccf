//! Fill paints (solid, linear and radial gradients) expressed in our color
//! types and lowered to tiny-skia shaders at draw time.

use tiny_skia::{Color, GradientStop, LinearGradient, RadialGradient, Shader, SpreadMode};
use tryon_core::{BlendMode, Point, Rgb};

/// A gradient stop; `offset` in 0..=1, `alpha` in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    pub color: Rgb,
    pub alpha: f32,
}

impl ColorStop {
    pub fn new(offset: f32, color: Rgb, alpha: f32) -> Self {
        Self {
            offset,
            color,
            alpha,
        }
    }
}

/// Gradient coordinates are in the same space as the path they fill, so a
/// paint built in nail-local units follows the nail's transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid { color: Rgb, alpha: f32 },
    /// Gradient along `start → end`, padded beyond both ends.
    Linear {
        start: Point,
        end: Point,
        stops: Vec<ColorStop>,
    },
    /// Concentric gradient out to `radius` around `center`.
    Radial {
        center: Point,
        radius: f32,
        stops: Vec<ColorStop>,
    },
}

impl Paint {
    pub fn solid(color: Rgb) -> Self {
        Paint::Solid { color, alpha: 1.0 }
    }

    pub fn solid_alpha(color: Rgb, alpha: f32) -> Self {
        Paint::Solid { color, alpha }
    }

    /// Shader with every alpha scaled by `opacity`. `None` when there is
    /// nothing to draw: no stops, a non-positive radius or zero opacity.
    pub(crate) fn shader(&self, opacity: f32) -> Option<Shader<'static>> {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 {
            return None;
        }
        match self {
            Paint::Solid { color, alpha } => {
                Some(Shader::SolidColor(skia_color(*color, alpha * opacity)))
            }
            Paint::Linear { start, end, stops } => LinearGradient::new(
                skia_point(*start),
                skia_point(*end),
                skia_stops(stops, opacity),
                SpreadMode::Pad,
                tiny_skia::Transform::identity(),
            ),
            Paint::Radial {
                center,
                radius,
                stops,
            } => RadialGradient::new(
                skia_point(*center),
                skia_point(*center),
                *radius,
                skia_stops(stops, opacity),
                SpreadMode::Pad,
                tiny_skia::Transform::identity(),
            ),
        }
    }
}

pub(crate) fn skia_blend(mode: BlendMode) -> tiny_skia::BlendMode {
    match mode {
        BlendMode::SourceOver => tiny_skia::BlendMode::SourceOver,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
        BlendMode::Screen => tiny_skia::BlendMode::Screen,
        BlendMode::Overlay => tiny_skia::BlendMode::Overlay,
    }
}

fn skia_color(color: Rgb, alpha: f32) -> Color {
    let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color::from_rgba8(color.r, color.g, color.b, a)
}

fn skia_point(p: Point) -> tiny_skia::Point {
    tiny_skia::Point::from_xy(p.x, p.y)
}

fn skia_stops(stops: &[ColorStop], opacity: f32) -> Vec<GradientStop> {
    stops
        .iter()
        .map(|s| GradientStop::new(s.offset, skia_color(s.color, s.alpha * opacity)))
        .collect()
}

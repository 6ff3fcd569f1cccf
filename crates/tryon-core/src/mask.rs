//! Segmentation grids, canvas-resolution hair masks and the face-based hair
//! region estimate.

use crate::types::FaceMesh;
use serde::{Deserialize, Serialize};

/// Fraction of the canvas height (from the top) where body-part hair may appear.
const HAIR_UPPER_FRACTION: f32 = 0.4;
/// Hair box height relative to face height.
const HAIR_HEIGHT_RATIO: f32 = 0.8;
/// Hair box widening per side relative to face width.
const HAIR_SIDE_RATIO: f32 = 0.25;

/// Low-resolution per-pixel category labels from the selfie segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGrid {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<u8>,
}

impl CategoryGrid {
    pub const BACKGROUND: u8 = 0;
    pub const HAIR: u8 = 1;
    pub const BODY_SKIN: u8 = 2;
    pub const FACE_SKIN: u8 = 3;
    pub const CLOTHES: u8 = 4;
    pub const OTHERS: u8 = 5;

    pub fn new(width: usize, height: usize, labels: Vec<u8>) -> Self {
        debug_assert_eq!(labels.len(), width * height);
        Self {
            width,
            height,
            labels,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.labels
            .get(y * self.width + x)
            .copied()
            .unwrap_or(Self::BACKGROUND)
    }

    pub fn contains(&self, category: u8) -> bool {
        self.labels.contains(&category)
    }

    /// Label of the grid cell under canvas pixel `(x, y)`.
    pub fn sample(&self, x: u32, y: u32, canvas_width: u32, canvas_height: u32) -> u8 {
        let (gx, gy) = nearest_cell(x, y, canvas_width, canvas_height, self.width, self.height);
        self.get(gx, gy)
    }
}

/// Low-resolution body part ids from the body-part segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPartGrid {
    pub width: usize,
    pub height: usize,
    pub parts: Vec<i8>,
}

impl BodyPartGrid {
    pub const BACKGROUND: i8 = -1;
    pub const LEFT_FACE: i8 = 0;
    pub const RIGHT_FACE: i8 = 1;
    pub const TORSO_FRONT: i8 = 12;

    pub fn new(width: usize, height: usize, parts: Vec<i8>) -> Self {
        debug_assert_eq!(parts.len(), width * height);
        Self {
            width,
            height,
            parts,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> i8 {
        self.parts
            .get(y * self.width + x)
            .copied()
            .unwrap_or(Self::BACKGROUND)
    }

    pub fn has_person(&self) -> bool {
        self.parts.iter().any(|&p| p != Self::BACKGROUND)
    }
}

/// Canvas-resolution 8-bit alpha mask.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![0; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.alpha
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Number of pixels with alpha above `threshold`.
    pub fn coverage(&self, threshold: u8) -> usize {
        self.alpha.iter().filter(|&&a| a > threshold).count()
    }
}

fn nearest_cell(
    x: u32,
    y: u32,
    canvas_width: u32,
    canvas_height: u32,
    grid_width: usize,
    grid_height: usize,
) -> (usize, usize) {
    let gx = (x as usize * grid_width) / canvas_width.max(1) as usize;
    let gy = (y as usize * grid_height) / canvas_height.max(1) as usize;
    (
        gx.min(grid_width.saturating_sub(1)),
        gy.min(grid_height.saturating_sub(1)),
    )
}

/// Hair mask from body parts: face parts or torso-front, only in the upper
/// part of the canvas.
pub fn body_parts_to_hair_mask(grid: &BodyPartGrid, width: u32, height: u32) -> AlphaMask {
    let mut mask = AlphaMask::new(width, height);
    if grid.width == 0 || grid.height == 0 {
        return mask;
    }
    let upper_limit = height as f32 * HAIR_UPPER_FRACTION;

    for y in 0..height {
        if y as f32 >= upper_limit {
            break;
        }
        for x in 0..width {
            let (gx, gy) = nearest_cell(x, y, width, height, grid.width, grid.height);
            let part = grid.get(gx, gy);
            let is_hair = matches!(
                part,
                BodyPartGrid::LEFT_FACE | BodyPartGrid::RIGHT_FACE | BodyPartGrid::TORSO_FRONT
            );
            if is_hair {
                mask.alpha[y as usize * width as usize + x as usize] = 255;
            }
        }
    }
    mask
}

/// Hair mask from segmenter categories.
pub fn categories_to_hair_mask(grid: &CategoryGrid, width: u32, height: u32) -> AlphaMask {
    let mut mask = AlphaMask::new(width, height);
    if grid.width == 0 || grid.height == 0 {
        return mask;
    }
    for y in 0..height {
        for x in 0..width {
            if grid.sample(x, y, width, height) == CategoryGrid::HAIR {
                mask.alpha[y as usize * width as usize + x as usize] = 255;
            }
        }
    }
    mask
}

/// Separable box blur with edge-clamped normalization.
pub fn box_blur(mask: &AlphaMask, radius: u32) -> AlphaMask {
    if radius == 0 || mask.width == 0 || mask.height == 0 {
        return mask.clone();
    }
    let (w, h) = (mask.width as usize, mask.height as usize);
    let r = radius as usize;

    let mut horizontal = vec![0u8; w * h];
    for y in 0..h {
        let row = &mask.alpha[y * w..(y + 1) * w];
        blur_line(row, &mut horizontal[y * w..(y + 1) * w], r);
    }

    let mut out = vec![0u8; w * h];
    let mut column = vec![0u8; h];
    let mut blurred = vec![0u8; h];
    for x in 0..w {
        for y in 0..h {
            column[y] = horizontal[y * w + x];
        }
        blur_line(&column, &mut blurred, r);
        for y in 0..h {
            out[y * w + x] = blurred[y];
        }
    }

    AlphaMask {
        width: mask.width,
        height: mask.height,
        alpha: out,
    }
}

/// 1-D running-sum box filter; the window is clipped at both ends and the
/// average taken over in-bounds samples only.
fn blur_line(src: &[u8], dst: &mut [u8], radius: usize) {
    let n = src.len();
    let mut sum: u32 = src[..radius.min(n - 1) + 1].iter().map(|&v| v as u32).sum();
    let mut lo = 0usize;
    let mut hi = radius.min(n - 1);

    for (i, out) in dst.iter_mut().enumerate() {
        let count = (hi - lo + 1) as u32;
        *out = ((sum + count / 2) / count) as u8;

        let next_hi = i + 1 + radius;
        if next_hi < n {
            sum += src[next_hi] as u32;
            hi = next_hi;
        }
        if i + 1 > radius {
            sum -= src[lo] as u32;
            lo += 1;
        }
    }
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Face bounds and the derived box where hair is expected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HairRegion {
    pub face: PixelRect,
    pub hair: PixelRect,
}

/// Estimate the hair box above a face mesh. `None` for an empty mesh.
pub fn estimate_hair_region(mesh: &FaceMesh, width: u32, height: u32) -> Option<HairRegion> {
    let first = mesh.landmarks.first()?;
    let (w, h) = (width as f32, height as f32);
    let (mut min_x, mut min_y) = (first.x * w, first.y * h);
    let (mut max_x, mut max_y) = (min_x, min_y);

    for lm in &mesh.landmarks[1..] {
        let (px, py) = (lm.x * w, lm.y * h);
        min_x = min_x.min(px);
        max_x = max_x.max(px);
        min_y = min_y.min(py);
        max_y = max_y.max(py);
    }

    let face = PixelRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    };
    let hair_height = face.height * HAIR_HEIGHT_RATIO;
    let hair = PixelRect {
        x: face.x - face.width * HAIR_SIDE_RATIO,
        y: face.y - hair_height,
        width: face.width * (1.0 + 2.0 * HAIR_SIDE_RATIO),
        height: hair_height,
    };
    Some(HairRegion { face, hair })
}

//! Network input preparation and ONNX session plumbing shared by all providers.

use crate::provider::ProviderError;
use image::RgbaImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// ImageNet channel means (RGB, 0..255) used by ResNet-style backbones.
pub const RESNET_MEAN: [f32; 3] = [123.15, 115.90, 103.06];

/// Metadata for mapping network-input coordinates back to the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
}

impl Letterbox {
    /// Fit a `src_width × src_height` frame inside `dst_width × dst_height`,
    /// preserving aspect ratio and centering the content.
    pub fn fit(src_width: u32, src_height: u32, dst_width: usize, dst_height: usize) -> Self {
        let sw = src_width.max(1) as f32;
        let sh = src_height.max(1) as f32;
        let scale = (dst_width as f32 / sw).min(dst_height as f32 / sh);
        let new_w = (sw * scale).round();
        let new_h = (sh * scale).round();
        Self {
            scale,
            pad_x: ((dst_width as f32 - new_w) / 2.0).max(0.0),
            pad_y: ((dst_height as f32 - new_h) / 2.0).max(0.0),
            src_width: src_width.max(1),
            src_height: src_height.max(1),
        }
    }

    /// Scaled content size inside the network input, in input pixels.
    pub fn content_size(&self) -> (usize, usize) {
        (
            (self.src_width as f32 * self.scale).round() as usize,
            (self.src_height as f32 * self.scale).round() as usize,
        )
    }

    /// Map a point in network-input pixels to normalized frame coordinates.
    pub fn to_normalized(&self, x: f32, y: f32) -> (f32, f32) {
        let fx = (x - self.pad_x) / self.scale;
        let fy = (y - self.pad_y) / self.scale;
        (fx / self.src_width as f32, fy / self.src_height as f32)
    }

    /// Map a normalized frame coordinate into network-input pixels.
    pub fn to_input(&self, nx: f32, ny: f32) -> (f32, f32) {
        (
            nx * self.src_width as f32 * self.scale + self.pad_x,
            ny * self.src_height as f32 * self.scale + self.pad_y,
        )
    }
}

/// How 0..255 channel values are normalized for the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputRange {
    ZeroToOne,
    MinusOneToOne,
    /// Subtract per-channel means, keep the 0..255 scale.
    MeanSubtracted([f32; 3]),
}

impl InputRange {
    fn normalize(self, channel: usize, value: f32) -> f32 {
        match self {
            InputRange::ZeroToOne => value / 255.0,
            InputRange::MinusOneToOne => value / 127.5 - 1.0,
            InputRange::MeanSubtracted(mean) => value - mean[channel],
        }
    }

    /// Raw value that normalizes to the padding value. Mean-subtracted inputs
    /// pad with the mean so padding reads as zero.
    fn pad_value(self, channel: usize) -> f32 {
        match self {
            InputRange::MeanSubtracted(mean) => mean[channel],
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    Nchw,
    Nhwc,
}

/// Letterbox an RGBA frame into a float tensor of `width × height`, using
/// bilinear resampling. Alpha is ignored.
pub fn letterbox_rgb(
    frame: &RgbaImage,
    width: usize,
    height: usize,
    range: InputRange,
    layout: TensorLayout,
) -> (Array4<f32>, Letterbox) {
    let (src_w, src_h) = frame.dimensions();
    let letterbox = Letterbox::fit(src_w, src_h, width, height);
    let mut tensor = match layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, height, width)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, height, width, 3)),
    };

    let (new_w, new_h) = letterbox.content_size();
    let pad_x = letterbox.pad_x.floor() as usize;
    let pad_y = letterbox.pad_y.floor() as usize;
    let inv_scale = 1.0 / letterbox.scale;
    let usable = src_w > 0 && src_h > 0;
    let (sw, sh) = (src_w as usize, src_h as usize);
    let raw = frame.as_raw();

    for y in 0..height {
        for x in 0..width {
            let inside = usable
                && y >= pad_y
                && y < pad_y + new_h
                && x >= pad_x
                && x < pad_x + new_w;

            let rgb = if inside {
                let src_y = ((y - pad_y) as f32 + 0.5) * inv_scale - 0.5;
                let src_x = ((x - pad_x) as f32 + 0.5) * inv_scale - 0.5;
                let y0 = (src_y.floor() as i64).clamp(0, sh as i64 - 1) as usize;
                let x0 = (src_x.floor() as i64).clamp(0, sw as i64 - 1) as usize;
                let y1 = (y0 + 1).min(sh - 1);
                let x1 = (x0 + 1).min(sw - 1);
                let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                let sample = |px: usize, py: usize, c: usize| raw[(py * sw + px) * 4 + c] as f32;
                let mut out = [0.0f32; 3];
                for (c, slot) in out.iter_mut().enumerate() {
                    *slot = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                        + sample(x1, y0, c) * fx * (1.0 - fy)
                        + sample(x0, y1, c) * (1.0 - fx) * fy
                        + sample(x1, y1, c) * fx * fy;
                }
                Some(out)
            } else {
                None
            };

            for c in 0..3 {
                let value = match rgb {
                    Some(px) => range.normalize(c, px[c]),
                    None => range.normalize(c, range.pad_value(c)),
                };
                match layout {
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                }
            }
        }
    }

    (tensor, letterbox)
}

/// Frame-aligned view of a dense output grid that spans the whole network input.
///
/// The returned grid covers only the letterboxed content at the output's
/// resolution; `source[i]` is the output cell index for frame cell `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMap {
    pub width: usize,
    pub height: usize,
    pub source: Vec<usize>,
}

impl CellMap {
    pub fn new(
        letterbox: &Letterbox,
        input_width: usize,
        input_height: usize,
        out_width: usize,
        out_height: usize,
    ) -> Self {
        let (content_w, content_h) = letterbox.content_size();
        let (input_width, input_height) = (input_width.max(1), input_height.max(1));
        let cells_x = out_width as f32 / input_width as f32;
        let cells_y = out_height as f32 / input_height as f32;
        let width = (content_w * out_width).div_ceil(input_width).max(1);
        let height = (content_h * out_height).div_ceil(input_height).max(1);

        let mut source = Vec::with_capacity(width * height);
        for fy in 0..height {
            for fx in 0..width {
                let nx = (fx as f32 + 0.5) / width as f32;
                let ny = (fy as f32 + 0.5) / height as f32;
                let (ix, iy) = letterbox.to_input(nx, ny);
                let ox = ((ix * cells_x) as usize).min(out_width.saturating_sub(1));
                let oy = ((iy * cells_y) as usize).min(out_height.saturating_sub(1));
                source.push(oy * out_width + ox);
            }
        }
        Self {
            width,
            height,
            source,
        }
    }
}

/// One extracted output tensor.
#[derive(Debug, Clone)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    /// First element, for scalar-like `[1, 1]` outputs.
    pub fn scalar(&self) -> Option<f32> {
        self.data.first().copied()
    }
}

/// An ONNX Runtime session behind a mutex so it can be shared across tasks.
pub struct OnnxModel {
    name: &'static str,
    session: Mutex<Session>,
    output_count: usize,
}

impl OnnxModel {
    pub fn load(name: &'static str, model_path: &Path) -> Result<Self, ProviderError> {
        if !model_path.exists() {
            return Err(ProviderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            model = name,
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name().to_string()).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded ONNX model"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            output_count: output_names.len(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the model on one input tensor and copy every output out of the session.
    pub fn run(&self, input: &Array4<f32>) -> Result<Vec<OutputTensor>, ProviderError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| ProviderError::InferenceFailed(format!("{}: session lock poisoned", self.name)))?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut extracted = Vec::with_capacity(self.output_count);
        for i in 0..self.output_count {
            let (shape, data) = outputs[i].try_extract_tensor::<f32>().map_err(|e| {
                ProviderError::InferenceFailed(format!("{} output {i}: {e}", self.name))
            })?;
            extracted.push(OutputTensor {
                shape: shape.iter().map(|&d| d.max(0) as usize).collect(),
                data: data.to_vec(),
            });
        }
        Ok(extracted)
    }
}

/// Run `model` on the blocking pool.
pub async fn run_blocking(
    model: Arc<OnnxModel>,
    input: Array4<f32>,
) -> Result<Vec<OutputTensor>, ProviderError> {
    let name = model.name();
    tokio::task::spawn_blocking(move || model.run(&input))
        .await
        .map_err(|e| ProviderError::InferenceFailed(format!("{name}: inference task failed: {e}")))?
}

/// Fetch output `index`, failing if the model produced fewer outputs or too few values.
pub fn output(
    outputs: &[OutputTensor],
    index: usize,
    min_len: usize,
) -> Result<&OutputTensor, ProviderError> {
    let tensor = outputs.get(index).ok_or_else(|| {
        ProviderError::InferenceFailed(format!(
            "expected at least {} outputs, got {}",
            index + 1,
            outputs.len()
        ))
    })?;
    if tensor.data.len() < min_len {
        return Err(ProviderError::InferenceFailed(format!(
            "output {index} has {} values, expected {min_len}",
            tensor.data.len()
        )));
    }
    Ok(tensor)
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_letterbox_wide_frame() {
        let lb = Letterbox::fit(640, 480, 256, 256);
        assert!((lb.scale - 0.4).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert!((lb.pad_y - 32.0).abs() < 1e-6);
        assert_eq!(lb.content_size(), (256, 192));
    }

    #[test]
    fn test_letterbox_round_trip() {
        let lb = Letterbox::fit(640, 480, 224, 224);
        let (ix, iy) = lb.to_input(0.25, 0.75);
        let (nx, ny) = lb.to_normalized(ix, iy);
        assert!((nx - 0.25).abs() < 1e-5);
        assert!((ny - 0.75).abs() < 1e-5);
    }

    #[test]
    fn test_letterbox_zero_size_frame() {
        let lb = Letterbox::fit(0, 0, 224, 224);
        assert!(lb.scale.is_finite());
        let (tensor, _) = letterbox_rgb(
            &RgbaImage::new(0, 0),
            8,
            8,
            InputRange::ZeroToOne,
            TensorLayout::Nchw,
        );
        assert!(tensor.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_letterbox_rgb_uniform_frame() {
        let frame = RgbaImage::from_pixel(20, 10, Rgba([255, 0, 51, 255]));
        let (tensor, lb) = letterbox_rgb(&frame, 16, 16, InputRange::ZeroToOne, TensorLayout::Nchw);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert_eq!(lb.content_size(), (16, 8));
        // Content rows.
        assert!((tensor[[0, 0, 8, 8]] - 1.0).abs() < 1e-5);
        assert!(tensor[[0, 1, 8, 8]].abs() < 1e-5);
        assert!((tensor[[0, 2, 8, 8]] - 0.2).abs() < 1e-5);
        // Padding rows.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_letterbox_rgb_nhwc_minus_one() {
        let frame = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let (tensor, _) =
            letterbox_rgb(&frame, 4, 4, InputRange::MinusOneToOne, TensorLayout::Nhwc);
        assert_eq!(tensor.shape(), &[1, 4, 4, 3]);
        assert!((tensor[[0, 1, 1, 0]] - 1.0).abs() < 1e-5);
        assert!((tensor[[0, 1, 1, 1]] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_mean_subtracted_padding_is_zero() {
        let frame = RgbaImage::from_pixel(8, 4, Rgba([200, 200, 200, 255]));
        let (tensor, _) = letterbox_rgb(
            &frame,
            8,
            8,
            InputRange::MeanSubtracted(RESNET_MEAN),
            TensorLayout::Nchw,
        );
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!((tensor[[0, 0, 4, 4]] - (200.0 - RESNET_MEAN[0])).abs() < 1e-3);
    }

    #[test]
    fn test_cell_map_skips_padding() {
        // 640x480 into 256x256: content rows 32..224.
        let lb = Letterbox::fit(640, 480, 256, 256);
        let map = CellMap::new(&lb, 256, 256, 256, 256);
        assert_eq!((map.width, map.height), (256, 192));
        // First frame row samples output row 32.
        assert_eq!(map.source[0] / 256, 32);
        assert_eq!(map.source[map.source.len() - 1] / 256, 223);
    }

    #[test]
    fn test_cell_map_coarse_grid() {
        let lb = Letterbox::fit(100, 100, 513, 513);
        let map = CellMap::new(&lb, 513, 513, 33, 33);
        assert_eq!((map.width, map.height), (33, 33));
        assert!(map.source.iter().all(|&i| i < 33 * 33));
    }

    #[test]
    fn test_output_bounds() {
        let outputs = vec![OutputTensor {
            shape: vec![1, 1],
            data: vec![0.9],
        }];
        assert_eq!(output(&outputs, 0, 1).unwrap().scalar(), Some(0.9));
        assert!(output(&outputs, 0, 2).is_err());
        assert!(output(&outputs, 1, 1).is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let result = OnnxModel::load("missing", Path::new("/nonexistent/model.onnx"));
        assert!(matches!(result, Err(ProviderError::ModelNotFound(_))));
    }
}

//! tryon-render — Software canvas and the nail, hair and makeup compositors.
//!
//! The canvas is an RGBA frame buffer; paths, gradients and blend modes are
//! rasterized onto it with tiny-skia.

pub mod canvas;
pub mod hair;
pub mod makeup;
pub mod nail;
pub mod paint;

pub use canvas::{Canvas, RenderError};
pub use nail::NailRenderer;
pub use paint::{ColorStop, Paint};
pub use tiny_skia::{Path, PathBuilder, Transform};

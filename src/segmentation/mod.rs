mod selfie;

pub use selfie::SelfieSegmenter;

use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Which segmentation model variant a worker loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSelection {
    /// Higher quality, any orientation.
    General,
    /// Faster landscape-tuned variant.
    Landscape,
}

impl ModelSelection {
    pub fn from_fast_flag(use_fast_model: bool) -> Self {
        if use_fast_model {
            Self::Landscape
        } else {
            Self::General
        }
    }
}

/// Trait for segmentation engines.
///
/// The pipeline depends only on this contract: given an RGB frame, return a
/// single-channel confidence mask with the same dimensions, 255 = fully
/// foreground. `Ok(None)` means the engine produced no mask for this frame;
/// the caller decides the fallback.
pub trait Segmenter: Send {
    fn segment(&mut self, frame: &RgbImage) -> Result<Option<GrayImage>>;
}

/// Build the default ONNX-backed segmenter.
///
/// Expensive: loads the model and constructs a session. Call once per worker
/// and keep the result for the worker's lifetime.
pub fn create_segmenter(selection: ModelSelection) -> Result<Box<dyn Segmenter>> {
    let model = SelfieSegmenter::new(selection)?;
    Ok(Box::new(model))
}

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use ndarray::{Array4, IxDyn};
use ort::{GraphOptimizationLevel, Session};

use super::{ModelSelection, Segmenter};

/// Directory holding the ONNX model files. Defaults to `models/` next to the
/// working directory.
const MODEL_DIR_ENV: &str = "SCENEMASK_MODEL_DIR";

/// Person segmentation backed by an ONNX selfie-segmentation model.
///
/// Stateless between frames: each frame is resized to the model's input
/// resolution, segmented, and the confidence map is resized back to the
/// frame's dimensions.
pub struct SelfieSegmenter {
    session: Session,
    width: u32,
    height: u32,
}

impl SelfieSegmenter {
    pub fn new(selection: ModelSelection) -> Result<Self> {
        // The landscape variant trades accuracy for speed and expects a wide
        // input; the general variant is square.
        let (file_name, width, height) = match selection {
            ModelSelection::General => ("selfie_general.onnx", 256, 256),
            ModelSelection::Landscape => ("selfie_landscape.onnx", 256, 144),
        };

        let model_dir =
            PathBuf::from(env::var(MODEL_DIR_ENV).unwrap_or_else(|_| "models".to_string()));
        let path = model_dir.join(file_name);

        tracing::info!("Loading segmentation model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Segmentation model loaded successfully");

        Ok(Self {
            session,
            width,
            height,
        })
    }

    /// Resize and normalize a frame into a [1, 3, H, W] tensor.
    fn preprocess(&self, frame: &RgbImage) -> Array4<f32> {
        let resized = if frame.dimensions() != (self.width, self.height) {
            imageops::resize(frame, self.width, self.height, FilterType::Lanczos3)
        } else {
            frame.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for y in 0..height {
            for x in 0..width {
                let pixel = resized.get_pixel(x, y);
                tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
                tensor[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
                tensor[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
            }
        }
        tensor
    }
}

impl Segmenter for SelfieSegmenter {
    fn segment(&mut self, frame: &RgbImage) -> Result<Option<GrayImage>> {
        let input = self.preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![input.view()]?)
            .context("Failed to run inference")?;

        if outputs.len() == 0 {
            return Ok(None);
        }

        // Confidence map has shape [1, 1, H, W].
        let confidence = outputs[0]
            .try_extract_tensor::<f32>()?
            .view()
            .to_owned()
            .into_dimensionality::<IxDyn>()?;

        let shape = confidence.shape();
        if shape.len() < 2 {
            return Ok(None);
        }
        let mask_height = shape[shape.len() - 2] as u32;
        let mask_width = shape[shape.len() - 1] as u32;

        let values: Vec<f32> = confidence.iter().copied().collect();
        let mask = GrayImage::from_fn(mask_width, mask_height, |x, y| {
            let idx = (y * mask_width + x) as usize;
            Luma([(values[idx] * 255.0).clamp(0.0, 255.0) as u8])
        });

        // Back to frame resolution.
        let (frame_width, frame_height) = frame.dimensions();
        let mask = if (mask_width, mask_height) != (frame_width, frame_height) {
            imageops::resize(&mask, frame_width, frame_height, FilterType::Lanczos3)
        } else {
            mask
        };

        Ok(Some(mask))
    }
}

mod pool;

pub use pool::{run_pool, PoolReport};

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};

use crate::segmentation::Segmenter;

/// Everything needed to process one frame. Stateless and independently
/// executable; a worker owns nothing beyond its segmentation session.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub frame_path: PathBuf,
    pub mask_path: PathBuf,
    pub composite_path: PathBuf,
    pub background_path: PathBuf,
    pub blur_radius: i32,
}

/// Segment and composite one frame, writing mask and composite to the item's
/// output paths.
///
/// Failures are soft: any error is converted into a message naming the frame
/// file so the pool can keep going with the remaining items.
pub fn process_item(segmenter: &mut dyn Segmenter, item: &WorkItem) -> Result<(), String> {
    run_item(segmenter, item).map_err(|e| {
        let name = item
            .frame_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.frame_path.display().to_string());
        format!("error processing {name}: {e:#}")
    })
}

fn run_item(segmenter: &mut dyn Segmenter, item: &WorkItem) -> Result<()> {
    // image::open decodes straight into the RGB order the engine expects.
    let frame = image::open(&item.frame_path)
        .context("cannot read frame")?
        .to_rgb8();
    let background = image::open(&item.background_path)
        .context("cannot read background")?
        .to_rgb8();

    let mask = match segmenter.segment(&frame).context("segmentation failed")? {
        Some(mask) => mask,
        // No mask from the engine: treat everything as foreground instead of
        // erasing the subject.
        None => GrayImage::from_pixel(frame.width(), frame.height(), Luma([255])),
    };

    let mask = blur_mask(mask, item.blur_radius);
    let composite = composite(&frame, &background, &mask)?;

    mask.save(&item.mask_path)
        .with_context(|| format!("cannot write mask {}", item.mask_path.display()))?;
    composite
        .save(&item.composite_path)
        .with_context(|| format!("cannot write composite {}", item.composite_path.display()))?;

    Ok(())
}

/// Odd kernel size >= 1 derived from the configured blur radius.
pub fn kernel_size(radius: i32) -> u32 {
    ((radius / 2) * 2 + 1).max(1) as u32
}

/// Smooth mask edges with a gaussian blur.
///
/// A non-positive radius leaves the mask untouched, as does a radius mapping
/// to a 1-pixel kernel.
pub fn blur_mask(mask: GrayImage, radius: i32) -> GrayImage {
    if radius <= 0 {
        return mask;
    }
    let kernel = kernel_size(radius);
    if kernel <= 1 {
        return mask;
    }
    // OpenCV's kernel-to-sigma mapping, so the configured kernel size keeps
    // its usual meaning.
    let sigma = 0.3 * ((kernel - 1) as f32 * 0.5 - 1.0) + 0.8;
    imageops::blur(&mask, sigma)
}

/// Per-pixel linear blend of frame and background weighted by the mask:
/// `frame * alpha + background * (1 - alpha)`, `alpha = mask / 255`.
pub fn composite(
    frame: &RgbImage,
    background: &RgbImage,
    mask: &GrayImage,
) -> Result<RgbImage> {
    let (width, height) = frame.dimensions();
    if background.dimensions() != (width, height) || mask.dimensions() != (width, height) {
        bail!(
            "dimension mismatch: frame {:?}, background {:?}, mask {:?}",
            frame.dimensions(),
            background.dimensions(),
            mask.dimensions()
        );
    }

    let mut out = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let alpha = mask.get_pixel(x, y)[0] as f32 / 255.0;
            let fg = frame.get_pixel(x, y);
            let bg = background.get_pixel(x, y);
            let mut blended = [0u8; 3];
            for c in 0..3 {
                blended[c] = (fg[c] as f32 * alpha + bg[c] as f32 * (1.0 - alpha)) as u8;
            }
            out.put_pixel(x, y, Rgb(blended));
        }
    }
    Ok(out)
}

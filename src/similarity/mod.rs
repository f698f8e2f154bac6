mod ssim;

pub use ssim::frame_difference;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::GrayImage;

/// Comparison resolution. Downsampling before SSIM cuts cost and absorbs
/// compression noise.
const SAMPLE_WIDTH: u32 = 320;
const SAMPLE_HEIGHT: u32 = 180;

/// Partition of the frame sequence into frames that need full segmentation
/// and frames that reuse an earlier result.
#[derive(Debug, Default)]
pub struct SamplePlan {
    /// Indices requiring full processing, in ascending order. Never empty
    /// for a non-empty sequence: index 0 is always processed.
    pub process: Vec<usize>,
    /// Skipped index -> processed index to copy results from.
    pub reuse: BTreeMap<usize, usize>,
}

impl SamplePlan {
    fn process_all(total: usize) -> Self {
        Self {
            process: (0..total).collect(),
            reuse: BTreeMap::new(),
        }
    }
}

/// Walk the frame sequence and decide which frames need segmentation.
///
/// Frame 0 always becomes the initial reference. Each later frame is compared
/// to the last *accepted* frame; a difference below `threshold` maps it to
/// that reference instead of processing it. An unreadable frame is mapped to
/// the reference without advancing it.
pub fn sample(frames: &[PathBuf], threshold: f64, disable_skip: bool) -> SamplePlan {
    if disable_skip || frames.len() <= 1 {
        return SamplePlan::process_all(frames.len());
    }

    let Some(mut reference) = load_sample(&frames[0]) else {
        // Without a readable reference there is nothing to compare against.
        tracing::warn!("first frame unreadable, similarity skip disabled");
        return SamplePlan::process_all(frames.len());
    };

    let mut plan = SamplePlan {
        process: vec![0],
        reuse: BTreeMap::new(),
    };
    let mut reference_idx = 0;

    for (i, path) in frames.iter().enumerate().skip(1) {
        let Some(current) = load_sample(path) else {
            plan.reuse.insert(i, reference_idx);
            continue;
        };

        let diff = frame_difference(&reference, &current);
        if diff >= threshold {
            plan.process.push(i);
            reference = current;
            reference_idx = i;
        } else {
            plan.reuse.insert(i, reference_idx);
        }
    }

    plan
}

/// Decode a frame and reduce it to the grayscale comparison size.
fn load_sample(path: &Path) -> Option<GrayImage> {
    let img = image::open(path).ok()?;
    Some(imageops::resize(
        &img.to_luma8(),
        SAMPLE_WIDTH,
        SAMPLE_HEIGHT,
        FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_frame(dir: &Path, index: usize, color: [u8; 3]) -> PathBuf {
        let path = dir.join(format!("frame_{:04}.jpg", index + 1));
        RgbImage::from_pixel(64, 64, Rgb(color)).save(&path).unwrap();
        path
    }

    #[test]
    fn single_frame_is_always_processed() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![write_frame(dir.path(), 0, [10, 10, 10])];

        let plan = sample(&frames, 0.9, false);
        assert_eq!(plan.process, vec![0]);
        assert!(plan.reuse.is_empty());
    }

    #[test]
    fn identical_frames_collapse_onto_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<_> = (0..4)
            .map(|i| write_frame(dir.path(), i, [100, 100, 100]))
            .collect();

        let plan = sample(&frames, 0.12, false);
        assert_eq!(plan.process, vec![0]);
        assert_eq!(
            plan.reuse,
            BTreeMap::from([(1, 0), (2, 0), (3, 0)])
        );
    }

    #[test]
    fn distinct_frames_are_all_processed() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            write_frame(dir.path(), 0, [0, 0, 0]),
            write_frame(dir.path(), 1, [255, 255, 255]),
            write_frame(dir.path(), 2, [0, 0, 0]),
        ];

        let plan = sample(&frames, 0.5, false);
        assert_eq!(plan.process, vec![0, 1, 2]);
        assert!(plan.reuse.is_empty());
    }

    #[test]
    fn unreadable_frame_maps_to_reference_without_advancing() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            write_frame(dir.path(), 0, [0, 0, 0]),
            dir.path().join("frame_0002.jpg"), // never written
            write_frame(dir.path(), 2, [0, 0, 0]),
        ];

        let plan = sample(&frames, 0.12, false);
        assert_eq!(plan.process, vec![0]);
        assert_eq!(plan.reuse, BTreeMap::from([(1, 0), (2, 0)]));
    }

    #[test]
    fn disable_skip_processes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<_> = (0..3)
            .map(|i| write_frame(dir.path(), i, [50, 50, 50]))
            .collect();

        let plan = sample(&frames, 0.12, true);
        assert_eq!(plan.process, vec![0, 1, 2]);
        assert!(plan.reuse.is_empty());
    }
}

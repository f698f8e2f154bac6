use std::fs;

use crate::config::JobSpec;
use crate::error::PipelineError;
use crate::layout::SceneLayout;
use crate::segmentation::{self, ModelSelection, Segmenter};
use crate::worker::{PoolReport, WorkItem};
use crate::{background, media, reconcile, similarity, worker};

/// Process one scene end to end with the default ONNX segmenter.
pub fn process_scene(spec: &JobSpec) -> Result<u64, PipelineError> {
    let selection = ModelSelection::from_fast_flag(spec.use_fast_model);
    run_scene(spec, move || segmentation::create_segmenter(selection))
}

/// Process one scene end to end: extract, segment/composite, reconcile,
/// remux. Generic over the segmenter factory so the core can run without an
/// inference runtime.
pub fn run_scene<F>(spec: &JobSpec, factory: F) -> Result<u64, PipelineError>
where
    F: Fn() -> anyhow::Result<Box<dyn Segmenter>> + Send + Sync,
{
    tracing::info!(
        "Processing scene {}s - {}s of {}",
        spec.scene_start,
        spec.scene_end,
        spec.input_video.display()
    );

    let duration = spec.scene_duration();
    if duration <= 0.0 {
        return Err(PipelineError::InvalidConfig(format!(
            "scene_end ({}) must be greater than scene_start ({})",
            spec.scene_end, spec.scene_start
        )));
    }

    let layout = SceneLayout::new(&spec.frames_dir);
    layout
        .prepare()
        .map_err(|e| PipelineError::ExtractionFailed(format!("{e:#}")))?;

    let fps = media::effective_fps(spec.processing_fps, duration);
    let total_frames =
        media::extract_frames(&spec.input_video, spec.scene_start, duration, fps, &layout)?;
    tracing::info!("Extracted {total_frames} frames at {fps} fps");

    let report = run_core(spec, &layout, total_frames, factory)?;

    let has_audio = media::extract_audio(&spec.input_video, spec.scene_start, duration, &layout);
    media::remux(&layout, fps, has_audio, &spec.output_video)?;

    if let Ok(meta) = fs::metadata(&spec.output_video) {
        tracing::info!(
            "Video created: {} ({:.2} MB)",
            spec.output_video.display(),
            meta.len() as f64 / 1024.0 / 1024.0
        );
    }

    Ok(report.successful)
}

/// The disk-backed core: background, similarity partition, worker pool,
/// reconciliation. Operates on frames already extracted under `layout`.
fn run_core<F>(
    spec: &JobSpec,
    layout: &SceneLayout,
    total_frames: usize,
    factory: F,
) -> Result<PoolReport, PipelineError>
where
    F: Fn() -> anyhow::Result<Box<dyn Segmenter>> + Send + Sync,
{
    // All frames share the first frame's dimensions.
    let first = image::open(layout.frame_path(0))
        .map_err(|e| PipelineError::ExtractionFailed(format!("cannot read first frame: {e}")))?
        .to_rgb8();
    let (width, height) = first.dimensions();
    tracing::info!("Frame dimensions: {width}x{height}");

    let bg = background::resolve(&spec.background_type, &spec.background_value, width, height)?;
    bg.save(layout.background_path()).map_err(|e| {
        PipelineError::ResourceUnavailable(format!("cannot cache background: {e}"))
    })?;
    tracing::info!("Background cached at {}", layout.background_path().display());

    let frame_paths: Vec<_> = (0..total_frames).map(|i| layout.frame_path(i)).collect();
    let plan = similarity::sample(&frame_paths, spec.similarity_threshold, spec.disable_skip);
    tracing::info!(
        "Will process {} unique frames (skip {} similar)",
        plan.process.len(),
        plan.reuse.len()
    );

    let items: Vec<WorkItem> = plan
        .process
        .iter()
        .map(|&i| WorkItem {
            frame_path: layout.frame_path(i),
            mask_path: layout.mask_path(i),
            composite_path: layout.composite_path(i),
            background_path: layout.background_path(),
            blur_radius: spec.blur_mask_radius,
        })
        .collect();

    let report = worker::run_pool(items, spec.max_workers, factory)?;
    tracing::info!(
        "Processed {}/{} unique frames",
        report.successful,
        plan.process.len()
    );
    if !report.errors.is_empty() {
        tracing::warn!("Encountered {} errors:", report.errors.len());
        for error in report.errors.iter().take(5) {
            tracing::warn!("  - {error}");
        }
    }

    reconcile::reconcile(layout, &plan, total_frames)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::path::Path;

    /// Full-foreground masks, but refuses bright frames.
    struct BrightnessFussySegmenter;

    impl Segmenter for BrightnessFussySegmenter {
        fn segment(&mut self, frame: &RgbImage) -> anyhow::Result<Option<GrayImage>> {
            if frame.get_pixel(0, 0)[0] > 200 {
                bail!("simulated decode error");
            }
            Ok(Some(GrayImage::from_pixel(
                frame.width(),
                frame.height(),
                Luma([255]),
            )))
        }
    }

    struct AlwaysForeground;

    impl Segmenter for AlwaysForeground {
        fn segment(&mut self, frame: &RgbImage) -> anyhow::Result<Option<GrayImage>> {
            Ok(Some(GrayImage::from_pixel(
                frame.width(),
                frame.height(),
                Luma([255]),
            )))
        }
    }

    fn spec_for(dir: &Path) -> JobSpec {
        JobSpec {
            input_video: dir.join("in.mp4"),
            scene_start: 0.0,
            scene_end: 1.0,
            output_video: dir.join("out.mp4"),
            background_type: "color".to_string(),
            background_value: "0000ff".to_string(),
            frames_dir: dir.join("frames"),
            similarity_threshold: 0.12,
            processing_fps: 15,
            use_fast_model: false,
            disable_skip: false,
            blur_mask_radius: 0,
            max_workers: 2,
        }
    }

    /// Frames 0/1 identical, 2/3 identical, 4 distinct: process {0, 2, 4},
    /// reuse {1 -> 0, 3 -> 2}.
    fn seed_frames(layout: &SceneLayout) {
        let colors = [
            [0u8, 0, 0],
            [0, 0, 0],
            [255, 255, 255],
            [255, 255, 255],
            [128, 128, 128],
        ];
        for (i, color) in colors.iter().enumerate() {
            RgbImage::from_pixel(64, 64, Rgb(*color))
                .save(layout.frame_path(i))
                .unwrap();
        }
    }

    #[test]
    fn similar_frames_reuse_processed_results() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_for(dir.path());
        let layout = SceneLayout::new(&spec.frames_dir);
        layout.prepare().unwrap();
        seed_frames(&layout);

        let report = run_core(&spec, &layout, 5, || {
            Ok(Box::new(AlwaysForeground) as Box<dyn Segmenter>)
        })
        .unwrap();

        assert_eq!(report.successful, 3);
        assert!(report.errors.is_empty());
        for i in 0..5 {
            assert!(layout.composite_path(i).exists(), "composite {i} missing");
            assert!(layout.mask_path(i).exists(), "mask {i} missing");
        }
    }

    #[test]
    fn failed_frame_is_gap_filled_and_excluded_from_the_tally() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_for(dir.path());
        let layout = SceneLayout::new(&spec.frames_dir);
        layout.prepare().unwrap();
        seed_frames(&layout);

        // The white frame (index 2) is in the process set and fails.
        let report = run_core(&spec, &layout, 5, || {
            Ok(Box::new(BrightnessFussySegmenter) as Box<dyn Segmenter>)
        })
        .unwrap();

        assert_eq!(report.successful, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("frame_0003.jpg"));
        for i in 0..5 {
            assert!(layout.composite_path(i).exists(), "composite {i} missing");
        }
    }

    #[test]
    fn non_positive_duration_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = spec_for(dir.path());
        spec.scene_end = spec.scene_start;

        let err = run_scene(&spec, || {
            Ok(Box::new(AlwaysForeground) as Box<dyn Segmenter>)
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}

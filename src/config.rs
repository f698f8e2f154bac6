use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One scene processing job, read in full before any work starts.
///
/// Optional fields carry the documented defaults so a minimal job document
/// only needs the video, the scene range, the background spec, and the
/// working directory.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub input_video: PathBuf,
    pub scene_start: f64,
    pub scene_end: f64,
    pub output_video: PathBuf,

    /// `color` or `image`; anything else is rejected by the resolver.
    pub background_type: String,
    pub background_value: String,

    /// Ephemeral working directory for frames and derived artifacts.
    pub frames_dir: PathBuf,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_processing_fps")]
    pub processing_fps: u32,
    #[serde(default)]
    pub use_fast_model: bool,
    #[serde(default)]
    pub disable_skip: bool,
    #[serde(default = "default_blur_mask_radius")]
    pub blur_mask_radius: i32,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl JobSpec {
    pub fn scene_duration(&self) -> f64 {
        self.scene_end - self.scene_start
    }
}

fn default_similarity_threshold() -> f64 {
    0.12
}

fn default_processing_fps() -> u32 {
    15
}

fn default_blur_mask_radius() -> i32 {
    7
}

fn default_max_workers() -> usize {
    4
}

/// The structured result written to stdout.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JobResult {
    Success {
        success: bool,
        processed_frames: u64,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl JobResult {
    pub fn success(processed_frames: u64) -> Self {
        Self::Success {
            success: true,
            processed_frames,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            success: false,
            error: error.into(),
        }
    }
}

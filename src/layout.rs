use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Path schema for a scene's working directory.
///
/// Internal frame indices are 0-based everywhere; every filename uses
/// `index + 1` zero-padded to 4 digits, matching ffmpeg's `%04d` sequence
/// numbering. All stages name files through this type so the conventions
/// live in one place.
#[derive(Debug, Clone)]
pub struct SceneLayout {
    root: PathBuf,
}

impl SceneLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory tree (root, masks/, composites/).
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        fs::create_dir_all(self.masks_dir())?;
        fs::create_dir_all(self.composites_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn masks_dir(&self) -> PathBuf {
        self.root.join("masks")
    }

    pub fn composites_dir(&self) -> PathBuf {
        self.root.join("composites")
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("frame_{:04}.jpg", index + 1))
    }

    pub fn mask_path(&self, index: usize) -> PathBuf {
        self.masks_dir().join(format!("mask_{:04}.png", index + 1))
    }

    pub fn composite_path(&self, index: usize) -> PathBuf {
        self.composites_dir()
            .join(format!("composite_{:04}.jpg", index + 1))
    }

    pub fn background_path(&self) -> PathBuf {
        self.root.join("bg_cache.jpg")
    }

    pub fn audio_path(&self) -> PathBuf {
        self.root.join("scene_audio.wav")
    }

    /// ffmpeg output pattern for frame extraction.
    pub fn frame_pattern(&self) -> PathBuf {
        self.root.join("frame_%04d.jpg")
    }

    /// ffmpeg input pattern for the final remux.
    pub fn composite_pattern(&self) -> PathBuf {
        self.composites_dir().join("composite_%04d.jpg")
    }

    /// Count the extracted `frame_*.jpg` files currently on disk.
    pub fn count_frames(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to read {}", self.root.display()))?
        {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("frame_") && name.ends_with(".jpg") {
                count += 1;
            }
        }
        Ok(count)
    }
}

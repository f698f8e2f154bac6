//! ffmpeg collaborator: frame extraction, audio extraction, final remux.
//!
//! Every invocation is bounded by a wall-clock timeout; a child that
//! overruns is killed and the stage fails.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::error::PipelineError;
use crate::layout::SceneLayout;

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);
const AUDIO_TIMEOUT: Duration = Duration::from_secs(30);
const MUX_TIMEOUT: Duration = Duration::from_secs(120);

/// Frame rate actually used for extraction.
///
/// Very short scenes are boosted so they still yield at least one frame.
pub fn effective_fps(requested: u32, scene_duration: f64) -> u32 {
    if scene_duration >= 1.0 {
        requested
    } else {
        ((1.0 / scene_duration) as u32).max(10)
    }
}

/// Extract the scene's frames into the layout's root directory.
///
/// Returns the number of frames on disk afterwards; zero frames is a fatal
/// extraction failure.
pub fn extract_frames(
    input: &Path,
    scene_start: f64,
    scene_duration: f64,
    fps: u32,
    layout: &SceneLayout,
) -> Result<usize, PipelineError> {
    let mut cmd = base_command();
    cmd.args(["-y", "-i"])
        .arg(input)
        .args(["-ss", &scene_start.to_string()])
        .args(["-t", &scene_duration.to_string()])
        .args(["-vf", &format!("fps={fps}")])
        .arg(layout.frame_pattern());

    run(cmd, EXTRACT_TIMEOUT).map_err(|e| PipelineError::ExtractionFailed(format!("{e:#}")))?;

    let count = layout
        .count_frames()
        .map_err(|e| PipelineError::ExtractionFailed(format!("{e:#}")))?;
    if count == 0 {
        return Err(PipelineError::ExtractionFailed(
            "no frames extracted from video".to_string(),
        ));
    }
    Ok(count)
}

/// Extract the scene's audio track to 16-bit PCM WAV.
///
/// Non-fatal: on any failure (including zero-byte output) the partial file
/// is deleted and the job continues without audio. Returns whether a usable
/// track exists.
pub fn extract_audio(
    input: &Path,
    scene_start: f64,
    scene_duration: f64,
    layout: &SceneLayout,
) -> bool {
    let audio_path = layout.audio_path();

    let mut cmd = base_command();
    cmd.args(["-y", "-i"])
        .arg(input)
        .args(["-ss", &scene_start.to_string()])
        .args(["-t", &scene_duration.to_string()])
        .args(["-vn", "-acodec", "pcm_s16le"])
        .arg(&audio_path);

    let usable = run(cmd, AUDIO_TIMEOUT).is_ok()
        && audio_path.metadata().map(|m| m.len() > 0).unwrap_or(false);

    if usable {
        tracing::info!("Audio extracted");
    } else {
        tracing::warn!("No audio track or extraction failed, continuing without audio");
        let _ = fs::remove_file(&audio_path);
    }
    usable
}

/// Remux the composite sequence (plus audio when present) into the output
/// container.
pub fn remux(
    layout: &SceneLayout,
    fps: u32,
    has_audio: bool,
    output: &Path,
) -> Result<(), PipelineError> {
    let mut cmd = base_command();
    cmd.args(remux_args(layout, fps, has_audio, output));

    run(cmd, MUX_TIMEOUT).map_err(|e| PipelineError::MuxFailed(format!("{e:#}")))?;

    if !output.exists() {
        return Err(PipelineError::MuxFailed(
            "output video was not created".to_string(),
        ));
    }
    Ok(())
}

/// H.264 / yuv420p / CRF 23, AAC audio and `-shortest` only when a track
/// exists.
fn remux_args(layout: &SceneLayout, fps: u32, has_audio: bool, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-framerate".into(),
        fps.to_string().into(),
        "-i".into(),
        layout.composite_pattern().into(),
    ];
    if has_audio {
        args.push("-i".into());
        args.push(layout.audio_path().into());
    }
    args.extend(["-c:v".into(), "libx264".into()]);
    if has_audio {
        args.extend(["-c:a".into(), "aac".into()]);
    }
    args.extend(["-pix_fmt".into(), "yuv420p".into(), "-crf".into(), "23".into()]);
    if has_audio {
        args.push("-shortest".into());
    }
    args.push(output.into());
    args
}

/// Base `ffmpeg` command with flags keeping it quiet apart from errors.
fn base_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-nostats", "-nostdin", "-v", "error"]);
    cmd
}

/// Run a command to completion within `timeout`.
///
/// stderr is drained on a separate thread so a chatty child cannot block on
/// a full pipe; the child is killed once the deadline passes.
fn run(mut cmd: Command, timeout: Duration) -> Result<()> {
    tracing::debug!("running {:?}", cmd);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn ffmpeg")?;

    let mut stderr = child
        .stderr
        .take()
        .context("failed to capture ffmpeg stderr")?;
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait().context("failed to poll ffmpeg")? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("ffmpeg timed out after {}s", timeout.as_secs()));
        }
        thread::sleep(Duration::from_millis(50));
    };

    let captured = reader.join().unwrap_or_default();
    if status.success() {
        return Ok(());
    }

    let mut detail = captured.trim().to_string();
    if detail.len() > 500 {
        let mut cut = detail.len() - 500;
        while !detail.is_char_boundary(cut) {
            cut += 1;
        }
        detail = detail.split_off(cut);
    }
    Err(anyhow!(
        "ffmpeg exited with status {}: {detail}",
        status.code().unwrap_or(-1)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_rate_is_kept_for_normal_scenes() {
        assert_eq!(effective_fps(15, 2.0), 15);
        assert_eq!(effective_fps(24, 1.0), 24);
    }

    #[test]
    fn short_scenes_get_a_floored_boost() {
        // 1/0.5 = 2, floored below the minimum of 10.
        assert_eq!(effective_fps(15, 0.5), 10);
        // 1/0.05 = 20, above the minimum.
        assert_eq!(effective_fps(15, 0.05), 20);
        // Truncation, not rounding.
        assert_eq!(effective_fps(15, 0.03), 33);
    }

    fn args_as_strings(layout: &SceneLayout, fps: u32, has_audio: bool) -> Vec<String> {
        remux_args(layout, fps, has_audio, Path::new("/out/video.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn remux_with_audio_includes_track_and_shortest() {
        let layout = SceneLayout::new("/scene");
        let args = args_as_strings(&layout, 15, true);

        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"/scene/scene_audio.wav".to_string()));
        assert_eq!(args.last().unwrap(), "/out/video.mp4");
    }

    #[test]
    fn remux_without_audio_is_video_only() {
        let layout = SceneLayout::new("/scene");
        let args = args_as_strings(&layout, 15, false);

        assert!(!args.contains(&"-shortest".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(!args.iter().any(|a| a.contains("scene_audio")));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
    }
}

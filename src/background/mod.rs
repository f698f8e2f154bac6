use std::io::Write;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::PipelineError;

/// Produce the background raster for a scene.
///
/// `kind` is either `color` (6-hex-digit RGB value, leading `#` optional) or
/// `image` (local path or http(s) URL). The result always has exactly the
/// requested dimensions; images are stretched without preserving aspect
/// ratio. The caller persists the raster once so workers can share it.
pub fn resolve(
    kind: &str,
    value: &str,
    width: u32,
    height: u32,
) -> Result<RgbImage, PipelineError> {
    match kind {
        "color" => {
            let rgb = parse_hex_color(value)?;
            Ok(RgbImage::from_pixel(width, height, Rgb(rgb)))
        }
        "image" => {
            let decoded = if value.starts_with("http://") || value.starts_with("https://") {
                fetch_image(value)?
            } else {
                load_image(Path::new(value))?
            };
            Ok(imageops::resize(&decoded, width, height, FilterType::Triangle))
        }
        other => Err(PipelineError::InvalidConfig(format!(
            "unknown background_type: {other}"
        ))),
    }
}

/// Parse a `RRGGBB` string, with or without a leading `#`.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3], PipelineError> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PipelineError::InvalidConfig(format!(
            "invalid hex color: {value}"
        )));
    }

    let channel = |range| u8::from_str_radix(&hex[range], 16).unwrap();
    Ok([channel(0..2), channel(2..4), channel(4..6)])
}

fn load_image(path: &Path) -> Result<RgbImage, PipelineError> {
    let img = image::open(path).map_err(|e| {
        PipelineError::ResourceUnavailable(format!(
            "failed to load background image {}: {e}",
            path.display()
        ))
    })?;
    Ok(img.to_rgb8())
}

/// Download a URL into a scoped temp file and decode it.
///
/// The temp file is removed when it drops, whether decoding succeeds or not.
fn fetch_image(url: &str) -> Result<RgbImage, PipelineError> {
    let unavailable =
        |e: String| PipelineError::ResourceUnavailable(format!("failed to fetch {url}: {e}"));

    let response = reqwest::blocking::get(url).map_err(|e| unavailable(e.to_string()))?;
    if !response.status().is_success() {
        return Err(unavailable(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().map_err(|e| unavailable(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new().map_err(|e| unavailable(e.to_string()))?;
    tmp.write_all(&bytes).map_err(|e| unavailable(e.to_string()))?;

    load_image(tmp.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_fill_is_uniform() {
        let bg = resolve("color", "#ff8000", 64, 32).unwrap();
        assert_eq!(bg.dimensions(), (64, 32));
        assert_eq!(bg.get_pixel(0, 0), &Rgb([255, 128, 0]));
        assert_eq!(bg.get_pixel(63, 31), &Rgb([255, 128, 0]));
    }

    #[test]
    fn hex_prefix_is_optional() {
        assert_eq!(parse_hex_color("00ff00").unwrap(), [0, 255, 0]);
        assert_eq!(parse_hex_color("#00ff00").unwrap(), [0, 255, 0]);
    }

    #[test]
    fn bad_hex_is_invalid_config() {
        for bad in ["zz0000", "fff", "ff00ff00", ""] {
            let err = resolve("color", bad, 8, 8).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidConfig(_)), "{bad}");
        }
    }

    #[test]
    fn unknown_kind_is_invalid_config() {
        let err = resolve("gradient", "whatever", 8, 8).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn local_image_is_stretched_to_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let bg = resolve("image", path.to_str().unwrap(), 20, 40).unwrap();
        assert_eq!(bg.dimensions(), (20, 40));
        assert_eq!(bg.get_pixel(10, 20), &Rgb([1, 2, 3]));
    }

    #[test]
    fn missing_image_is_resource_unavailable() {
        let err = resolve("image", "/nonexistent/bg.png", 8, 8).unwrap_err();
        assert!(matches!(err, PipelineError::ResourceUnavailable(_)));
    }
}

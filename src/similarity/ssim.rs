use image::GrayImage;

// Standard SSIM stabilisation constants for 8-bit dynamic range.
const C1: f64 = 6.5025; // (0.01 * 255)^2
const C2: f64 = 58.5225; // (0.03 * 255)^2

const WINDOW: u32 = 8;

/// Perceptual difference between two grayscale images.
///
/// Returns `1 - SSIM`, so 0 means identical and larger means more different.
/// The SSIM score is clamped to [-1, 1] before inversion.
pub fn frame_difference(a: &GrayImage, b: &GrayImage) -> f64 {
    1.0 - ssim(a, b).clamp(-1.0, 1.0)
}

/// Mean structural similarity over non-overlapping 8x8 windows.
///
/// Images smaller than one window are scored as a single window covering
/// everything. Comparison is restricted to the overlapping region when the
/// dimensions disagree.
fn ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    let width = a.width().min(b.width());
    let height = a.height().min(b.height());
    if width == 0 || height == 0 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut windows = 0u32;

    let mut y = 0;
    while y + WINDOW <= height {
        let mut x = 0;
        while x + WINDOW <= width {
            total += window_ssim(a, b, x, y, WINDOW, WINDOW);
            windows += 1;
            x += WINDOW;
        }
        y += WINDOW;
    }

    if windows == 0 {
        return window_ssim(a, b, 0, 0, width, height);
    }
    total / f64::from(windows)
}

fn window_ssim(a: &GrayImage, b: &GrayImage, x0: u32, y0: u32, w: u32, h: u32) -> f64 {
    let n = f64::from(w * h);

    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    let mut sum_aa = 0.0;
    let mut sum_bb = 0.0;
    let mut sum_ab = 0.0;

    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let pa = f64::from(a.get_pixel(x, y)[0]);
            let pb = f64::from(b.get_pixel(x, y)[0]);
            sum_a += pa;
            sum_b += pb;
            sum_aa += pa * pa;
            sum_bb += pb * pb;
            sum_ab += pa * pb;
        }
    }

    let mean_a = sum_a / n;
    let mean_b = sum_b / n;
    let var_a = sum_aa / n - mean_a * mean_a;
    let var_b = sum_bb / n - mean_b * mean_b;
    let cov = sum_ab / n - mean_a * mean_b;

    ((2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2))
        / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn flat(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    #[test]
    fn identical_images_have_zero_difference() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        assert_eq!(frame_difference(&img, &img), 0.0);
    }

    #[test]
    fn opposite_images_are_nearly_fully_different() {
        let diff = frame_difference(&flat(64, 64, 0), &flat(64, 64, 255));
        assert!(diff > 0.9, "diff = {diff}");
    }

    #[test]
    fn difference_is_symmetric() {
        let a = GrayImage::from_fn(32, 32, |x, _| Luma([(x * 8) as u8]));
        let b = flat(32, 32, 128);
        assert_eq!(frame_difference(&a, &b), frame_difference(&b, &a));
    }

    #[test]
    fn sub_window_images_still_score() {
        let diff = frame_difference(&flat(4, 4, 10), &flat(4, 4, 10));
        assert_eq!(diff, 0.0);
    }
}

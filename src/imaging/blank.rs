use image::RgbaImage;

/// Detects results with no usable content: fully transparent, or a single
/// flat color (luminance standard deviation below `threshold`).
pub fn is_blank(image: &RgbaImage, threshold: f64) -> bool {
    let mut count = 0u64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for pixel in image.pixels().filter(|p| p[3] > 0) {
        let luma = 0.299 * f64::from(pixel[0])
            + 0.587 * f64::from(pixel[1])
            + 0.114 * f64::from(pixel[2]);
        count += 1;
        sum += luma;
        sum_sq += luma * luma;
    }

    if count == 0 {
        return true;
    }

    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    variance.sqrt() < threshold
}

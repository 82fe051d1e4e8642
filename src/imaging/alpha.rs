//! Transparency handling.
//!
//! Image models answer with opaque rasters, usually at a different size than
//! the input. When the upload was transparent its alpha channel is kept as a
//! mask and stamped back onto whatever the model returns.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};

/// True when at least one pixel is not fully opaque.
pub fn has_transparency(rgba: &RgbaImage) -> bool {
    rgba.pixels().any(|p| p[3] < u8::MAX)
}

pub fn extract_alpha(rgba: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y)[3]])
    })
}

/// Composites `mask` onto `result`, keeping the lower of the two alpha values.
pub fn reapply_alpha(result: &DynamicImage, mask: &GrayImage) -> RgbaImage {
    let mut out = result.to_rgba8();
    let (width, height) = out.dimensions();

    let resized;
    let mask = if mask.dimensions() == (width, height) {
        mask
    } else {
        tracing::debug!(
            "Resizing alpha mask from {:?} to {}x{}",
            mask.dimensions(),
            width,
            height
        );
        resized = imageops::resize(mask, width, height, FilterType::Triangle);
        &resized
    };

    for (pixel, alpha) in out.pixels_mut().zip(mask.pixels()) {
        pixel[3] = pixel[3].min(alpha[0]);
    }

    out
}

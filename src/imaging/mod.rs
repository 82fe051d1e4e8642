//! Raster pre- and post-processing around the model call.
//!
//! Uploads are decoded, bounded in size and re-encoded to a format the model
//! accepts. Results are decoded, given back the upload's transparency, checked
//! for blank output and written out as PNG.

pub mod alpha;
pub mod blank;
pub mod mime;

pub use alpha::{extract_alpha, has_transparency, reapply_alpha};
pub use blank::is_blank;
pub use mime::{detect_mime, extension_for};

use crate::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat};
use std::io::Cursor;

const JPEG_QUALITY: u8 = 90;

/// Encoded image bytes together with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub encoded: EncodedImage,
    pub width: u32,
    pub height: u32,
    /// Present only when the upload had transparent pixels.
    pub alpha_mask: Option<GrayImage>,
}

#[derive(Debug, Clone)]
pub struct FinalImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decodes an upload, bounds its longest side to `max_dimension` and
/// re-encodes it: PNG when transparent, JPEG otherwise.
pub fn normalize_input(bytes: &[u8], max_dimension: u32) -> Result<NormalizedImage> {
    if let Some(mime) = detect_mime(bytes) {
        tracing::debug!("Upload sniffed as {}", mime);
    }

    let mut img = image::load_from_memory(bytes)?;

    if img.width().max(img.height()) > max_dimension {
        tracing::info!(
            "Downscaling upload from {}x{} to fit {}px",
            img.width(),
            img.height(),
            max_dimension
        );
        img = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    }

    let (width, height) = (img.width(), img.height());
    let alpha_mask = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        has_transparency(&rgba).then(|| extract_alpha(&rgba))
    } else {
        None
    };

    let encoded = if alpha_mask.is_some() {
        EncodedImage {
            bytes: encode(&DynamicImage::ImageRgba8(img.to_rgba8()), ImageOutputFormat::Png)?,
            mime_type: "image/png".to_string(),
        }
    } else {
        EncodedImage {
            bytes: encode(
                &DynamicImage::ImageRgb8(img.to_rgb8()),
                ImageOutputFormat::Jpeg(JPEG_QUALITY),
            )?,
            mime_type: "image/jpeg".to_string(),
        }
    };

    Ok(NormalizedImage {
        encoded,
        width,
        height,
        alpha_mask,
    })
}

/// Decodes a model result, restores transparency from `mask` and rejects
/// blank output. The result is always PNG.
pub fn finalize_output(
    bytes: &[u8],
    mask: Option<&GrayImage>,
    blank_threshold: f64,
) -> Result<FinalImage> {
    let img = image::load_from_memory(bytes)?;

    let rgba = match mask {
        Some(mask) => reapply_alpha(&img, mask),
        None => img.to_rgba8(),
    };

    if is_blank(&rgba, blank_threshold) {
        return Err(Error::BlankResult { text: None });
    }

    let (width, height) = rgba.dimensions();
    let png = encode(&DynamicImage::ImageRgba8(rgba), ImageOutputFormat::Png)?;

    Ok(FinalImage { png, width, height })
}

/// Runs CPU-bound image work off the async executor.
pub async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Task(format!("Image processing task join error: {}", e)))?
}

fn encode(img: &DynamicImage, format: ImageOutputFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(bytes)
}

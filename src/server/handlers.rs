use super::AppState;
use crate::imaging::{self, extension_for, EncodedImage, NormalizedImage};
use crate::model::{ModelInput, ModelOutput};
use crate::storage::StoredFile;
use crate::{Error, Result};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub images: Vec<String>,
    pub text: Option<String>,
    pub input: String,
    pub transparent: bool,
    pub blank_images_dropped: usize,
    pub model: String,
    pub processing_time_ms: u128,
}

struct UploadForm {
    image: Vec<u8>,
    prompt: Option<String>,
}

pub async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "model": state.model.name(),
    }))
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<GenerateResponse>> {
    let start = Instant::now();
    let form = read_form(multipart, state.config.max_upload_bytes).await?;

    let prompt = form
        .prompt
        .unwrap_or_else(|| state.config.default_prompt.clone());
    tracing::info!(
        "Received {} byte upload with {} character prompt",
        form.image.len(),
        prompt.chars().count()
    );
    tracing::debug!("Prompt: {}", prompt);

    let max_dimension = state.config.max_input_dimension;
    let normalized = imaging::run_blocking(move || {
        imaging::normalize_input(&form.image, max_dimension)
    })
    .await?;

    let upload = state
        .storage
        .save_upload(
            &normalized.encoded.bytes,
            extension_for(&normalized.encoded.mime_type),
        )
        .await?;

    let output = state
        .model
        .generate(&ModelInput {
            prompt,
            image: normalized.encoded.clone(),
        })
        .await?;

    let (images, blank_images_dropped) = store_results(&state, &normalized, &output).await?;

    if images.is_empty() && blank_images_dropped > 0 {
        return Err(Error::BlankResult { text: output.text });
    }

    let elapsed = start.elapsed().as_millis();
    tracing::info!(
        "Generated {} image(s) in {}ms ({} blank dropped)",
        images.len(),
        elapsed,
        blank_images_dropped
    );

    Ok(Json(GenerateResponse {
        images: images.into_iter().map(|f| f.url).collect(),
        text: output.text,
        input: upload.url,
        transparent: normalized.alpha_mask.is_some(),
        blank_images_dropped,
        model: state.model.name().to_string(),
        processing_time_ms: elapsed,
    }))
}

async fn read_form(mut multipart: Multipart, limit: usize) -> Result<UploadForm> {
    let mut image = None;
    let mut prompt = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Multipart error", e, limit))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Image read error", e, limit))?;
                image = Some(data.to_vec());
            }
            "prompt" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Prompt read error", e, limit))?;
                let text = text.trim();
                if !text.is_empty() {
                    prompt = Some(text.to_string());
                }
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    match image {
        Some(image) if !image.is_empty() => Ok(UploadForm { image, prompt }),
        Some(_) => Err(Error::BadRequest("Uploaded image is empty".to_string())),
        None => Err(Error::BadRequest("Missing 'image' field".to_string())),
    }
}

/// Keeps the body-limit rejection distinct from a malformed form.
fn multipart_error(context: &str, e: MultipartError, limit: usize) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(format!("Upload exceeds the {} byte limit", limit))
    } else {
        Error::BadRequest(format!("{}: {}", context, e.body_text()))
    }
}

/// Post-processes and stores every returned image. Blank results are counted
/// and skipped; anything else that fails aborts the request.
async fn store_results(
    state: &AppState,
    normalized: &NormalizedImage,
    output: &ModelOutput,
) -> Result<(Vec<StoredFile>, usize)> {
    let mut stored = Vec::with_capacity(output.images.len());
    let mut blank = 0;

    for image in &output.images {
        match finalize(state, normalized, image).await {
            Ok(png) => stored.push(state.storage.save_output(&png, "png").await?),
            Err(Error::BlankResult { .. }) => {
                tracing::warn!("Dropping blank {} result from model", image.mime_type);
                blank += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok((stored, blank))
}

async fn finalize(
    state: &AppState,
    normalized: &NormalizedImage,
    image: &EncodedImage,
) -> Result<Vec<u8>> {
    let bytes = image.bytes.clone();
    let mask = normalized.alpha_mask.clone();
    let threshold = state.config.blank_threshold;

    let result = imaging::run_blocking(move || {
        imaging::finalize_output(&bytes, mask.as_ref(), threshold)
    })
    .await;

    match result {
        Ok(image) => Ok(image.png),
        Err(Error::Image(e)) => Err(Error::Upstream {
            status: 200,
            message: format!("Model returned an undecodable image: {}", e),
        }),
        Err(e) => Err(e),
    }
}

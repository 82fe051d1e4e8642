use super::types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part};
use super::{ImageModel, ModelInput, ModelOutput};
use crate::imaging::EncodedImage;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::time::Duration;

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_SAFETY",
    "BLOCKLIST",
    "SPII",
];

const MAX_LOGGED_BODY: usize = 500;

/// Gemini REST client for image-in, image/text-out `generateContent` calls.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// `model` may be given bare (`gemini-2.5-flash-image-preview`) or with a
    /// `models/` prefix.
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        tracing::info!("Sending request to Gemini model {}", self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                e
            })?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!("Gemini responded {}: {}", status, truncate(&body));

        if !status.is_success() {
            tracing::error!("Gemini API error (status {}): {}", status, truncate(&body));
            return Err(Error::Upstream {
                status: status.as_u16(),
                message: truncate(&body).to_string(),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}", e);
            Error::Upstream {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            }
        })
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate(&self, input: &ModelInput) -> Result<ModelOutput> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::text(input.prompt.clone()),
                    Part::inline(
                        input.image.mime_type.clone(),
                        general_purpose::STANDARD.encode(&input.image.bytes),
                    ),
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        let response = self.generate_content(&request).await?;
        let output = extract_output(response)?;

        tracing::info!(
            "Gemini returned {} image(s){}",
            output.images.len(),
            if output.text.is_some() { " and text" } else { "" }
        );
        Ok(output)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Collects text and images from the first candidate carrying anything
/// besides thought parts.
pub(crate) fn extract_output(response: GenerateContentResponse) -> Result<ModelOutput> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone())
    {
        return Err(Error::Blocked(reason));
    }

    let blocked_reason = response
        .candidates
        .iter()
        .filter_map(|c| c.finish_reason.as_deref())
        .find(|r| BLOCKING_FINISH_REASONS.contains(r))
        .map(str::to_string);

    let Some(content) = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .find(|c| c.parts.iter().any(|p| !p.thought))
    else {
        return Err(match blocked_reason {
            Some(reason) => Error::Blocked(reason),
            None => Error::Upstream {
                status: 200,
                message: "empty response".to_string(),
            },
        });
    };

    let mut texts = Vec::new();
    let mut images = Vec::new();
    for part in content.parts.into_iter().filter(|p| !p.thought) {
        if let Some(text) = part.text {
            let text = text.trim();
            if !text.is_empty() {
                texts.push(text.to_string());
            }
        }
        if let Some(inline) = part.inline_data {
            let bytes = general_purpose::STANDARD
                .decode(&inline.data)
                .map_err(|e| Error::Upstream {
                    status: 200,
                    message: format!("Failed to decode base64 image: {}", e),
                })?;
            images.push(EncodedImage {
                bytes,
                mime_type: inline.mime_type,
            });
        }
    }

    if texts.is_empty() && images.is_empty() {
        return Err(match blocked_reason {
            Some(reason) => Error::Blocked(reason),
            None => Error::Upstream {
                status: 200,
                message: "empty response".to_string(),
            },
        });
    }

    Ok(ModelOutput {
        images,
        text: (!texts.is_empty()).then(|| texts.join("\n")),
    })
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_LOGGED_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

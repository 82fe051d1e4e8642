//! Error type shared by the model client, image pipeline and HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Image encoding error: {0}")]
    Encode(String),

    #[error("Model API error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Request blocked by the model: {0}")]
    Blocked(String),

    #[error("Model returned a blank image")]
    BlankResult { text: Option<String> },

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Image(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::Blocked(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Upstream { .. } | Error::Http(_) | Error::BlankResult { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, self);
        } else {
            tracing::warn!("Request rejected ({}): {}", status, self);
        }

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Error::BlankResult { text: Some(text) } = &self {
            body["text"] = serde_json::Value::String(text.clone());
        }

        (status, Json(body)).into_response()
    }
}

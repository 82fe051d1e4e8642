//! Generative model integration.
//!
//! The service only knows the [`ImageModel`] trait; [`GeminiClient`] is the
//! live implementation and [`MockImageModel`] backs the tests.

pub mod client;
pub mod mock;
pub mod types;

pub use client::GeminiClient;
pub use mock::MockImageModel;

use crate::imaging::EncodedImage;
use crate::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ModelInput {
    pub prompt: String,
    pub image: EncodedImage,
}

/// Everything the model answered with; either side may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOutput {
    pub images: Vec<EncodedImage>,
    pub text: Option<String>,
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, input: &ModelInput) -> Result<ModelOutput>;

    fn name(&self) -> &str;
}

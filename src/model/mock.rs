use super::{ImageModel, ModelInput, ModelOutput};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Canned [`ImageModel`] that records every prompt it receives.
#[derive(Clone)]
pub struct MockImageModel {
    output: Arc<Mutex<ModelOutput>>,
    prompts: Arc<Mutex<Vec<String>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockImageModel {
    pub fn new() -> Self {
        Self {
            output: Arc::new(Mutex::new(ModelOutput::default())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_output(self, output: ModelOutput) -> Self {
        *self.output.lock().unwrap() = output;
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockImageModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageModel for MockImageModel {
    async fn generate(&self, input: &ModelInput) -> Result<ModelOutput> {
        self.prompts.lock().unwrap().push(input.prompt.clone());

        if *self.should_fail.lock().unwrap() {
            return Err(Error::Upstream {
                status: 500,
                message: "Mock failure".to_string(),
            });
        }

        Ok(self.output.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "mock-image-model"
    }
}

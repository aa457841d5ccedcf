//! Ollama `/api/generate` client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::{ModelClient, PromptPayload, Provider};
use crate::{Error, Result};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming client for a local Ollama server
pub struct OllamaClient {
    client: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    #[must_use]
    pub const fn new(client: Client, url: String, model: String) -> Self {
        Self { client, url, model }
    }
}

#[async_trait(?Send)]
impl ModelClient for OllamaClient {
    async fn generate(&self, prompt: &PromptPayload, max_tokens: u32) -> Result<String> {
        let PromptPayload::Text(text) = prompt else {
            return Err(Error::Config(format!(
                "ollama client needs a {} prompt, got {}",
                Provider::OllamaText,
                prompt.provider()
            )));
        };

        let request = GenerateRequest {
            model: &self.model,
            prompt: text,
            stream: false,
            options: GenerateOptions {
                num_predict: max_tokens,
            },
        };

        tracing::debug!(model = %self.model, prompt_chars = text.len(), "sending generate request");
        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(Error::Llm(super::api_error(response).await));
        }

        let body: GenerateResponse = response.json().await?;
        tracing::debug!(reply_chars = body.response.len(), "generate complete");
        Ok(body.response)
    }
}

//! Language model clients
//!
//! One client per payload shape; [`build_model_client`] picks the one that
//! matches the configured provider.

mod chat;
mod ollama;

pub use chat::ChatClient;
pub use ollama::OllamaClient;

use crate::Config;
use crate::conversation::{ModelClient, Provider};

/// Build the model client for the configured provider
#[must_use]
pub fn build_model_client(config: &Config) -> Box<dyn ModelClient> {
    let client = reqwest::Client::new();
    let model = config.llm.model.clone();
    let url = config.llm.url.clone();

    tracing::info!(
        provider = %config.session.provider,
        model = %model,
        url = %url,
        "model client configured"
    );

    match config.session.provider {
        Provider::OllamaText => Box::new(OllamaClient::new(client, url, model)),
        Provider::ChatMessages => Box::new(ChatClient::new(
            client,
            url,
            model,
            config.api_keys.openai.clone(),
        )),
    }
}

/// Render an unsuccessful HTTP response as an error message
async fn api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("API error {status}: {body}")
}

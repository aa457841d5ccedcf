//! OpenAI-compatible chat completions client
//!
//! Works with `OpenAI`, `OpenRouter` and local servers exposing
//! `/v1/chat/completions`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::{ModelClient, PromptPayload, Provider, Turn};
use crate::{Error, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
    }
}

/// Chat completions client
pub struct ChatClient {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatClient {
    #[must_use]
    pub const fn new(client: Client, url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client,
            url,
            model,
            api_key,
        }
    }
}

#[async_trait(?Send)]
impl ModelClient for ChatClient {
    async fn generate(&self, prompt: &PromptPayload, max_tokens: u32) -> Result<String> {
        let PromptPayload::Messages(messages) = prompt else {
            return Err(Error::Config(format!(
                "chat client needs a {} prompt, got {}",
                Provider::ChatMessages,
                prompt.provider()
            )));
        };

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
        };

        let mut req = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        tracing::debug!(model = %self.model, messages = messages.len(), "sending chat request");
        let response = req.send().await?;

        if !response.status().is_success() {
            return Err(Error::Llm(super::api_error(response).await));
        }

        let text = response.json::<ChatResponse>().await?.into_text();
        tracing::debug!(reply_chars = text.len(), "chat complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    #[test]
    fn test_request_shape() {
        let messages = vec![
            Turn::system("be brief"),
            Turn::new(Role::User, "what's up"),
        ];
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: 150,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "what's up");
    }

    #[test]
    fn test_response_text_extraction() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Sure."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_text(), "Sure.");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.into_text(), "");
    }

    #[tokio::test]
    async fn test_rejects_text_payload() {
        let client = ChatClient::new(
            Client::new(),
            "http://127.0.0.1:9/v1/chat/completions".into(),
            "test".into(),
            None,
        );
        let payload = PromptPayload::Text("User: hi\nAssistant:".into());

        let result = client.generate(&payload, 10).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

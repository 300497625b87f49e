use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{SuggestionError, SuggestionProvider};
use crate::config::AiConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible `/chat/completions` client
pub struct ChatCompletionsProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    pub fn from_config(config: &AiConfig, timeout: Duration) -> Result<Self, SuggestionError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(SuggestionError::NotConfigured("OPENAI_API_KEY"))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint: normalize_endpoint(&config.endpoint),
            client,
        })
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

#[async_trait]
impl SuggestionProvider for ChatCompletionsProvider {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, SuggestionError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system".into(), content: system.into() },
                ChatMessage { role: "user".into(), content: prompt.into() },
            ],
            "stream": false
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestionError::HttpStatus { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(SuggestionError::EmptyChoices)
    }
}

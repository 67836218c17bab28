//! Groq completion backend (OpenAI-compatible chat completions)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::{status_error, CompletionProvider};
use crate::config::{Backend, LlmConfig};
use crate::error::{Error, Result};

/// Client for the Groq hosted API
pub struct GroqProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqProvider {
    /// Create a Groq client; the API key must already be resolved
    pub fn new(config: &LlmConfig, model: impl Into<String>) -> Result<Self> {
        let api_key = config
            .groq_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::config("GROQ_API_KEY not found in environment"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.groq_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionProvider for GroqProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Backend::Groq, status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent(format!("Failed to parse Groq response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::permanent("Groq response contained no choices"))
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn backend(&self) -> Backend {
        Backend::Groq
    }
}

//! Ollama completion backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::{status_error, CompletionProvider};
use crate::config::{Backend, LlmConfig};
use crate::error::{Error, Result};

/// Client for a local Ollama server
pub struct OllamaProvider {
    /// HTTP client
    client: Client,
    /// Server base URL without trailing slash
    base_url: String,
    /// Model to generate with
    model: String,
    /// Sampling temperature
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaProvider {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: config.temperature,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models the server has pulled
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Backend::Ollama, status, &body));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent(format!("unexpected /api/tags body: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the configured model has been pulled on the server
    pub async fn has_model(&self) -> Result<bool> {
        let names = self.list_models().await?;
        Ok(is_pulled(&names, &self.model))
    }
}

/// A bare model name matches its `:latest` tag
fn is_pulled(names: &[String], model: &str) -> bool {
    names.iter().any(|name| {
        name == model || (!model.contains(':') && name.strip_suffix(":latest") == Some(model))
    })
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Backend::Ollama, status, &body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(generated.response)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn backend(&self) -> Backend {
        Backend::Ollama
    }
}

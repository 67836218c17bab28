//! Completion backend abstraction

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::Backend;
use crate::error::{Error, Result};

/// A text-completion backend
///
/// Implementations:
/// - `OllamaProvider`: local Ollama server (`/api/generate`)
/// - `GroqProvider`: Groq OpenAI-compatible API (`/chat/completions`)
///
/// A call makes exactly one request; retries and pacing happen in the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send `prompt` and return the completion text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Check whether the backend is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Which backend this is
    fn backend(&self) -> Backend;
}

/// Map a non-success HTTP status to a transient or permanent call error
pub(crate) fn status_error(backend: Backend, status: StatusCode, body: &str) -> Error {
    let body = body.trim();
    let detail = if body.len() > 300 {
        let mut cut = 300;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    };
    let message = format!("{} returned HTTP {}: {}", backend.name(), status, detail);

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::transient(message)
    } else {
        Error::permanent(message)
    }
}

//! Pair generation and verification through a completion backend

mod call;
mod generator;
mod groq;
mod ollama;
mod prompt;
mod provider;
mod retry;
mod verifier;

pub use call::ModelCaller;
pub use generator::{parse_response, Generator};
pub use groq::GroqProvider;
pub use ollama::OllamaProvider;
pub use prompt::{PromptBuilder, BLOCK_END, BLOCK_START};
pub use provider::CompletionProvider;
pub use retry::RetryPolicy;
pub use verifier::{parse_verdict, Verifier};

//! dataset-miner: instruction-tuning datasets from document collections
//!
//! Walks a directory of PDF, Word, PowerPoint, spreadsheet, markup, text and
//! source files, splits each into token-bounded chunks, asks a local Ollama
//! server or the Groq API for question/answer pairs per chunk, optionally has
//! the model verify every pair, and writes the result as an Alpaca-format JSON
//! array. Token usage is priced per model and calls are paced to the backend's
//! rate limits.

pub mod accounting;
pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod types;

pub use config::{Backend, MinerConfig};
pub use error::{Error, Result};
pub use pipeline::{Miner, RunReport};
pub use types::{
    document::{Chunk, ChunkSource, Document, FileType},
    qa_pair::{QaPair, Verification, VerificationStatus},
};

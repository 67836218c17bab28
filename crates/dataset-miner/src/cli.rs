//! Command-line arguments

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::{Backend, MinerConfig, SettingsFile, DEFAULT_OUTPUT};
use crate::error::Result;

/// Long options that older invocations spell with a single dash
const LEGACY_LONG_FLAGS: &[&str] = &["source", "model"];

/// Mine instruction-tuning question/answer pairs from a directory of documents
#[derive(Parser, Debug, Clone)]
#[command(name = "dataset-miner", version, about)]
pub struct Args {
    /// Directory containing files to mine
    #[arg(long, value_name = "DIR")]
    pub source: PathBuf,

    /// Model identifier, e.g. llama3.2:3b or llama-3.1-8b-instant
    #[arg(long, value_name = "NAME")]
    pub model: String,

    /// Output JSON file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Use the Groq API instead of a local Ollama server
    #[arg(long)]
    pub use_groq: bool,

    /// Verify every generated pair with a second model call
    #[arg(long)]
    pub verify: bool,

    /// Debug-level logging
    #[arg(long)]
    pub debug: bool,

    /// Drop CSV and Excel columns that are blank in every row
    #[arg(long)]
    pub remove_empty_columns: bool,

    /// Descend into subdirectories
    #[arg(long)]
    pub recursive: bool,

    /// Append a timestamp to the output file name
    #[arg(long)]
    pub timestamped_output: bool,

    /// TOML file with chunking, llm, retry, rate_limit, pricing or extraction overrides
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Price every call as this model
    #[arg(long, value_name = "MODEL")]
    pub price_as: Option<String>,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Ollama server URL
    #[arg(long, env = "OLLAMA_HOST", value_name = "URL")]
    pub ollama_url: Option<String>,

    #[arg(long, env = "GROQ_API_KEY", hide = true, hide_env_values = true)]
    pub groq_api_key: Option<String>,
}

impl Args {
    /// Parse process arguments, accepting `-source` and `-model`
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_legacy_flags(std::env::args_os()))
    }

    /// Build the run configuration; flags win over the settings file
    pub fn into_config(self) -> Result<MinerConfig> {
        let mut config = MinerConfig::new(self.source, self.model);
        config.llm.groq_api_key = self.groq_api_key;

        if let Some(path) = &self.config {
            config.apply_file(SettingsFile::load(path)?);
            tracing::debug!("Loaded settings from {}", path.display());
        }

        config.output = self.output;
        config.backend = if self.use_groq {
            Backend::Groq
        } else {
            Backend::Ollama
        };
        config.verify = self.verify;
        config.recursive = self.recursive;
        config.timestamped_output = self.timestamped_output;
        config.show_progress = !self.no_progress;
        if self.remove_empty_columns {
            config.extraction.remove_empty_columns = true;
        }
        if let Some(url) = self.ollama_url {
            config.llm.ollama_url = url;
        }
        if let Some(model) = self.price_as {
            config.pricing.price_as = Some(model);
        }

        Ok(config)
    }
}

/// Rewrite `-source x` and `-model=x` into their double-dash forms
pub fn normalize_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let name = rest.split('=').next().unwrap_or(rest);
            if LEGACY_LONG_FLAGS.contains(&name) {
                OsString::from(format!("-{}", text))
            } else {
                arg
            }
        })
        .collect()
}

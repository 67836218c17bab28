//! Configuration for the mining pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default output file
pub const DEFAULT_OUTPUT: &str = "mined_dataset.json";

/// Main miner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Directory containing files to mine
    pub source: PathBuf,
    /// Model identifier passed to the backend
    pub model: String,
    /// Output JSON file
    pub output: PathBuf,
    /// Completion backend
    pub backend: Backend,
    /// Run the verification pass
    pub verify: bool,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Append a timestamp to the output file stem
    pub timestamped_output: bool,
    /// Draw progress bars
    pub show_progress: bool,
    /// Extraction configuration
    pub extraction: ExtractionConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// LLM configuration
    pub llm: LlmConfig,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Rate limit configuration
    pub rate_limit: RateLimitConfig,
    /// Pricing configuration
    pub pricing: PricingConfig,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            model: String::new(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            backend: Backend::Ollama,
            verify: false,
            recursive: false,
            timestamped_output: false,
            show_progress: true,
            extraction: ExtractionConfig::default(),
            chunking: ChunkingConfig::default(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            pricing: PricingConfig::default(),
        }
    }
}

impl MinerConfig {
    /// Create a config for a source directory and model with defaults elsewhere
    pub fn new(source: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Overlay the sections found in a TOML settings file
    pub fn apply_file(&mut self, settings: SettingsFile) {
        if let Some(extraction) = settings.extraction {
            self.extraction = extraction;
        }
        if let Some(chunking) = settings.chunking {
            self.chunking = chunking;
        }
        if let Some(llm) = settings.llm {
            // The API key only ever comes from the environment
            let api_key = self.llm.groq_api_key.take();
            self.llm = llm;
            self.llm.groq_api_key = api_key;
        }
        if let Some(retry) = settings.retry {
            self.retry = retry;
        }
        if let Some(rate_limit) = settings.rate_limit {
            self.rate_limit = rate_limit;
        }
        if let Some(pricing) = settings.pricing {
            self.pricing = pricing;
        }
    }

    /// Check everything that must hold before any file is touched
    pub fn validate(&self) -> Result<()> {
        if !self.source.exists() {
            return Err(Error::config(format!(
                "source directory '{}' does not exist",
                self.source.display()
            )));
        }
        if !self.source.is_dir() {
            return Err(Error::config(format!(
                "source '{}' is not a directory",
                self.source.display()
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::config("a model name is required"));
        }
        if self.backend == Backend::Groq
            && self
                .llm
                .groq_api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(Error::config(
                "GROQ_API_KEY not found in environment; it is required with --use-groq",
            ));
        }
        self.chunking.validate()?;
        self.extraction.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(Error::config("retry.multiplier must be >= 1.0"));
        }
        Ok(())
    }

    /// Output path with the optional timestamp suffix applied
    pub fn resolved_output(&self) -> PathBuf {
        if self.timestamped_output {
            timestamped_path(&self.output, chrono::Local::now())
        } else {
            self.output.clone()
        }
    }
}

/// Append `_%Y%m%d_%H%M%S_%6f` to a file stem, keeping the extension
pub fn timestamped_path<Tz>(path: &Path, now: chrono::DateTime<Tz>) -> PathBuf
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mined_dataset".to_string());
    let stamp = now.format("%Y%m%d_%H%M%S_%6f");
    let filename = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, stamp),
    };
    path.with_file_name(filename)
}

/// Completion backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Groq hosted API (OpenAI-compatible)
    Groq,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Ollama => "ollama",
            Backend::Groq => "groq",
        }
    }
}

/// Sections that may be overridden from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub extraction: Option<ExtractionConfig>,
    pub chunking: Option<ChunkingConfig>,
    pub llm: Option<LlmConfig>,
    pub retry: Option<RetryConfig>,
    pub rate_limit: Option<RateLimitConfig>,
    pub pricing: Option<PricingConfig>,
}

impl SettingsFile {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file '{}': {}", path.display(), e))
        })?;
        Self::parse(&raw)
            .map_err(|e| Error::config(format!("invalid config file '{}': {}", path.display(), e)))
    }

    /// Parse settings from TOML text
    pub fn parse(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Drop columns whose every data cell is blank (CSV, Excel)
    pub remove_empty_columns: bool,
    /// Encoding tried first for text and code files
    pub text_encoding: String,
    /// Give up on pdf-extract after this many seconds
    pub pdf_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            remove_empty_columns: false,
            text_encoding: "utf-8".to_string(),
            pdf_timeout_secs: 60,
        }
    }
}

impl ExtractionConfig {
    fn validate(&self) -> Result<()> {
        if encoding_rs::Encoding::for_label(self.text_encoding.as_bytes()).is_none() {
            return Err(Error::config(format!(
                "unknown text encoding '{}'",
                self.text_encoding
            )));
        }
        Ok(())
    }
}

/// Token-bounded chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on tokens per chunk
    pub max_tokens: usize,
    /// Tokens shared between consecutive chunks
    pub overlap_tokens: usize,
}

/// Smallest chunk budget that still fits any single grapheme
pub const MIN_CHUNK_TOKENS: usize = 8;

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_tokens: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens < MIN_CHUNK_TOKENS {
            return Err(Error::config(format!(
                "chunking.max_tokens must be at least {}",
                MIN_CHUNK_TOKENS
            )));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(Error::config(format!(
                "chunking.overlap_tokens ({}) must be smaller than max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

/// LLM endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub ollama_url: String,
    /// Groq OpenAI-compatible base URL
    pub groq_url: String,
    /// Groq API key, taken from GROQ_API_KEY
    #[serde(skip)]
    pub groq_api_key: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            groq_url: "https://api.groq.com/openai/v1".to_string(),
            groq_api_key: None,
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff_ms: u64,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Cap on a single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

/// Rate limit configuration; unset fields fall back to backend defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum gap between consecutive calls
    pub min_interval_ms: Option<u64>,
    /// Requests allowed per rolling minute
    pub requests_per_minute: Option<u32>,
    /// Prompt tokens allowed per rolling minute
    pub tokens_per_minute: Option<u32>,
}

/// Groq free-tier limits
pub const GROQ_REQUESTS_PER_MINUTE: u32 = 29;
pub const GROQ_TOKENS_PER_MINUTE: u32 = 14_000;

/// Effective limits after applying backend defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub min_interval: Duration,
    pub requests_per_minute: Option<u32>,
    pub tokens_per_minute: Option<u32>,
}

impl RateLimitConfig {
    /// Resolve limits for a backend
    pub fn resolve(&self, backend: Backend) -> RateLimits {
        let (interval_ms, requests, tokens) = match backend {
            Backend::Ollama => (0, None, None),
            Backend::Groq => (
                60_000 / GROQ_REQUESTS_PER_MINUTE as u64,
                Some(GROQ_REQUESTS_PER_MINUTE),
                Some(GROQ_TOKENS_PER_MINUTE),
            ),
        };
        RateLimits {
            min_interval: Duration::from_millis(self.min_interval_ms.unwrap_or(interval_ms)),
            requests_per_minute: self.requests_per_minute.or(requests),
            tokens_per_minute: self.tokens_per_minute.or(tokens),
        }
    }
}

/// Price per thousand tokens for one model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPrice {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }
}

/// Pricing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Price every call as this model instead of the one actually used
    pub price_as: Option<String>,
    /// Extra or overriding price entries
    pub models: BTreeMap<String, ModelPrice>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid_config(dir: &Path) -> MinerConfig {
        MinerConfig::new(dir, "llama3.2")
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(valid_config(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_missing_source() {
        let config = MinerConfig::new("/definitely/not/here", "llama3.2");
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_groq_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.backend = Backend::Groq;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        config.llm.groq_api_key = Some("gsk_test".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_chunking_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.chunking.overlap_tokens = config.chunking.max_tokens;
        assert!(config.validate().is_err());

        config.chunking = ChunkingConfig {
            max_tokens: 4,
            overlap_tokens: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.extraction.text_encoding = "klingon-8".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limits_per_backend() {
        let limits = RateLimitConfig::default().resolve(Backend::Ollama);
        assert_eq!(limits.min_interval, Duration::ZERO);
        assert_eq!(limits.requests_per_minute, None);

        let limits = RateLimitConfig::default().resolve(Backend::Groq);
        assert_eq!(limits.requests_per_minute, Some(29));
        assert_eq!(limits.tokens_per_minute, Some(14_000));
        assert!(limits.min_interval > Duration::from_secs(2));

        let custom = RateLimitConfig {
            min_interval_ms: Some(10),
            ..Default::default()
        };
        assert_eq!(custom.resolve(Backend::Groq).min_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_settings_file_overlay() {
        let settings = SettingsFile::parse(
            r#"
            [chunking]
            max_tokens = 1024
            overlap_tokens = 100

            [pricing]
            price_as = "gpt-4o-mini"

            [pricing.models."llama3.2"]
            input_per_1k = 0.0001
            output_per_1k = 0.0002
            "#,
        )
        .unwrap();

        let mut config = MinerConfig::new(".", "llama3.2");
        config.llm.groq_api_key = Some("key".into());
        config.apply_file(settings);

        assert_eq!(config.chunking.max_tokens, 1024);
        assert_eq!(config.pricing.price_as.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.pricing.models["llama3.2"].output_per_1k, 0.0002);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.llm.groq_api_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_settings_file_rejects_unknown_section() {
        assert!(SettingsFile::parse("[server]\nport = 1").is_err());
    }

    #[test]
    fn test_timestamped_path() {
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = timestamped_path(Path::new("out/data.json"), now);
        assert_eq!(path, PathBuf::from("out/data_20240309_140507_000000.json"));
    }
}

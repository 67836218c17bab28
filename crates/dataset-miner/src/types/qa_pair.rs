//! Alpaca-format question/answer records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict returned by the verification pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Correct,
    Incorrect,
    Uncertain,
}

impl VerificationStatus {
    /// Parse a verdict word, ignoring case and trailing punctuation
    pub fn parse_word(word: &str) -> Option<Self> {
        let word = word
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_ascii_uppercase();
        match word.as_str() {
            "CORRECT" => Some(Self::Correct),
            "INCORRECT" => Some(Self::Incorrect),
            "UNCERTAIN" | "UNKNOWN" => Some(Self::Uncertain),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Correct => "CORRECT",
            Self::Incorrect => "INCORRECT",
            Self::Uncertain => "UNCERTAIN",
        };
        f.write_str(word)
    }
}

/// Verification outcome attached to a pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verification {
    pub status: VerificationStatus,
    pub explanation: String,
}

impl Verification {
    pub fn new(status: VerificationStatus, explanation: impl Into<String>) -> Self {
        Self {
            status,
            explanation: explanation.into(),
        }
    }
}

/// One instruction-tuning record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QaPair {
    /// Question text
    pub instruction: String,
    /// Optional sample input, usually empty
    #[serde(default)]
    pub input: String,
    /// Answer text
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

impl QaPair {
    /// Build a pair, rejecting blank questions or answers
    pub fn new(
        instruction: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Option<Self> {
        let instruction = instruction.into().trim().to_string();
        let output = output.into().trim().to_string();
        if instruction.is_empty() || output.is_empty() {
            return None;
        }
        Some(Self {
            instruction,
            input: input.into().trim().to_string(),
            output,
            verification: None,
        })
    }

    pub fn is_verified(&self) -> bool {
        self.verification.is_some()
    }
}

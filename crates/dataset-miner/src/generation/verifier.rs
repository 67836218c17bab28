//! Second-pass verification of generated pairs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::call::ModelCaller;
use super::prompt::PromptBuilder;
use crate::accounting::{CostTracker, RateLimiter};
use crate::error::Result;
use crate::types::{OperationKind, QaPair, Verification, VerificationStatus};

static VERDICT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*\**\s*verdict\s*\**\s*:\s*\**\s*([A-Za-z]+)").expect("valid verdict regex")
});

static EXPLANATION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*\**\s*explanation\s*\**\s*:\s*\**").expect("valid explanation regex")
});

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid object regex"));

#[derive(Deserialize)]
struct VerdictJson {
    verdict: String,
    #[serde(default)]
    explanation: String,
}

/// Asks the model to judge each pair against its source chunk
pub struct Verifier<'a> {
    caller: &'a ModelCaller<'a>,
}

impl<'a> Verifier<'a> {
    pub fn new(caller: &'a ModelCaller<'a>) -> Self {
        Self { caller }
    }

    /// Judge one pair; fails only when the model call fails
    pub async fn verify(
        &self,
        context: &str,
        pair: &QaPair,
        limiter: &mut RateLimiter,
        tracker: &mut CostTracker,
    ) -> Result<Verification> {
        let prompt = PromptBuilder::build_verification_prompt(context, pair);
        let response = self
            .caller
            .call(OperationKind::Verify, &prompt, limiter, tracker)
            .await?;
        tracing::debug!("Verification response: {}", response);
        Ok(parse_verdict(&response))
    }

    /// Annotate every pair; a pair whose verification call fails is kept without a verdict
    pub async fn verify_all(
        &self,
        context: &str,
        pairs: Vec<QaPair>,
        limiter: &mut RateLimiter,
        tracker: &mut CostTracker,
    ) -> Vec<QaPair> {
        let mut verified = Vec::with_capacity(pairs.len());
        for mut pair in pairs {
            match self.verify(context, &pair, limiter, tracker).await {
                Ok(verification) => pair.verification = Some(verification),
                Err(e) => tracing::error!(
                    "Verification failed for \"{}\", keeping pair unverified: {}",
                    pair.instruction,
                    e
                ),
            }
            verified.push(pair);
        }
        verified
    }
}

/// Read a verdict from a response; anything unrecognized is UNCERTAIN
pub fn parse_verdict(response: &str) -> Verification {
    let response = response.trim();

    if let Some(caps) = VERDICT_LINE.captures(response) {
        if let Some(status) = VerificationStatus::parse_word(&caps[1]) {
            let explanation = EXPLANATION_LINE
                .find(response)
                .map(|m| response[m.end()..].trim().trim_end_matches('*').trim())
                .unwrap_or_default();
            return Verification::new(status, explanation);
        }
    }

    if let Some(object) = JSON_OBJECT.find(response) {
        if let Ok(parsed) = serde_json::from_str::<VerdictJson>(object.as_str()) {
            if let Some(status) = VerificationStatus::parse_word(&parsed.verdict) {
                return Verification::new(status, parsed.explanation.trim());
            }
        }
    }

    if let Some(first) = response.split_whitespace().next() {
        if let Some(status) = VerificationStatus::parse_word(first) {
            let rest = response[first.len()..].trim_start_matches(|c: char| {
                c.is_whitespace() || matches!(c, ':' | '-' | '.' | ',')
            });
            return Verification::new(status, rest.trim());
        }
    }

    Verification::new(VerificationStatus::Uncertain, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::PriceTable;
    use crate::config::Backend;
    use crate::error::Error;
    use crate::generation::provider::MockCompletionProvider;
    use crate::generation::retry::RetryPolicy;
    use proptest::prelude::*;

    #[test]
    fn test_verdict_line() {
        let v = parse_verdict("VERDICT: INCORRECT\nEXPLANATION: The text says 1998,\nnot 1999.");
        assert_eq!(v.status, VerificationStatus::Incorrect);
        assert_eq!(v.explanation, "The text says 1998,\nnot 1999.");

        let v = parse_verdict("**Verdict:** Correct");
        assert_eq!(v.status, VerificationStatus::Correct);
        assert_eq!(v.explanation, "");
    }

    #[test]
    fn test_json_verdict() {
        let v = parse_verdict(
            "```json\n{\"verdict\": \"CORRECT\", \"explanation\": \"Matches the context.\"}\n```",
        );
        assert_eq!(v.status, VerificationStatus::Correct);
        assert_eq!(v.explanation, "Matches the context.");
    }

    #[test]
    fn test_first_word_verdict() {
        let v = parse_verdict("INCORRECT - the answer names the wrong author.");
        assert_eq!(v.status, VerificationStatus::Incorrect);
        assert_eq!(v.explanation, "the answer names the wrong author.");
    }

    #[test]
    fn test_unparseable_is_uncertain() {
        let v = parse_verdict("I am not sure what you mean.");
        assert_eq!(v.status, VerificationStatus::Uncertain);
        assert_eq!(parse_verdict("").status, VerificationStatus::Uncertain);
        assert_eq!(parse_verdict("VERDICT: perhaps").status, VerificationStatus::Uncertain);
    }

    fn pairs(n: usize) -> Vec<QaPair> {
        (0..n)
            .map(|i| QaPair::new(format!("Q{}?", i), "", format!("A{}", i)).unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_all_keeps_every_pair() {
        let mut calls = 0;
        let mut mock = MockCompletionProvider::new();
        mock.expect_complete().returning(move |_| {
            calls += 1;
            match calls {
                1 => Ok("VERDICT: CORRECT\nEXPLANATION: fine".into()),
                2 => Ok("gibberish".into()),
                _ => Err(Error::permanent("400 bad request")),
            }
        });
        mock.expect_backend().return_const(Backend::Groq);

        let caller = ModelCaller::new(&mock, "llama-3.1-8b-instant", RetryPolicy::default());
        let verifier = Verifier::new(&caller);
        let mut limiter = RateLimiter::unlimited();
        let mut tracker = CostTracker::new(PriceTable::builtin(), None);

        let result = verifier
            .verify_all("context", pairs(3), &mut limiter, &mut tracker)
            .await;

        assert_eq!(result.len(), 3);
        assert_eq!(
            result[0].verification.as_ref().map(|v| v.status),
            Some(VerificationStatus::Correct)
        );
        assert_eq!(
            result[1].verification.as_ref().map(|v| v.status),
            Some(VerificationStatus::Uncertain)
        );
        assert!(result[2].verification.is_none());
        assert_eq!(result[2].instruction, "Q2?");
        assert_eq!(tracker.records().len(), 2);
        assert!(tracker
            .records()
            .iter()
            .all(|r| r.operation == OperationKind::Verify));
    }

    proptest! {
        #[test]
        fn prop_parse_verdict_never_panics(response in "\\PC{0,80}") {
            let v = parse_verdict(&response);
            prop_assert!(matches!(
                v.status,
                VerificationStatus::Correct | VerificationStatus::Incorrect | VerificationStatus::Uncertain
            ));
        }
    }
}

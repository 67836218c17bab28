//! Question/answer generation and response parsing

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::call::ModelCaller;
use super::prompt::{PromptBuilder, BLOCK_END, BLOCK_START};
use crate::accounting::{CostTracker, RateLimiter};
use crate::error::{Error, Result};
use crate::types::{Chunk, OperationKind, QaPair};

/// `QUESTION:` / `INPUT:` / `ANSWER:` at line start, tolerating markdown bold
static FIELD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\**\s*(question|input|answer)\s*\**\s*:\s*\**\s*(.*)$")
        .expect("valid field regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Question,
    Input,
    Answer,
}

#[derive(Deserialize)]
struct LegacyPair {
    instruction: String,
    #[serde(default)]
    input: String,
    output: String,
}

/// Turns chunks into question/answer pairs
pub struct Generator<'a> {
    caller: &'a ModelCaller<'a>,
}

impl<'a> Generator<'a> {
    pub fn new(caller: &'a ModelCaller<'a>) -> Self {
        Self { caller }
    }

    /// Prompt the model with one chunk and parse its pairs
    ///
    /// Returns an error only when the call itself fails after retries; a
    /// response with no usable blocks yields an empty list.
    pub async fn generate(
        &self,
        chunk: &Chunk,
        limiter: &mut RateLimiter,
        tracker: &mut CostTracker,
    ) -> Result<Vec<QaPair>> {
        let prompt = PromptBuilder::build_generation_prompt(&chunk.content);
        let response = self
            .caller
            .call(OperationKind::Generate, &prompt, limiter, tracker)
            .await?;

        tracing::debug!(
            "Raw response for chunk {} of {}:\n{}",
            chunk.index,
            chunk.source.describe(),
            response
        );

        let pairs = parse_response(&response);
        if pairs.is_empty() {
            tracing::debug!(
                "No pairs parsed from chunk {} of {}",
                chunk.index,
                chunk.source.describe()
            );
        }
        Ok(pairs)
    }
}

/// Parse a response by the block grammar, or the legacy JSON array when no block marker appears
pub fn parse_response(response: &str) -> Vec<QaPair> {
    if response.contains(BLOCK_START) {
        parse_blocks(response)
    } else {
        match parse_legacy_json(response) {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::debug!("{}", e);
                Vec::new()
            }
        }
    }
}

fn parse_blocks(response: &str) -> Vec<QaPair> {
    let mut pairs = Vec::new();

    for (i, raw) in response.split(BLOCK_START).skip(1).enumerate() {
        let Some((body, _)) = raw.split_once(BLOCK_END) else {
            tracing::debug!("Discarding block {}: missing {}", i + 1, BLOCK_END);
            continue;
        };
        match parse_block(body) {
            Ok(pair) => pairs.push(pair),
            Err(e) => tracing::debug!("Discarding block {}: {}", i + 1, e),
        }
    }

    pairs
}

/// Fields run until the next label line; the first occurrence of a label wins
fn parse_block(body: &str) -> Result<QaPair> {
    let mut question: Option<String> = None;
    let mut input: Option<String> = None;
    let mut answer: Option<String> = None;
    let mut current: Option<(Field, String)> = None;

    let mut finish = |field: Field, text: String| {
        let slot = match field {
            Field::Question => &mut question,
            Field::Input => &mut input,
            Field::Answer => &mut answer,
        };
        if slot.is_none() {
            *slot = Some(text);
        }
    };

    for line in body.lines() {
        if let Some(caps) = FIELD_LABEL.captures(line) {
            if let Some((field, text)) = current.take() {
                finish(field, text);
            }
            let field = match caps[1].to_ascii_lowercase().as_str() {
                "question" => Field::Question,
                "input" => Field::Input,
                _ => Field::Answer,
            };
            current = Some((field, caps[2].to_string()));
        } else if let Some((_, text)) = current.as_mut() {
            text.push('\n');
            text.push_str(line);
        }
    }
    if let Some((field, text)) = current.take() {
        finish(field, text);
    }

    QaPair::new(
        question.unwrap_or_default(),
        input.unwrap_or_default(),
        answer.unwrap_or_default(),
    )
    .ok_or_else(|| Error::ParseResponse("block lacks a non-empty QUESTION or ANSWER".into()))
}

fn parse_legacy_json(response: &str) -> Result<Vec<QaPair>> {
    let items = first_json_array(response)
        .ok_or_else(|| Error::ParseResponse("no QA blocks or JSON array in response".into()))?;

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<LegacyPair>(item) {
            Ok(legacy) => QaPair::new(legacy.instruction, legacy.input, legacy.output),
            Err(e) => {
                tracing::debug!("Discarding JSON item: {}", e);
                None
            }
        })
        .collect())
}

/// The first `[` that opens a well-formed JSON array; text after its closing bracket is ignored
fn first_json_array(response: &str) -> Option<Vec<serde_json::Value>> {
    response.match_indices('[').find_map(|(idx, _)| {
        serde_json::Deserializer::from_str(&response[idx..])
            .into_iter::<Vec<serde_json::Value>>()
            .next()
            .and_then(|parsed| parsed.ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::PriceTable;
    use crate::config::Backend;
    use crate::generation::provider::MockCompletionProvider;
    use crate::generation::retry::RetryPolicy;
    use crate::types::{ChunkSource, SegmentLabel};
    use proptest::prelude::*;

    #[test]
    fn test_parse_blocks() {
        let response = "Sure! Here you go.\n\
            <<<QA>>>\nQUESTION: What is ownership?\nANSWER: A set of rules\nfor managing memory.\n<<<END>>>\n\
            noise between blocks\n\
            <<<QA>>>\nquestion: Give an example input?\nInput: let x = 5;\nAnswer: x is bound to 5.\n<<<END>>>";
        let pairs = parse_response(response);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].instruction, "What is ownership?");
        assert_eq!(pairs[0].output, "A set of rules\nfor managing memory.");
        assert_eq!(pairs[0].input, "");
        assert_eq!(pairs[1].input, "let x = 5;");
        assert_eq!(pairs[1].output, "x is bound to 5.");
    }

    #[test]
    fn test_malformed_blocks_discarded() {
        let response = "<<<QA>>>\nQUESTION: Only a question\n<<<END>>>\
            <<<QA>>>\nQUESTION:\nANSWER: orphan answer\n<<<END>>>\
            <<<QA>>>\nQUESTION: Good?\nANSWER: Yes.\n<<<END>>>\
            <<<QA>>>\nQUESTION: Truncated?\nANSWER: cut off mid";
        let pairs = parse_response(response);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].instruction, "Good?");
    }

    #[test]
    fn test_bold_labels() {
        let response = "<<<QA>>>\n**Question:** Why?\n**Answer:** Because.\n<<<END>>>";
        let pairs = parse_response(response);
        assert_eq!(pairs[0].instruction, "Why?");
        assert_eq!(pairs[0].output, "Because.");
    }

    #[test]
    fn test_legacy_json_fallback() {
        let response = r#"Here is the data:
        [
            {"instruction": "What is Rust?", "input": "", "output": "A language."},
            {"instruction": "", "input": "", "output": "dropped"},
            {"question": "wrong shape"}
        ]
        Hope that helps."#;
        let pairs = parse_response(response);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].output, "A language.");
    }

    #[test]
    fn test_legacy_json_ignores_bracketed_prose() {
        let response = r#"Pairs [draft] below:
        [{"instruction": "What is a crate?", "input": "", "output": "A compilation unit."}]
        See the Rust book [1] for more."#;
        let pairs = parse_response(response);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].instruction, "What is a crate?");
    }

    #[test]
    fn test_unparseable_response_is_empty() {
        assert!(parse_response("I cannot help with that.").is_empty());
        assert!(parse_response("[not json").is_empty());
    }

    #[tokio::test]
    async fn test_generate_records_usage() {
        let mut mock = MockCompletionProvider::new();
        mock.expect_complete()
            .withf(|prompt| prompt.contains("The borrow checker"))
            .times(1)
            .returning(|_| Ok("<<<QA>>>\nQUESTION: What checks borrows?\nANSWER: The borrow checker.\n<<<END>>>".into()));
        mock.expect_backend().return_const(Backend::Ollama);

        let caller = ModelCaller::new(&mock, "gpt-4o-mini", RetryPolicy::default());
        let generator = Generator::new(&caller);
        let chunk = Chunk {
            content: "The borrow checker enforces references rules.".into(),
            token_count: 8,
            index: 0,
            byte_range: 0..46,
            source: ChunkSource {
                path: "notes.txt".into(),
                segments: 0..1,
                label: SegmentLabel::Whole,
            },
        };
        let mut limiter = RateLimiter::unlimited();
        let mut tracker = CostTracker::new(PriceTable::builtin(), None);

        let pairs = generator
            .generate(&chunk, &mut limiter, &mut tracker)
            .await
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(tracker.records()[0].operation, OperationKind::Generate);
    }

    proptest! {
        #[test]
        fn prop_parsed_pairs_are_never_blank(
            blocks in proptest::collection::vec(("[ a-z?]{0,12}", "[ a-z]{0,8}", "[ a-z.]{0,12}"), 0..8)
        ) {
            let response: String = blocks
                .iter()
                .map(|(q, i, a)| format!("<<<QA>>>\nQUESTION: {}\nINPUT: {}\nANSWER: {}\n<<<END>>>\n", q, i, a))
                .collect();
            let expected = blocks
                .iter()
                .filter(|(q, _, a)| !q.trim().is_empty() && !a.trim().is_empty())
                .count();

            let pairs = parse_response(&response);
            prop_assert_eq!(pairs.len(), expected);
            for pair in pairs {
                prop_assert!(!pair.instruction.is_empty());
                prop_assert!(!pair.output.is_empty());
            }
        }
    }
}

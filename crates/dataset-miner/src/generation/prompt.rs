//! Prompt templates for pair generation and verification

use crate::types::QaPair;

/// Opens one question/answer block in a model response
pub const BLOCK_START: &str = "<<<QA>>>";
/// Closes a block
pub const BLOCK_END: &str = "<<<END>>>";

/// Prompt builder for both model passes
pub struct PromptBuilder;

impl PromptBuilder {
    /// Prompt asking for question/answer pairs grounded in `text`
    pub fn build_generation_prompt(text: &str) -> String {
        format!(
            r#"Generate any number of questions and their answers based on the following text.
The number of questions can depend on how much the text contains.
Focus on general questions relevant to the text. There is no need to ask about
the location, time or other incidental details of the document itself.

Write every pair in exactly this format, one block per pair:

{start}
QUESTION: the question
INPUT: an optional sample input, or leave empty
ANSWER: the answer
{end}

Do not write anything outside the blocks.

TEXT:
{text}"#,
            start = BLOCK_START,
            end = BLOCK_END,
            text = text.trim(),
        )
    }

    /// Prompt asking whether `pair` is relevant to and supported by `context`
    pub fn build_verification_prompt(context: &str, pair: &QaPair) -> String {
        let input = if pair.input.is_empty() {
            String::new()
        } else {
            format!("Input: {}\n", pair.input)
        };

        format!(
            r#"You verify the relevance of a question and the correctness of an answer against the provided context.

Context: {context}

Question: {question}
{input}Answer: {answer}

Decide whether the question is relevant to the context and the answer is correct and supported by it.

Respond in exactly this format:
VERDICT: CORRECT, INCORRECT or UNCERTAIN
EXPLANATION: a brief explanation"#,
            context = context.trim(),
            question = pair.instruction,
            input = input,
            answer = pair.output,
        )
    }
}

//! Prompt assembly
//!
//! Builds the single instruction string handed to the generation
//! backend. The template is deterministic: preamble, ranked snippets in
//! the order received, the question, and an answer marker. Ordering and
//! filtering are the retriever's responsibility; the assembler touches
//! neither.

use std::fmt::Write;

use crate::retriever::RetrievalResult;

const PREAMBLE: &str = "Answer the question using only the context provided below. \
If the context does not contain the information needed to answer, say so explicitly.";

/// Build the generation prompt from a question and its ranked context.
///
/// An empty result list keeps the template structure with an empty
/// context section; it is a valid input, not an error.
#[inline]
pub fn build_prompt(query: &str, results: &[RetrievalResult]) -> String {
    let mut prompt = String::with_capacity(256);
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\nContext:\n");

    for result in results {
        let snippet = result.snippet.as_deref().unwrap_or_default();
        let _ = write!(prompt, "\n- {} (relevance: {:.2})", snippet, result.score);
    }

    let _ = write!(prompt, "\n\nQuestion: {}\n\nAnswer:", query);
    prompt
}

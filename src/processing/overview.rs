//! Welcome summary and suggested questions for a freshly ingested document.
//!
//! One combined prompt is tried first. Whatever part it fails to deliver is requested with a
//! dedicated prompt, and fixed fallbacks cover anything still missing. Generation failures
//! degrade to fallbacks and are never surfaced as errors.

use super::index::Chunk;
use super::retry::{CallPolicy, call_with_policy};
use super::types::DocumentOverview;
use crate::generation::GenerationClient;
use regex::Regex;
use std::sync::OnceLock;

/// Leading chunks considered when summarizing a document.
pub const OVERVIEW_CHUNK_LIMIT: usize = 80;
/// Character cap of the combined prompt's document context.
pub const OVERVIEW_CONTEXT_CHARS: usize = 5000;
const FOCUSED_CONTEXT_CHARS: usize = 3000;
const MIN_WELCOME_CHARS: usize = 20;
const MIN_QUESTION_CHARS: usize = 10;
const MIN_QUESTIONS: usize = 2;

const FALLBACK_QUESTIONS: [&str; 4] = [
    "What are the main topics and key points covered in this document?",
    "Can you summarize the most important information presented?",
    "What specific details or findings should I pay attention to?",
    "How is the information in this document organized or structured?",
];

/// Generate a welcome summary and up to `count` suggested questions.
pub async fn build_overview(
    generator: &dyn GenerationClient,
    policy: &CallPolicy,
    chunks: &[Chunk],
    source: &str,
    count: usize,
) -> DocumentOverview {
    let context = overview_context(chunks);
    let focused = truncate_chars(&context, FOCUSED_CONTEXT_CHARS);

    let combined = generate(generator, policy, &combined_prompt(&context)).await;
    let (mut welcome, mut questions) = match combined {
        Some(response) => parse_combined(&response),
        None => (None, Vec::new()),
    };

    if welcome.is_none() {
        welcome = generate(generator, policy, &welcome_prompt(focused))
            .await
            .map(|text| text.trim().to_string())
            .filter(|text| text.chars().count() > MIN_WELCOME_CHARS);
    }
    if questions.len() < MIN_QUESTIONS {
        if let Some(response) = generate(generator, policy, &questions_prompt(focused)).await {
            let retried = parse_questions(&response);
            if !retried.is_empty() {
                questions = retried;
            }
        }
    }

    let mut used_fallback = false;
    let summary = welcome.unwrap_or_else(|| {
        used_fallback = true;
        fallback_welcome(source)
    });
    if questions.len() < MIN_QUESTIONS {
        used_fallback = true;
        for fallback in FALLBACK_QUESTIONS {
            if !questions.iter().any(|q| q.eq_ignore_ascii_case(fallback)) {
                questions.push(fallback.to_string());
            }
        }
    }
    questions.truncate(count);

    DocumentOverview {
        summary,
        questions,
        used_fallback,
    }
}

async fn generate(
    generator: &dyn GenerationClient,
    policy: &CallPolicy,
    prompt: &str,
) -> Option<String> {
    match call_with_policy(policy, "overview", || generator.generate(prompt)).await {
        Ok(text) => Some(text),
        Err(error) => {
            tracing::warn!(error = %error, "Overview generation failed; using fallbacks");
            None
        }
    }
}

/// Document context for overview prompts: the leading chunks, capped in length.
pub fn overview_context(chunks: &[Chunk]) -> String {
    let joined = chunks
        .iter()
        .take(OVERVIEW_CHUNK_LIMIT)
        .map(|chunk| chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, OVERVIEW_CONTEXT_CHARS).to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

fn combined_prompt(context: &str) -> String {
    format!(
        "Based ONLY on the document content below, create:
1. A warm, professional, and detailed welcome message that introduces the purpose, scope, and structure of this document and explains what the reader can expect to find in it.
2. 3-5 specific questions that can be answered from this document.

Document content:
{context}

Respond in this EXACT format:
WELCOME: [your welcome message here]
QUESTIONS:
1. [question 1]
2. [question 2]
3. [question 3]"
    )
}

fn welcome_prompt(context: &str) -> String {
    format!(
        "Based ONLY on the document content below, write a warm, professional, and detailed welcome message that:
- Introduces the purpose and scope of this document
- Explains what the document is about
- Describes what the reader can expect to learn or find within it
- Mentions the structure or key sections

Document content:
{context}

Respond with ONLY the welcome message, no labels or formatting:"
    )
}

fn questions_prompt(context: &str) -> String {
    format!(
        "Based ONLY on the document content below, generate 3-5 specific questions that can be answered directly from the content. Make them diverse and cover different aspects.

Document content:
{context}

Respond with ONLY the questions in this exact format:
1. [specific question about document content]
2. [specific question about document content]
3. [specific question about document content]"
    )
}

/// Parse a `WELCOME:` / `QUESTIONS:` response.
///
/// Either section may be missing. The welcome is dropped when it is 20 characters or shorter.
pub fn parse_combined(response: &str) -> (Option<String>, Vec<String>) {
    let (head, questions) = match response.split_once("QUESTIONS:") {
        Some((head, tail)) => (head, parse_questions(tail)),
        None => (response, Vec::new()),
    };
    let welcome = head
        .split_once("WELCOME:")
        .map(|(_, welcome)| welcome.trim().to_string())
        .filter(|welcome| welcome.chars().count() > MIN_WELCOME_CHARS);
    (welcome, questions)
}

fn numbered_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"^\d+[.)]\s*").expect("static question prefix regex"))
}

/// Extract numbered questions, one per line.
///
/// Lines must carry a digit within their first three characters. Questions of ten characters
/// or fewer are dropped, duplicates are removed case-insensitively, and every question ends
/// with `?`.
pub fn parse_questions(text: &str) -> Vec<String> {
    let mut questions: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim) {
        if !line.chars().take(3).any(|c| c.is_ascii_digit()) {
            continue;
        }
        let question = numbered_prefix().replace(line, "").trim().to_string();
        if question.chars().count() <= MIN_QUESTION_CHARS {
            continue;
        }
        let question = if question.ends_with('?') {
            question
        } else {
            format!("{}?", question.trim_end_matches(['.', ':']))
        };
        let duplicate = questions
            .iter()
            .any(|existing| existing.to_lowercase() == question.to_lowercase());
        if !duplicate {
            questions.push(question);
        }
    }
    questions
}

fn fallback_welcome(source: &str) -> String {
    format!(
        "I've analyzed your document '{source}' and I'm ready to help you explore its content. This document contains valuable information that I can help you understand and discuss."
    )
}

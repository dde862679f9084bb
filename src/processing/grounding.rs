//! Post-hoc attribution of answer segments to document pages.
//!
//! Attribution is a best-effort text match: a segment goes to the page sharing the most of its
//! wording. It is reliable when the match is unambiguous and can be wrong for paraphrased or
//! synthesized claims. Segments matching no page at all fall back to page 1.

use super::index::Chunk;
use super::prompt::is_no_information;
use super::sanitize::{content_words, normalize_for_match};
use super::types::AnswerSegment;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

const SUBSTRING_SCORE: u32 = 100;
const CONTENT_WORD_SCORE: u32 = 10;

#[derive(Debug, Clone, Default)]
struct PageText {
    normalized: String,
    words: HashSet<String>,
}

impl PageText {
    fn new(raw: &str) -> Self {
        let normalized = normalize_for_match(raw);
        let words = normalized.split_whitespace().map(str::to_string).collect();
        Self { normalized, words }
    }
}

/// Normalized text of each page, keyed by one-based page number.
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    pages: BTreeMap<u32, PageText>,
}

impl PageMap {
    /// Build from full per-page text as supplied by the document loader.
    pub fn from_page_texts<P: AsRef<str>>(pages: &[P]) -> Self {
        let pages = pages
            .iter()
            .zip(1u32..)
            .map(|(text, number)| (number, PageText::new(text.as_ref())))
            .collect();
        Self { pages }
    }

    /// Build by concatenating indexed chunk texts per page.
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut grouped: BTreeMap<u32, String> = BTreeMap::new();
        for chunk in chunks {
            let page = grouped.entry(chunk.page_number).or_default();
            page.push_str(&chunk.text);
            page.push(' ');
        }
        let pages = grouped
            .into_iter()
            .map(|(number, text)| (number, PageText::new(&text)))
            .collect();
        Self { pages }
    }

    /// Pages holding text.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Normalized text of `page_number`.
    pub fn page_text(&self, page_number: u32) -> Option<&str> {
        self.pages
            .get(&page_number)
            .map(|page| page.normalized.as_str())
    }
}

/// Split a raw answer into claim segments and attribute each to its best-matching page.
///
/// Segments come from lines (list markers removed) split on sentence endings, in answer
/// order. "No information" segments carry no page. Other segments are scored against pages
/// `1..=total_pages`: +100 when the whole normalized segment occurs in the page, +10 per
/// distinct content word (longer than three characters) found on the page. The highest score
/// wins with ties going to the lowest page; when nothing scores, page 1 is used.
pub fn ground_answer(
    raw_answer: &str,
    page_map: &PageMap,
    total_pages: usize,
) -> Vec<AnswerSegment> {
    split_segments(raw_answer)
        .into_iter()
        .map(|text| {
            let page_number = if is_no_information(&text) || total_pages == 0 {
                None
            } else {
                Some(best_page(&text, page_map, total_pages))
            };
            AnswerSegment { text, page_number }
        })
        .collect()
}

fn best_page(segment: &str, page_map: &PageMap, total_pages: usize) -> u32 {
    let normalized = normalize_for_match(segment);
    let words = content_words(&normalized);
    let last_page = u32::try_from(total_pages).unwrap_or(u32::MAX);

    let mut best: Option<(u32, u32)> = None;
    for (&number, page) in page_map.pages.range(1..=last_page) {
        let mut score = 0;
        if page.normalized.contains(&normalized) {
            score += SUBSTRING_SCORE;
        }
        let shared = words
            .iter()
            .filter(|word| page.words.contains(**word))
            .count() as u32;
        score += shared * CONTENT_WORD_SCORE;

        // Pages iterate in ascending order, so strict `>` keeps the lowest page on ties.
        if score > 0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((number, score));
        }
    }

    best.map(|(number, _)| number).unwrap_or(1)
}

fn list_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"^(?:[-*•+]|\d+[.)])\s+").expect("static list marker regex")
    })
}

fn split_segments(raw_answer: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for line in raw_answer.lines() {
        let line = list_marker().replace(line.trim(), "");
        for sentence in split_sentences(&line) {
            if !normalize_for_match(sentence).is_empty() {
                segments.push(sentence.to_string());
            }
        }
    }
    segments
}

/// Split after `.`, `!`, or `?` when followed by whitespace.
fn split_sentences(line: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = line.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if chars.peek().is_some_and(|(_, next)| next.is_whitespace()) {
            let end = offset + c.len_utf8();
            sentences.push(line[start..end].trim());
            start = end;
        }
    }
    let rest = line[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences.retain(|sentence| !sentence.is_empty());
    sentences
}

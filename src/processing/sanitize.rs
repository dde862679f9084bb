//! Helpers for cleaning extracted page text and normalizing text for matching.

use regex::Regex;
use std::sync::OnceLock;

fn markup_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("static markup regex"))
}

/// Clean text extracted from a document page.
///
/// Markup tags are removed, non-printable characters dropped, and whitespace runs collapsed to a
/// single space. Returns an empty string for pages with no visible text.
pub fn clean_text(text: &str) -> String {
    let without_tags = markup_tag().replace_all(text, "");
    let printable: String = without_tags
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    collapse_whitespace(&printable)
}

/// Normalize text for attribution matching: case-fold, strip punctuation, collapse whitespace.
pub fn normalize_for_match(text: &str) -> String {
    let folded: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    collapse_whitespace(&folded)
}

/// Content words of already-normalized text: distinct words longer than three characters.
pub(crate) fn content_words(normalized: &str) -> Vec<&str> {
    let mut words: Vec<&str> = Vec::new();
    for word in normalized.split_whitespace() {
        if word.chars().count() > 3 && !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_markup_and_collapses_whitespace() {
        let raw = "<p>The  mitochondria</p>\n\n is\tthe\u{0007} powerhouse ";
        assert_eq!(clean_text(raw), "The mitochondria is the powerhouse");
    }

    #[test]
    fn clean_text_returns_empty_for_blank_pages() {
        assert_eq!(clean_text(" \n\t <br/> "), "");
    }

    #[test]
    fn normalize_for_match_drops_punctuation_and_case() {
        assert_eq!(
            normalize_for_match("The Mitochondria, is   the POWERHOUSE!"),
            "the mitochondria is the powerhouse"
        );
        assert_eq!(normalize_for_match("don't"), "dont");
    }

    #[test]
    fn content_words_skip_short_and_repeated_words() {
        let words = content_words("the cell is the cell powerhouse of cells");
        assert_eq!(words, vec!["cell", "powerhouse", "cells"]);
    }
}

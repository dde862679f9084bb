//! Prompt assembly for grounded answers.

use super::index::ScoredChunk;

/// Fixed reply when the document does not contain the answer.
pub const NO_INFORMATION_ANSWER: &str = "I don't have information about that in the document.";

/// Phrases (lowercase) marking a reply as a "no information" statement.
pub const NO_INFORMATION_PHRASES: [&str; 7] = [
    "i don't have information",
    "the document doesn't contain",
    "no information about",
    "not mentioned in the document",
    "cannot find information",
    "no details about",
    "not available in the document",
];

const SHORT_CONTEXT_WORDS: usize = 300;

/// Whether `text` states that the document lacks the requested information.
pub fn is_no_information(text: &str) -> bool {
    let folded = text.to_lowercase().replace('\u{2019}', "'");
    NO_INFORMATION_PHRASES
        .iter()
        .any(|phrase| folded.contains(phrase))
}

/// Build the generation prompt from the question and retrieved chunks.
///
/// Each chunk is tagged with its page and source. The instructions restrict the model to the
/// supplied excerpts and require the fixed [`NO_INFORMATION_ANSWER`] when they do not cover
/// the question. Short contexts ask for a shorter answer.
pub fn build_prompt(query_text: &str, chunks: &[ScoredChunk<'_>]) -> String {
    let context = chunks
        .iter()
        .map(|hit| {
            format!(
                "Page {} ({}): {}",
                hit.chunk.page_number,
                hit.chunk.source,
                hit.chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let target_length = if context.split_whitespace().count() < SHORT_CONTEXT_WORDS {
        "between 50 and 150 words"
    } else {
        "between 200 and 300 words"
    };

    format!(
        "Answer the user's question using ONLY the information from the document excerpts below.
Follow these rules:
1. If the information is available in the document excerpts, provide a clear and direct answer.
2. If the information is NOT available in the document excerpts, respond ONLY with: \"{NO_INFORMATION_ANSWER}\"
3. Do not use external knowledge or make assumptions.
4. Do not mention document excerpts, sources, or page numbers in your answer.
5. Your answer MUST be {target_length}, depending on the available information.

Document excerpts:
{context}

Question: {question}

Answer:",
        question = query_text.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::index::Chunk;

    fn chunk(text: &str, page_number: u32) -> Chunk {
        Chunk {
            id: format!("id-{page_number}"),
            text: text.to_string(),
            embedding: vec![1.0],
            page_number,
            source: "bio.pdf".into(),
            char_offset: 0,
        }
    }

    #[test]
    fn prompt_tags_chunks_with_page_and_source() {
        let first = chunk("The mitochondria is the powerhouse of the cell.", 1);
        let second = chunk("Photosynthesis occurs in chloroplasts.", 2);
        let hits = vec![
            ScoredChunk {
                chunk: &first,
                score: 0.9,
            },
            ScoredChunk {
                chunk: &second,
                score: 0.4,
            },
        ];

        let prompt = build_prompt("What is the powerhouse of the cell?", &hits);

        let first_at = prompt
            .find("Page 1 (bio.pdf): The mitochondria")
            .expect("page 1 block");
        let second_at = prompt
            .find("Page 2 (bio.pdf): Photosynthesis")
            .expect("page 2 block");
        assert!(first_at < second_at);
        assert!(prompt.contains(NO_INFORMATION_ANSWER));
        assert!(prompt.contains("between 50 and 150 words"));
        let ending = "Question: What is the powerhouse of the cell?\n\nAnswer:";
        assert!(prompt.ends_with(ending));
    }

    #[test]
    fn long_context_asks_for_longer_answers() {
        let long = chunk(&"word ".repeat(400), 1);
        let hits = vec![ScoredChunk {
            chunk: &long,
            score: 1.0,
        }];
        let prompt = build_prompt("q", &hits);
        assert!(prompt.contains("between 200 and 300 words"));
    }

    #[test]
    fn no_information_detection_is_case_and_quote_insensitive() {
        assert!(is_no_information(NO_INFORMATION_ANSWER));
        assert!(is_no_information("I don\u{2019}t have information on it."));
        assert!(is_no_information("That is NOT MENTIONED IN THE DOCUMENT."));
        assert!(!is_no_information("Mitochondria produce ATP."));
    }
}

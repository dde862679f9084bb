//! Page-aware chunking with a fixed character overlap.
//!
//! Each page is split on its own so every chunk carries exact page provenance:
//!
//! - Boundaries: `semchunk-rs` proposes semantic split points (paragraphs, sentences, words)
//!   using a character counter. The proposals are mapped back onto the page text, so the core
//!   spans are contiguous and cover the page without gaps.
//! - Fallback: when a proposal cannot be located, or a span is still too long, the span is cut
//!   into character windows that prefer to break on whitespace.
//! - Overlap: every chunk after the first of a page is extended backwards by `overlap`
//!   characters so that text spanning a boundary appears intact in at least one chunk.
//!
//! Chunk text is never trimmed; dropping the overlap prefix of each chunk and concatenating
//! reproduces the page text exactly.

use semchunk_rs::Chunker;

use super::types::ChunkingError;

/// Character budgets used when splitting pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingSettings {
    /// Target size of a chunk in characters.
    pub chunk_size: usize,
    /// Characters repeated from the previous chunk of the same page.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 100,
        }
    }
}

impl ChunkingSettings {
    /// Reject budgets that cannot make progress.
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap: self.overlap,
                chunk_size: self.chunk_size,
            });
        }
        Ok(())
    }

    fn core_size(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// A chunk of page text awaiting its embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    /// Chunk text, including the overlap carried over from the previous chunk.
    pub text: String,
    /// One-based page the text was taken from.
    pub page_number: u32,
    /// Identifier of the source document.
    pub source: String,
    /// Byte offset of the chunk's first character within its page text.
    pub char_offset: usize,
}

/// Split per-page document text into overlapping chunk drafts.
///
/// Pages are numbered from one in input order. Pages holding only whitespace produce no
/// drafts; a page no longer than `chunk_size` characters produces exactly one.
///
/// A document with no text at all yields an empty `Vec`, never a single empty chunk; callers
/// decide whether that is an error (the document service reports it as malformed).
pub fn chunk_pages<P: AsRef<str>>(
    pages: &[P],
    source: &str,
    settings: &ChunkingSettings,
) -> Result<Vec<ChunkDraft>, ChunkingError> {
    settings.validate()?;
    let mut drafts = Vec::new();
    for (index, page) in pages.iter().enumerate() {
        let page_number = u32::try_from(index + 1).map_err(|_| ChunkingError::TooManyPages)?;
        drafts.extend(chunk_page(page.as_ref(), page_number, source, settings));
    }
    Ok(drafts)
}

/// Split a whole document given the byte offset at which each page starts.
///
/// `page_boundaries` must start at `0`, be non-decreasing, and fall on character boundaries
/// of `full_text`. An empty boundary list treats the text as a single page.
pub fn chunk_document(
    full_text: &str,
    page_boundaries: &[usize],
    source: &str,
    settings: &ChunkingSettings,
) -> Result<Vec<ChunkDraft>, ChunkingError> {
    if page_boundaries.is_empty() {
        return chunk_pages(&[full_text], source, settings);
    }

    let mut previous = 0usize;
    for (index, &offset) in page_boundaries.iter().enumerate() {
        let valid = offset <= full_text.len()
            && full_text.is_char_boundary(offset)
            && offset >= previous
            && (index > 0 || offset == 0);
        if !valid {
            return Err(ChunkingError::InvalidPageBoundary { offset });
        }
        previous = offset;
    }

    let pages: Vec<&str> = page_boundaries
        .iter()
        .enumerate()
        .map(|(index, &start)| {
            let end = page_boundaries
                .get(index + 1)
                .copied()
                .unwrap_or(full_text.len());
            &full_text[start..end]
        })
        .collect();
    chunk_pages(&pages, source, settings)
}

fn chunk_page(
    text: &str,
    page_number: u32,
    source: &str,
    settings: &ChunkingSettings,
) -> Vec<ChunkDraft> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let draft = |start: usize, end: usize| ChunkDraft {
        text: text[start..end].to_string(),
        page_number,
        source: source.to_string(),
        char_offset: start,
    };

    if text.chars().count() <= settings.chunk_size {
        return vec![draft(0, text.len())];
    }

    core_spans(text, settings)
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let chunk_start = if index == 0 {
                start
            } else {
                back_chars(text, start, settings.overlap)
            };
            draft(chunk_start, end)
        })
        .collect()
}

/// Contiguous, non-empty byte spans covering `text`.
fn core_spans(text: &str, settings: &ChunkingSettings) -> Vec<(usize, usize)> {
    let core = settings.core_size();
    let starts = semantic_starts(text, core).unwrap_or_else(|| {
        tracing::debug!("Semantic boundaries unavailable; using character windows");
        vec![0]
    });

    let mut spans = Vec::with_capacity(starts.len());
    for (index, &start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).copied().unwrap_or(text.len());
        if text[start..end].chars().count() > settings.chunk_size {
            spans.extend(window_spans(text, start, end, core));
        } else {
            spans.push((start, end));
        }
    }
    spans
}

fn semantic_starts(text: &str, core: usize) -> Option<Vec<usize>> {
    let chunker = Chunker::new(core, Box::new(|segment: &str| segment.chars().count()));
    let mut starts = Vec::new();
    let mut cursor = 0usize;

    for piece in chunker.chunk(text) {
        if piece.is_empty() {
            continue;
        }
        let start = cursor + text[cursor..].find(piece.as_str())?;
        starts.push(start);
        cursor = start + piece.len();
    }

    let first = starts.first_mut()?;
    *first = 0;
    Some(starts)
}

/// Cut `[start, end)` into windows of at most `core` characters, preferring whitespace breaks.
fn window_spans(text: &str, start: usize, end: usize, core: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut position = start;

    while position < end {
        let limit = advance_chars(text, position, core).min(end);
        if limit >= end {
            spans.push((position, end));
            break;
        }

        let window = &text[position..limit];
        let cut = window
            .char_indices()
            .rev()
            .find(|(offset, c)| c.is_whitespace() && *offset > window.len() / 2)
            .map(|(offset, c)| position + offset + c.len_utf8())
            .unwrap_or(limit);
        spans.push((position, cut));
        position = cut;
    }

    spans
}

fn advance_chars(text: &str, from: usize, count: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(count)
        .map(|(offset, _)| from + offset)
        .unwrap_or(text.len())
}

fn back_chars(text: &str, from: usize, count: usize) -> usize {
    if count == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(count - 1)
        .map(|(offset, _)| offset)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_page(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {i} describes topic {i} in some detail. "))
            .collect()
    }

    fn reconstruct(drafts: &[ChunkDraft]) -> String {
        let mut text = String::new();
        let mut covered = 0usize;
        for draft in drafts {
            let end = draft.char_offset + draft.text.len();
            assert!(
                draft.char_offset <= covered,
                "gap before offset {}",
                draft.char_offset
            );
            text.push_str(&draft.text[covered - draft.char_offset..]);
            covered = end;
        }
        text
    }

    #[test]
    fn short_page_yields_single_chunk() {
        let pages = vec!["The mitochondria powers the cell.".to_string()];
        let drafts = chunk_pages(&pages, "bio.pdf", &ChunkingSettings::default()).expect("chunks");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, pages[0]);
        assert_eq!(drafts[0].page_number, 1);
        assert_eq!(drafts[0].char_offset, 0);
        assert_eq!(drafts[0].source, "bio.pdf");
    }

    #[test]
    fn blank_pages_are_skipped_without_renumbering() {
        let pages = vec!["   ".to_string(), "Second page text.".to_string()];
        let drafts = chunk_pages(&pages, "doc", &ChunkingSettings::default()).expect("chunks");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].page_number, 2);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let pages: Vec<String> = Vec::new();
        let drafts = chunk_pages(&pages, "doc", &ChunkingSettings::default()).expect("chunks");
        assert!(drafts.is_empty());
    }

    #[test]
    fn long_page_is_covered_losslessly_with_overlap() {
        let page = long_page(40);
        let settings = ChunkingSettings {
            chunk_size: 200,
            overlap: 40,
        };
        let drafts = chunk_pages(&[page.as_str()], "doc", &settings).expect("chunks");

        let max_chars = settings.chunk_size + settings.overlap;
        assert!(drafts.len() > 1);
        for draft in &drafts {
            assert!(!draft.text.is_empty());
            assert!(draft.text.chars().count() <= max_chars);
            assert_eq!(draft.page_number, 1);
        }
        for pair in drafts.windows(2) {
            let previous_end = pair[0].char_offset + pair[0].text.len();
            assert!(
                pair[1].char_offset < previous_end,
                "consecutive chunks overlap"
            );
        }
        assert_eq!(reconstruct(&drafts), page);
    }

    #[test]
    fn text_without_whitespace_falls_back_to_windows() {
        let page = "x".repeat(1000);
        let settings = ChunkingSettings {
            chunk_size: 300,
            overlap: 50,
        };
        let drafts = chunk_pages(&[page.as_str()], "doc", &settings).expect("chunks");
        assert!(drafts.len() >= 4);
        assert_eq!(reconstruct(&drafts), page);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let page = "café crème brûlée ".repeat(60);
        let settings = ChunkingSettings {
            chunk_size: 120,
            overlap: 20,
        };
        let drafts = chunk_pages(&[page.as_str()], "menu", &settings).expect("chunks");
        assert!(drafts.len() > 1);
        assert_eq!(reconstruct(&drafts), page);
    }

    #[test]
    fn chunking_is_reproducible() {
        let page = long_page(30);
        let settings = ChunkingSettings {
            chunk_size: 150,
            overlap: 30,
        };
        let first = chunk_pages(&[page.as_str()], "doc", &settings).expect("chunks");
        let second = chunk_pages(&[page.as_str()], "doc", &settings).expect("chunks");
        assert_eq!(first, second);
    }

    #[test]
    fn chunk_document_assigns_pages_from_boundaries() {
        let full = "Page one text. Page two text.";
        let drafts =
            chunk_document(full, &[0, 15], "doc", &ChunkingSettings::default()).expect("chunks");
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].text, "Page one text. ");
        assert_eq!(drafts[0].page_number, 1);
        assert_eq!(drafts[1].text, "Page two text.");
        assert_eq!(drafts[1].page_number, 2);
    }

    #[test]
    fn chunk_document_rejects_unordered_boundaries() {
        let error =
            chunk_document("abcdef", &[0, 4, 2], "doc", &ChunkingSettings::default()).unwrap_err();
        assert!(matches!(
            error,
            ChunkingError::InvalidPageBoundary { offset: 2 }
        ));

        let error =
            chunk_document("abcdef", &[1], "doc", &ChunkingSettings::default()).unwrap_err();
        assert!(matches!(
            error,
            ChunkingError::InvalidPageBoundary { offset: 1 }
        ));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let pages = vec!["text".to_string()];
        let zero = ChunkingSettings {
            chunk_size: 0,
            overlap: 0,
        };
        assert!(matches!(
            chunk_pages(&pages, "doc", &zero),
            Err(ChunkingError::InvalidChunkSize)
        ));

        let wide = ChunkingSettings {
            chunk_size: 10,
            overlap: 10,
        };
        assert!(matches!(
            chunk_pages(&pages, "doc", &wide),
            Err(ChunkingError::InvalidOverlap { .. })
        ));
    }
}

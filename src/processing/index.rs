//! In-memory vector index holding one document's chunks for a session.

use super::chunking::ChunkDraft;
use super::embedder::Embedder;
use super::types::IndexError;
use sha2::{Digest, Sha256};

/// Indexed span of document text with its embedding and page provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Content-derived identifier, stable across re-ingestion of the same text.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Embedding of `text`.
    pub embedding: Vec<f32>,
    /// One-based source page.
    pub page_number: u32,
    /// Document identifier.
    pub source: String,
    /// Byte offset of the chunk within its page text.
    pub char_offset: usize,
}

/// A chunk paired with its cosine similarity to a query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    /// Matched chunk.
    pub chunk: &'a Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Chunks of the active document of one session, in source order.
#[derive(Debug, Clone)]
pub struct SessionIndex {
    session_id: String,
    embedding_model: String,
    dimension: Option<usize>,
    chunks: Vec<Chunk>,
    norms: Vec<f32>,
}

impl SessionIndex {
    /// Create an empty index; the dimension is fixed by the first insert.
    pub fn new(session_id: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            embedding_model: embedding_model.into(),
            dimension: None,
            chunks: Vec::new(),
            norms: Vec::new(),
        }
    }

    /// Owning session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Model that produced the stored embeddings.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Established vector dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embed `drafts` and replace the index content with them.
    ///
    /// On any failure the index keeps its previous content.
    pub async fn insert(
        &mut self,
        embedder: &Embedder,
        drafts: Vec<ChunkDraft>,
    ) -> Result<(), IndexError> {
        let texts = drafts.iter().map(|draft| draft.text.clone()).collect();
        let vectors = embedder.embed_texts(texts).await?;
        self.replace(drafts, vectors)
    }

    /// Replace the index content with already-embedded drafts.
    ///
    /// Every vector is validated into a private buffer before the content is swapped, so a
    /// [`IndexError::DimensionMismatch`] leaves the index unchanged.
    pub fn replace(
        &mut self,
        drafts: Vec<ChunkDraft>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), IndexError> {
        if drafts.len() != vectors.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: drafts.len(),
                actual: vectors.len(),
            });
        }

        let mut dimension = self.dimension;
        let mut chunks = Vec::with_capacity(drafts.len());
        let mut norms = Vec::with_capacity(drafts.len());
        for (draft, embedding) in drafts.into_iter().zip(vectors) {
            match dimension {
                None => dimension = Some(embedding.len()),
                Some(expected) if expected != embedding.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                Some(_) => {}
            }
            norms.push(l2_norm(&embedding));
            chunks.push(Chunk {
                id: chunk_id(&draft),
                text: draft.text,
                embedding,
                page_number: draft.page_number,
                source: draft.source,
                char_offset: draft.char_offset,
            });
        }

        self.dimension = dimension;
        self.chunks = chunks;
        self.norms = norms;
        Ok(())
    }

    /// Rank stored chunks by cosine similarity to `vector` and return the best `k`.
    ///
    /// `k` larger than the index is clamped. Equal scores keep insertion order. An empty index
    /// yields an empty result.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk<'_>>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidTopK(k));
        }
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let query_norm = l2_norm(vector);
        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .zip(&self.norms)
            .map(|(chunk, &norm)| ScoredChunk {
                chunk,
                score: cosine(vector, query_norm, &chunk.embedding, norm),
            })
            .collect();

        // `sort_by` is stable: ties stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / (a_norm * b_norm);
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn chunk_id(draft: &ChunkDraft) -> String {
    let mut hasher = Sha256::new();
    hasher.update(draft.source.as_bytes());
    hasher.update([0]);
    hasher.update(draft.page_number.to_le_bytes());
    hasher.update((draft.char_offset as u64).to_le_bytes());
    hasher.update(draft.text.as_bytes());
    hex::encode(hasher.finalize())
}

//! Core data types and error definitions for the document pipeline.

use super::chunking::ChunkingSettings;
use super::retry::CallPolicy;
use crate::embedding::EmbeddingClientError;
use crate::generation::GenerationClientError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while splitting page text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunking configured an impossible character budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would leave no room for new content.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap {
        /// Configured overlap in characters.
        overlap: usize,
        /// Configured chunk size in characters.
        chunk_size: usize,
    },
    /// Page boundaries were unordered, out of range, or split a character.
    #[error("invalid page boundary at byte offset {offset}")]
    InvalidPageBoundary {
        /// Offending boundary.
        offset: usize,
    },
    /// Page numbers no longer fit in 32 bits.
    #[error("document has too many pages")]
    TooManyPages,
}

/// Errors raised by a session index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Vector length disagrees with the index's established dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the first insert.
        expected: usize,
        /// Dimension of the rejected vector.
        actual: usize,
    },
    /// Requested result count was zero.
    #[error("top-k must be at least 1, got {0}")]
    InvalidTopK(usize),
    /// Embedder returned a different number of vectors than texts submitted.
    #[error("Embedding provider returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch {
        /// Number of chunk texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Embedding provider failed while indexing.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
}

/// Errors raised while retrieving context for a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// No document has been ingested for the session.
    #[error("no document has been ingested for this session")]
    EmptyIndex,
    /// Query text was blank.
    #[error("query text is empty")]
    EmptyQuery,
    /// Query would be embedded by a different model than the indexed chunks.
    #[error("index was built with embedding model '{indexed}', query uses '{query}'")]
    EmbeddingModelMismatch {
        /// Model used at ingestion.
        indexed: String,
        /// Model configured for queries.
        query: String,
    },
    /// Embedding provider failed for the query text.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the query.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
    /// Index rejected the query.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Boundary error for the core-exposed operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Query issued before any document was ingested.
    #[error("no document has been ingested for session '{0}'")]
    EmptyIndex(String),
    /// Embedding shapes disagree; a model or configuration mismatch.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Established dimension.
        expected: usize,
        /// Offending dimension.
        actual: usize,
    },
    /// Embedding call failed after the retry budget was spent.
    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),
    /// Generation call failed after the retry budget was spent.
    #[error("Generation failed: {0}")]
    GenerationFailure(String),
    /// Document contained no extractable text.
    #[error("document contains no extractable text")]
    MalformedDocument,
    /// Query text was blank.
    #[error("query text is empty")]
    EmptyQuery,
    /// Session index was built with a different embedding model.
    #[error("index was built with embedding model '{indexed}', query uses '{query}'")]
    EmbeddingModelMismatch {
        /// Model used at ingestion.
        indexed: String,
        /// Model configured for queries.
        query: String,
    },
    /// Session was cleared or re-uploaded while this ingestion ran.
    #[error("ingestion for session '{0}' was superseded")]
    IngestionSuperseded(String),
    /// Requested result count was zero.
    #[error("top-k must be at least 1, got {0}")]
    InvalidTopK(usize),
    /// Chunking settings or page boundaries were invalid.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
}

impl ServiceError {
    /// Text suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyIndex(_) => "No documents uploaded. Please upload documents first.".into(),
            Self::MalformedDocument => {
                "Could not process document: no readable text was found.".into()
            }
            Self::EmptyQuery => "Please enter a question.".into(),
            Self::EmbeddingFailure(_) | Self::GenerationFailure(_) => {
                "The language model is currently unavailable. Please try again shortly.".into()
            }
            Self::IngestionSuperseded(_) => {
                "This upload was replaced by a newer one or the session was cleared.".into()
            }
            Self::InvalidTopK(k) => format!("Result count must be at least 1 (got {k})."),
            Self::DimensionMismatch { .. } | Self::EmbeddingModelMismatch { .. } => {
                "The embedding configuration changed; please re-upload the document.".into()
            }
            Self::Chunking(_) => "Could not process document.".into(),
        }
    }
}

impl From<IndexError> for ServiceError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            IndexError::InvalidTopK(k) => Self::InvalidTopK(k),
            IndexError::EmbeddingCountMismatch { .. } => {
                Self::EmbeddingFailure(error.to_string())
            }
            IndexError::Embedding(inner) => Self::EmbeddingFailure(inner.to_string()),
        }
    }
}

impl ServiceError {
    pub(crate) fn from_retrieval(session_id: &str, error: RetrievalError) -> Self {
        match error {
            RetrievalError::EmptyIndex => Self::EmptyIndex(session_id.to_string()),
            RetrievalError::EmptyQuery => Self::EmptyQuery,
            RetrievalError::EmbeddingModelMismatch { indexed, query } => {
                Self::EmbeddingModelMismatch { indexed, query }
            }
            RetrievalError::Embedding(inner) => Self::EmbeddingFailure(inner.to_string()),
            RetrievalError::EmptyEmbedding => Self::EmbeddingFailure(error.to_string()),
            RetrievalError::Index(inner) => inner.into(),
        }
    }
}

impl From<GenerationClientError> for ServiceError {
    fn from(error: GenerationClientError) -> Self {
        Self::GenerationFailure(error.to_string())
    }
}

/// Errors raised while assembling a [`crate::processing::DocumentService`] from configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Embedding client could not be constructed.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Generation client could not be constructed.
    #[error("Failed to initialize generation client: {0}")]
    Generation(#[from] GenerationClientError),
    /// Chunk budgets are unusable.
    #[error("Invalid chunking settings: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Tunables for the document service, usually derived from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Chunk budgets.
    pub chunking: ChunkingSettings,
    /// Default number of chunks retrieved per question.
    pub top_k: usize,
    /// Chunks scoring below this similarity are not used as context.
    pub min_similarity: f32,
    /// Timeout and retries for embedding calls.
    pub embedding_policy: CallPolicy,
    /// Timeout and retries for generation calls.
    pub generation_policy: CallPolicy,
    /// Texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Embedding requests in flight during ingestion.
    pub embedding_concurrency: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingSettings::default(),
            top_k: 3,
            min_similarity: 0.3,
            embedding_policy: CallPolicy::new(Duration::from_secs(30), 3),
            generation_policy: CallPolicy::new(Duration::from_secs(120), 3),
            embedding_batch_size: 16,
            embedding_concurrency: 4,
        }
    }
}

/// Lifecycle state of a session's document index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No document ingested.
    Empty,
    /// A document is being ingested; a previously published document may still be served.
    Ingesting,
    /// A complete document index is published.
    Ready,
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// Session the document was published to.
    pub session_id: String,
    /// Document identifier.
    pub source: String,
    /// Chunks indexed.
    pub chunk_count: usize,
    /// Pages supplied by the loader, including blank ones.
    pub page_count: usize,
}

/// A claim segment of a generated answer with its attributed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerSegment {
    /// Segment text as it appeared in the raw answer.
    pub text: String,
    /// Best-matching page, or `None` for "no information" statements.
    ///
    /// Attribution is a best-effort text match, not a guarantee.
    #[serde(rename = "page")]
    pub page_number: Option<u32>,
}

/// A context chunk that was supplied to the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDetail {
    /// Document identifier.
    pub source: String,
    /// Page the chunk came from.
    pub page: u32,
    /// Cosine similarity between the question and the chunk.
    pub similarity: f32,
}

/// Grounded answer returned by [`crate::processing::DocumentApi::answer_query`].
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    /// Answer split into page-attributed segments, in answer order.
    pub answer_segments: Vec<AnswerSegment>,
    /// Generator output as returned (trimmed).
    pub raw_answer: String,
    /// `false` when the answer states the document lacks the information.
    pub has_answer: bool,
    /// Context chunks used; empty when `has_answer` is false.
    pub sources: Vec<SourceDetail>,
}

/// Retrieved chunk returned by context search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Chunk text.
    pub text: String,
    /// Page the chunk came from.
    pub page: u32,
    /// Document identifier.
    pub source: String,
    /// Cosine similarity with the query.
    pub score: f32,
}

/// Welcome text and suggested questions for an ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOverview {
    /// Short welcome summary of the document.
    pub summary: String,
    /// Suggested questions, each ending with `?`.
    pub questions: Vec<String>,
    /// `true` when part of the overview came from fixed fallbacks.
    pub used_fallback: bool,
}

/// Observable state of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Session identifier.
    pub session_id: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// Chunks in the published index.
    pub chunk_count: usize,
    /// Pages in the published document.
    pub page_count: usize,
    /// Published document identifier, if any.
    pub source: Option<String>,
}

/// Reachability snapshot of the model runtime and registry.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Generation provider answered a reachability check.
    pub generator_reachable: bool,
    /// Embedding provider answered a reachability check.
    pub embedder_reachable: bool,
    /// Configured embedding model.
    pub embedding_model: String,
    /// Configured generation model.
    pub generation_model: String,
    /// Sessions currently registered.
    pub active_sessions: usize,
}

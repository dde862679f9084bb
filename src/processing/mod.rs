//! Document pipeline: cleaning, chunking, session indexing, retrieval, and answer grounding.

pub mod chunking;
mod embedder;
pub mod grounding;
pub mod index;
pub mod overview;
pub mod prompt;
pub mod registry;
pub mod retriever;
mod retry;
pub mod sanitize;
mod service;
pub mod types;

pub use chunking::{ChunkDraft, ChunkingSettings, chunk_document, chunk_pages};
pub use embedder::Embedder;
pub use grounding::{PageMap, ground_answer};
pub use index::{Chunk, ScoredChunk, SessionIndex};
pub use prompt::{NO_INFORMATION_ANSWER, build_prompt, is_no_information};
pub use registry::{DocumentSnapshot, IngestTicket, SessionRegistry};
pub use retriever::{DEFAULT_TOP_K, retrieve};
pub use retry::{CallPolicy, ModelCallError};
pub use service::{DocumentApi, DocumentService};
pub use types::{
    AnswerOutcome, AnswerSegment, ChunkingError, DocumentOverview, HealthSnapshot, IndexError,
    IngestOutcome, RetrievalError, SearchHit, ServiceError, ServiceSettings, SessionState,
    SessionStatus, SourceDetail, StartupError,
};

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and answering activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_count: AtomicU64,
    queries_answered: AtomicU64,
    queries_without_answer: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a published document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
    }

    /// Record a completed query and whether the answer carried grounded content.
    pub fn record_query(&self, has_answer: bool) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
        if !has_answer {
            self.queries_without_answer.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_chunk_count.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_count: (last > 0).then_some(last),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            queries_without_answer: self.queries_without_answer.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents published since startup.
    pub documents_ingested: u64,
    /// Total chunk count produced across all published documents.
    pub chunks_indexed: u64,
    /// Chunk count of the most recently published document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
    /// Number of queries that completed, grounded or not.
    pub queries_answered: u64,
    /// Queries that resolved to an explicit no-information answer.
    pub queries_without_answer: u64,
}

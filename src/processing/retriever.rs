//! Query-time retrieval against a session index.

use super::embedder::Embedder;
use super::index::{ScoredChunk, SessionIndex};
use super::types::{IndexError, RetrievalError};

/// Chunks retrieved per question when the caller does not choose.
pub const DEFAULT_TOP_K: usize = 3;

/// Embed `query_text` and return the `k` most similar chunks of `index`, best first.
///
/// An empty index fails with [`RetrievalError::EmptyIndex`] before any embedding call. The
/// query is embedded with the same model that built the index; a different model is refused
/// rather than silently comparing vectors from two spaces.
pub async fn retrieve<'a>(
    embedder: &Embedder,
    index: &'a SessionIndex,
    query_text: &str,
    k: usize,
) -> Result<Vec<ScoredChunk<'a>>, RetrievalError> {
    if index.is_empty() {
        return Err(RetrievalError::EmptyIndex);
    }
    let query = query_text.trim();
    if query.is_empty() {
        return Err(RetrievalError::EmptyQuery);
    }
    if k == 0 {
        return Err(IndexError::InvalidTopK(k).into());
    }
    if embedder.model() != index.embedding_model() {
        return Err(RetrievalError::EmbeddingModelMismatch {
            indexed: index.embedding_model().to_string(),
            query: embedder.model().to_string(),
        });
    }

    let vector = embedder.embed_query(query).await?;
    if vector.is_empty() {
        return Err(RetrievalError::EmptyEmbedding);
    }
    let results = index.query(&vector, k)?;

    tracing::debug!(
        session_id = index.session_id(),
        k,
        hits = results.len(),
        best_score = results.first().map(|hit| hit.score),
        "Retrieved context"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClient, EmbeddingClientError, HashEmbeddingClient};
    use crate::processing::chunking::ChunkDraft;
    use crate::processing::retry::CallPolicy;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingClient {
        inner: HashEmbeddingClient,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingClient {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.generate_embeddings(texts).await
        }
    }

    fn policy() -> CallPolicy {
        CallPolicy::new(Duration::from_secs(1), 1)
    }

    fn hash_embedder(dimension: usize) -> Embedder {
        Embedder::new(Arc::new(HashEmbeddingClient::new(dimension)), policy())
    }

    async fn biology_index(embedder: &Embedder) -> SessionIndex {
        let drafts = vec![
            ChunkDraft {
                text: "The mitochondria is the powerhouse of the cell.".into(),
                page_number: 1,
                source: "bio.pdf".into(),
                char_offset: 0,
            },
            ChunkDraft {
                text: "Photosynthesis occurs in chloroplasts.".into(),
                page_number: 2,
                source: "bio.pdf".into(),
                char_offset: 0,
            },
        ];
        let mut index = SessionIndex::new("s", embedder.model());
        index.insert(embedder, drafts).await.expect("insert");
        index
    }

    #[tokio::test]
    async fn relevant_page_ranks_first() {
        let embedder = hash_embedder(256);
        let index = biology_index(&embedder).await;

        let results = retrieve(&embedder, &index, "What is the powerhouse of the cell?", 3)
            .await
            .expect("results");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.page_number, 1);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn empty_index_fails_without_embedding() {
        let client = Arc::new(CountingClient {
            inner: HashEmbeddingClient::new(16),
            calls: AtomicUsize::new(0),
        });
        let embedder = Embedder::new(client.clone(), policy());
        let index = SessionIndex::new("s", embedder.model());

        let error = retrieve(&embedder, &index, "anything?", DEFAULT_TOP_K)
            .await
            .unwrap_err();

        assert!(matches!(error, RetrievalError::EmptyIndex));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_queries_are_rejected() {
        let embedder = hash_embedder(64);
        let index = biology_index(&embedder).await;
        let error = retrieve(&embedder, &index, "   ", 3).await.unwrap_err();
        assert!(matches!(error, RetrievalError::EmptyQuery));
    }

    #[tokio::test]
    async fn mixing_embedding_models_is_refused() {
        let ingest = hash_embedder(64);
        let index = biology_index(&ingest).await;
        let other = hash_embedder(128);

        let error = retrieve(&other, &index, "cell", 3).await.unwrap_err();

        assert!(matches!(
            error,
            RetrievalError::EmbeddingModelMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn zero_k_is_rejected() {
        let embedder = hash_embedder(64);
        let index = biology_index(&embedder).await;
        let error = retrieve(&embedder, &index, "cell", 0).await.unwrap_err();
        assert!(matches!(
            error,
            RetrievalError::Index(IndexError::InvalidTopK(0))
        ));
    }
}

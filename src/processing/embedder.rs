//! Policy-wrapped embedding calls shared by ingestion and querying.

use super::retry::{CallPolicy, REACHABILITY_TIMEOUT, call_with_policy};
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use futures_util::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;

/// Embedding capability with timeouts, bounded retries, and batched fan-out.
///
/// One `Embedder` is used for both ingestion and queries so a session's chunks and questions
/// always share an embedding space.
#[derive(Clone)]
pub struct Embedder {
    client: Arc<dyn EmbeddingClient>,
    policy: CallPolicy,
    batch_size: usize,
    concurrency: usize,
}

impl Embedder {
    /// Wrap `client` with `policy`, sending 16 texts per request with 4 requests in flight.
    pub fn new(client: Arc<dyn EmbeddingClient>, policy: CallPolicy) -> Self {
        Self {
            client,
            policy,
            batch_size: 16,
            concurrency: 4,
        }
    }

    /// Override batching; zero values are raised to one.
    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// Model producing the vectors.
    pub fn model(&self) -> &str {
        self.client.model_name()
    }

    /// Single unretried call reporting whether the provider returns a vector.
    pub async fn is_reachable(&self) -> bool {
        let timeout = self.policy.timeout.min(REACHABILITY_TIMEOUT);
        let call = self.client.generate_embeddings(vec!["health check".into()]);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(vectors)) => vectors.first().is_some_and(|vector| !vector.is_empty()),
            Ok(Err(error)) => {
                tracing::debug!(error = %error, "Embedding reachability check failed");
                false
            }
            Err(_) => false,
        }
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingClientError::InvalidResponse("no vector for query".into()))
    }

    /// Embed `texts`, returning vectors in input order.
    ///
    /// Batches run concurrently, but results are reassembled in submission order so that
    /// insertion order (and therefore tie-breaking) follows the source document.
    pub async fn embed_texts(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        tracing::debug!(
            model = self.model(),
            texts = texts.len(),
            batches = batches.len(),
            concurrency = self.concurrency,
            "Embedding chunk texts"
        );

        let per_batch: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| self.embed_batch(batch))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(per_batch.into_iter().flatten().collect())
    }

    async fn embed_batch(&self, batch: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = batch.len();
        let vectors = call_with_policy(&self.policy, "embed", || {
            self.client.generate_embeddings(batch.clone())
        })
        .await?;
        if vectors.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "received {} vectors for {expected} texts",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

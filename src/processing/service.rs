//! Document service coordinating ingestion, retrieval, generation, and attribution.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    generation::{GenerationClient, get_generation_client},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        chunking::{ChunkDraft, chunk_pages},
        embedder::Embedder,
        grounding::{PageMap, ground_answer},
        index::SessionIndex,
        overview::build_overview,
        prompt::{NO_INFORMATION_ANSWER, build_prompt, is_no_information},
        registry::{DocumentSnapshot, SessionRegistry},
        retriever::retrieve,
        retry::{REACHABILITY_TIMEOUT, call_with_policy},
        sanitize::clean_text,
        types::{
            AnswerOutcome, AnswerSegment, DocumentOverview, HealthSnapshot, IngestOutcome,
            SearchHit, ServiceError, ServiceSettings, SessionStatus, SourceDetail,
            StartupError,
        },
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Owns the session registry and the model handles shared by every surface.
///
/// Construct once near process start and share it through an `Arc`. Sessions are independent;
/// each holds at most one published document, replaced atomically on re-upload.
pub struct DocumentService {
    settings: ServiceSettings,
    embedder: Embedder,
    generator: Arc<dyn GenerationClient>,
    registry: SessionRegistry,
    metrics: Arc<ServiceMetrics>,
}

/// Operations consumed by external surfaces (HTTP, CLI).
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Register a new empty session and return its id.
    async fn create_session(&self) -> String;

    /// Clean, chunk, embed, and publish a document, replacing the session's previous one.
    async fn ingest_document(
        &self,
        session_id: &str,
        pages: Vec<String>,
        source: &str,
    ) -> Result<IngestOutcome, ServiceError>;

    /// Answer a question from the session's document with page-attributed segments.
    async fn answer_query(
        &self,
        session_id: &str,
        query_text: &str,
    ) -> Result<AnswerOutcome, ServiceError>;

    /// Return the chunks most similar to `query_text` without generating an answer.
    async fn search_document(
        &self,
        session_id: &str,
        query_text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SearchHit>, ServiceError>;

    /// Welcome summary and up to `count` suggested questions for the session's document.
    async fn document_overview(
        &self,
        session_id: &str,
        count: usize,
    ) -> Result<DocumentOverview, ServiceError>;

    /// Drop the session's document and discard in-flight ingestion. Returns whether it existed.
    async fn clear_session(&self, session_id: &str) -> bool;

    /// Lifecycle state and document summary of a session.
    async fn session_status(&self, session_id: &str) -> SessionStatus;

    /// Model reachability and registry size.
    async fn health(&self) -> HealthSnapshot;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentService {
    /// Assemble a service from explicit settings and model clients.
    pub fn new(
        settings: ServiceSettings,
        embedding_client: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        let batch_size = settings.embedding_batch_size;
        let embedder = Embedder::new(embedding_client, settings.embedding_policy)
            .with_batching(batch_size, settings.embedding_concurrency);
        Self {
            settings,
            embedder,
            generator,
            registry: SessionRegistry::new(),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Build the service and its model clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let settings = config.service_settings();
        settings.chunking.validate()?;
        tracing::info!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            "Initializing embedding client"
        );
        let embedding_client = get_embedding_client(config)?;
        tracing::info!(model = %config.generation_model, "Initializing generation client");
        let generator = get_generation_client(config)?;
        Ok(Self::new(settings, embedding_client, generator))
    }

    /// Settings in effect.
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    async fn build_snapshot(
        &self,
        session_id: &str,
        pages: &[String],
        drafts: Vec<ChunkDraft>,
        source: &str,
    ) -> Result<DocumentSnapshot, ServiceError> {
        // Each upload sizes its own index.
        let mut index = SessionIndex::new(session_id, self.embedder.model());
        index.insert(&self.embedder, drafts).await?;

        Ok(DocumentSnapshot {
            index,
            page_map: PageMap::from_page_texts(pages),
            page_count: pages.len(),
            source: source.to_string(),
        })
    }

    fn no_information(&self) -> AnswerOutcome {
        self.metrics.record_query(false);
        AnswerOutcome {
            answer_segments: vec![AnswerSegment {
                text: NO_INFORMATION_ANSWER.to_string(),
                page_number: None,
            }],
            raw_answer: NO_INFORMATION_ANSWER.to_string(),
            has_answer: false,
            sources: Vec::new(),
        }
    }

    async fn published(&self, session_id: &str) -> Result<Arc<DocumentSnapshot>, ServiceError> {
        self.registry
            .snapshot(session_id)
            .await
            .ok_or_else(|| ServiceError::EmptyIndex(session_id.to_string()))
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn create_session(&self) -> String {
        self.registry.create_session().await
    }

    async fn ingest_document(
        &self,
        session_id: &str,
        pages: Vec<String>,
        source: &str,
    ) -> Result<IngestOutcome, ServiceError> {
        tracing::info!(
            session_id,
            source,
            pages = pages.len(),
            "Ingesting document"
        );
        let cleaned: Vec<String> = pages.iter().map(|page| clean_text(page)).collect();
        if cleaned.iter().all(String::is_empty) {
            tracing::warn!(session_id, source, "Document has no extractable text");
            return Err(ServiceError::MalformedDocument);
        }
        let drafts = chunk_pages(&cleaned, source, &self.settings.chunking)?;

        let ticket = self.registry.begin_ingest(session_id).await;
        let built = self
            .build_snapshot(session_id, &cleaned, drafts, source)
            .await;
        let snapshot = match built {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::error!(session_id, error = %error, "Ingestion failed");
                self.registry.abort_ingest(&ticket).await;
                return Err(error);
            }
        };

        let chunk_count = snapshot.index.len();
        let page_count = snapshot.page_count;
        if !self.registry.publish(&ticket, Arc::new(snapshot)).await {
            return Err(ServiceError::IngestionSuperseded(session_id.to_string()));
        }

        self.metrics.record_document(chunk_count as u64);
        tracing::info!(
            session_id,
            source,
            chunks = chunk_count,
            pages = page_count,
            "Document published"
        );
        Ok(IngestOutcome {
            session_id: session_id.to_string(),
            source: source.to_string(),
            chunk_count,
            page_count,
        })
    }

    async fn answer_query(
        &self,
        session_id: &str,
        query_text: &str,
    ) -> Result<AnswerOutcome, ServiceError> {
        let document = self.published(session_id).await?;
        let top_k = self.settings.top_k;
        let hits = retrieve(&self.embedder, &document.index, query_text, top_k)
            .await
            .map_err(|error| ServiceError::from_retrieval(session_id, error))?;

        let context: Vec<_> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.settings.min_similarity)
            .collect();
        if context.is_empty() {
            tracing::info!(
                session_id,
                min_similarity = self.settings.min_similarity,
                "No chunk passed the relevance floor; skipping generation"
            );
            return Ok(self.no_information());
        }

        let prompt = build_prompt(query_text, &context);
        let raw = call_with_policy(&self.settings.generation_policy, "generate", || {
            self.generator.generate(&prompt)
        })
        .await
        .map_err(|error| {
            tracing::error!(session_id, error = %error, "Answer generation failed");
            ServiceError::from(error)
        })?;

        let raw_answer = match raw.trim() {
            "" => NO_INFORMATION_ANSWER.to_string(),
            trimmed => trimmed.to_string(),
        };
        let has_answer = !is_no_information(&raw_answer);
        let answer_segments = ground_answer(&raw_answer, &document.page_map, document.page_count);
        let sources = if has_answer {
            context
                .iter()
                .map(|hit| SourceDetail {
                    source: hit.chunk.source.clone(),
                    page: hit.chunk.page_number,
                    similarity: hit.score,
                })
                .collect()
        } else {
            Vec::new()
        };

        self.metrics.record_query(has_answer);
        tracing::info!(
            session_id,
            has_answer,
            segments = answer_segments.len(),
            context_chunks = context.len(),
            "Answered query"
        );
        Ok(AnswerOutcome {
            answer_segments,
            raw_answer,
            has_answer,
            sources,
        })
    }

    async fn search_document(
        &self,
        session_id: &str,
        query_text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let document = self.published(session_id).await?;
        let k = k.unwrap_or(self.settings.top_k);
        let hits = retrieve(&self.embedder, &document.index, query_text, k)
            .await
            .map_err(|error| ServiceError::from_retrieval(session_id, error))?;

        let results = hits
            .into_iter()
            .map(|hit| SearchHit {
                text: hit.chunk.text.clone(),
                page: hit.chunk.page_number,
                source: hit.chunk.source.clone(),
                score: hit.score,
            })
            .collect();
        Ok(results)
    }

    async fn document_overview(
        &self,
        session_id: &str,
        count: usize,
    ) -> Result<DocumentOverview, ServiceError> {
        let document = self.published(session_id).await?;
        let overview = build_overview(
            self.generator.as_ref(),
            &self.settings.generation_policy,
            document.index.chunks(),
            &document.source,
            count,
        )
        .await;
        Ok(overview)
    }

    async fn clear_session(&self, session_id: &str) -> bool {
        let existed = self.registry.clear(session_id).await;
        tracing::info!(session_id, existed, "Session cleared");
        existed
    }

    async fn session_status(&self, session_id: &str) -> SessionStatus {
        let (state, document) = self.registry.status(session_id).await;
        SessionStatus {
            session_id: session_id.to_string(),
            state,
            chunk_count: document.as_ref().map_or(0, |doc| doc.index.len()),
            page_count: document.as_ref().map_or(0, |doc| doc.page_count),
            source: document.map(|doc| doc.source.clone()),
        }
    }

    async fn health(&self) -> HealthSnapshot {
        let generator_check = async {
            tokio::time::timeout(REACHABILITY_TIMEOUT, self.generator.is_reachable())
                .await
                .unwrap_or(false)
        };
        let (generator_reachable, embedder_reachable) =
            tokio::join!(generator_check, self.embedder.is_reachable());
        HealthSnapshot {
            generator_reachable,
            embedder_reachable,
            embedding_model: self.embedder.model().to_string(),
            generation_model: self.generator.model_name().to_string(),
            active_sessions: self.registry.active_sessions().await,
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl SessionStatus {
    /// Whether a document is published for the session.
    pub fn has_document(&self) -> bool {
        self.source.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClientError, HashEmbeddingClient};
    use crate::generation::GenerationClientError;
    use crate::processing::retry::CallPolicy;
    use crate::processing::types::SessionState;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedGenerator {
        reply: Mutex<Result<String, GenerationClientError>>,
        calls: AtomicUsize,
    }

    impl FixedGenerator {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Ok(reply.to_string())),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Err(GenerationClientError::GenerationFailed("boom".into()))),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationClient for FixedGenerator {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, GenerationClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.reply.lock().expect("lock") {
                Ok(text) => Ok(text.clone()),
                Err(error) => Err(GenerationClientError::GenerationFailed(error.to_string())),
            }
        }
    }

    /// Hash embeddings that can be switched to fail.
    struct SwitchableEmbedder {
        inner: HashEmbeddingClient,
        failing: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingClient for SwitchableEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EmbeddingClientError::GenerationFailed("missing".into()));
            }
            self.inner.generate_embeddings(texts).await
        }
    }

    /// Hash embeddings whose dimension can change between uploads.
    struct ResizableEmbedder {
        dimension: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for ResizableEmbedder {
        fn model_name(&self) -> &str {
            "resizable"
        }

        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            HashEmbeddingClient::new(self.dimension.load(Ordering::SeqCst))
                .generate_embeddings(texts)
                .await
        }
    }

    /// Generator whose reachability check never completes.
    struct StalledGenerator;

    #[async_trait]
    impl GenerationClient for StalledGenerator {
        fn model_name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, GenerationClientError> {
            std::future::pending().await
        }

        async fn is_reachable(&self) -> bool {
            std::future::pending().await
        }
    }

    fn settings() -> ServiceSettings {
        let policy = CallPolicy::new(Duration::from_secs(1), 1);
        ServiceSettings {
            embedding_policy: policy,
            generation_policy: policy,
            ..ServiceSettings::default()
        }
    }

    fn service(generator: Arc<FixedGenerator>) -> (DocumentService, Arc<SwitchableEmbedder>) {
        let embedding = Arc::new(SwitchableEmbedder {
            inner: HashEmbeddingClient::new(256),
            failing: AtomicBool::new(false),
        });
        (
            DocumentService::new(settings(), embedding.clone(), generator),
            embedding,
        )
    }

    fn biology_pages() -> Vec<String> {
        vec![
            "The mitochondria is the powerhouse of the cell.".into(),
            "Photosynthesis occurs in chloroplasts.".into(),
        ]
    }

    #[tokio::test]
    async fn blank_documents_are_malformed() {
        let (service, _) = service(FixedGenerator::replying("unused"));
        let error = service
            .ingest_document("s", vec!["  ".into(), "<br/>".into()], "blank.pdf")
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::MalformedDocument));
        assert_eq!(service.session_status("s").await.state, SessionState::Empty);
    }

    #[tokio::test]
    async fn failed_reingestion_keeps_previous_document() {
        let (service, embedding) = service(FixedGenerator::replying("unused"));
        service
            .ingest_document("s", biology_pages(), "a.pdf")
            .await
            .expect("first ingest");

        embedding.failing.store(true, Ordering::SeqCst);
        let error = service
            .ingest_document("s", vec!["Other text.".into()], "b.pdf")
            .await
            .unwrap_err();

        assert!(matches!(error, ServiceError::EmbeddingFailure(_)));
        let status = service.session_status("s").await;
        assert_eq!(status.state, SessionState::Ready);
        assert_eq!(status.source.as_deref(), Some("a.pdf"));
    }

    #[tokio::test]
    async fn reingestion_may_change_embedding_dimension() {
        let embedding = Arc::new(ResizableEmbedder {
            dimension: AtomicUsize::new(8),
        });
        let service = DocumentService::new(
            settings(),
            embedding.clone(),
            FixedGenerator::replying("unused"),
        );
        service
            .ingest_document("s", biology_pages(), "a.pdf")
            .await
            .expect("first ingest");

        embedding.dimension.store(16, Ordering::SeqCst);
        service
            .ingest_document("s", biology_pages(), "b.pdf")
            .await
            .expect("re-ingest with wider vectors");

        let hits = service
            .search_document("s", "powerhouse of the cell", Some(1))
            .await
            .expect("search");
        assert_eq!(hits[0].source, "b.pdf");
        let status = service.session_status("s").await;
        assert_eq!(status.state, SessionState::Ready);
        assert_eq!(status.source.as_deref(), Some("b.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn health_gives_up_on_stalled_generator() {
        let embedding = Arc::new(HashEmbeddingClient::new(8));
        let service = DocumentService::new(settings(), embedding, Arc::new(StalledGenerator));

        let started = tokio::time::Instant::now();
        let health = service.health().await;

        assert!(!health.generator_reachable);
        assert!(health.embedder_reachable);
        assert!(started.elapsed() < REACHABILITY_TIMEOUT * 2);
    }

    #[tokio::test]
    async fn irrelevant_questions_skip_generation() {
        let generator = FixedGenerator::replying("should not be used");
        let (service, _) = service(generator.clone());
        service
            .ingest_document("s", biology_pages(), "bio.pdf")
            .await
            .expect("ingest");

        let outcome = service
            .answer_query("s", "Quarterly revenue forecast spreadsheet")
            .await
            .expect("answer");

        assert!(!outcome.has_answer);
        assert_eq!(outcome.raw_answer, NO_INFORMATION_ANSWER);
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.answer_segments[0].page_number, None);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.metrics_snapshot().queries_without_answer, 1);
    }

    #[tokio::test]
    async fn empty_generation_becomes_no_information() {
        let (service, _) = service(FixedGenerator::replying("   "));
        service
            .ingest_document("s", biology_pages(), "bio.pdf")
            .await
            .expect("ingest");

        let outcome = service
            .answer_query("s", "What is the powerhouse of the cell?")
            .await
            .expect("answer");

        assert_eq!(outcome.raw_answer, NO_INFORMATION_ANSWER);
        assert!(!outcome.has_answer);
        assert!(outcome.sources.is_empty());
    }

    #[tokio::test]
    async fn generation_failures_are_typed() {
        let (service, _) = service(FixedGenerator::failing());
        service
            .ingest_document("s", biology_pages(), "bio.pdf")
            .await
            .expect("ingest");

        let error = service
            .answer_query("s", "What is the powerhouse of the cell?")
            .await
            .unwrap_err();

        assert!(matches!(error, ServiceError::GenerationFailure(_)));
    }

    #[tokio::test]
    async fn grounded_answers_carry_source_details() {
        let generator = FixedGenerator::replying("The mitochondria is the powerhouse of the cell.");
        let (service, _) = service(generator);
        service
            .ingest_document("s", biology_pages(), "bio.pdf")
            .await
            .expect("ingest");

        let outcome = service
            .answer_query("s", "What is the powerhouse of the cell?")
            .await
            .expect("answer");

        assert!(outcome.has_answer);
        assert_eq!(outcome.answer_segments[0].page_number, Some(1));
        assert_eq!(outcome.sources[0].page, 1);
        assert_eq!(outcome.sources[0].source, "bio.pdf");
        assert_eq!(service.metrics_snapshot().queries_answered, 1);
    }
}

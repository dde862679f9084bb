//! Session registry owning the published document index of every session.
//!
//! Ingestion never mutates a published index. A new [`DocumentSnapshot`] is built off to the
//! side and swapped in with a single assignment, so readers see either the previous complete
//! document or the new one. Each ingestion holds an [`IngestTicket`]; starting another
//! ingestion or clearing the session invalidates older tickets, and their results are dropped.

use super::grounding::PageMap;
use super::index::SessionIndex;
use super::types::SessionState;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Everything needed to answer questions about one ingested document.
#[derive(Debug)]
pub struct DocumentSnapshot {
    /// Embedded chunks.
    pub index: SessionIndex,
    /// Normalized page text used for answer attribution.
    pub page_map: PageMap,
    /// Pages supplied by the loader.
    pub page_count: usize,
    /// Document identifier.
    pub source: String,
}

/// Proof of an in-flight ingestion; only the newest ticket of a session may publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTicket {
    session_id: String,
    generation: u64,
}

impl IngestTicket {
    /// Session being ingested.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    current_generation: Option<u64>,
    ingesting: bool,
    document: Option<Arc<DocumentSnapshot>>,
}

impl SessionSlot {
    fn state(&self) -> SessionState {
        if self.ingesting {
            SessionState::Ingesting
        } else if self.document.is_some() {
            SessionState::Ready
        } else {
            SessionState::Empty
        }
    }
}

/// Process-wide map from session id to its published document.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new empty session under a fresh UUID.
    pub async fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), SessionSlot::default());
        tracing::debug!(session_id = %session_id, "Session created");
        session_id
    }

    /// Mark `session_id` as ingesting and invalidate any older ticket.
    ///
    /// Unknown sessions are registered on the fly.
    pub async fn begin_ingest(&self, session_id: &str) -> IngestTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut sessions = self.sessions.write().await;
        let slot = sessions.entry(session_id.to_string()).or_default();
        slot.current_generation = Some(generation);
        slot.ingesting = true;
        IngestTicket {
            session_id: session_id.to_string(),
            generation,
        }
    }

    /// Publish `snapshot` if `ticket` is still the session's newest ingestion.
    ///
    /// Returns `false` (and drops the snapshot) when the session was cleared or a newer
    /// ingestion started after the ticket was issued.
    pub async fn publish(&self, ticket: &IngestTicket, snapshot: Arc<DocumentSnapshot>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&ticket.session_id) {
            Some(slot) if slot.current_generation == Some(ticket.generation) => {
                slot.document = Some(snapshot);
                slot.ingesting = false;
                slot.current_generation = None;
                true
            }
            _ => {
                tracing::info!(
                    session_id = %ticket.session_id,
                    generation = ticket.generation,
                    "Discarding superseded ingestion"
                );
                false
            }
        }
    }

    /// End a failed ingestion; any previously published document stays active.
    pub async fn abort_ingest(&self, ticket: &IngestTicket) {
        let mut sessions = self.sessions.write().await;
        if let Some(slot) = sessions.get_mut(&ticket.session_id) {
            if slot.current_generation == Some(ticket.generation) {
                slot.ingesting = false;
                slot.current_generation = None;
            }
        }
    }

    /// Currently published document of `session_id`.
    pub async fn snapshot(&self, session_id: &str) -> Option<Arc<DocumentSnapshot>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|slot| slot.document.clone())
    }

    /// Lifecycle state of `session_id`; unknown sessions are `Empty`.
    pub async fn state(&self, session_id: &str) -> SessionState {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map_or(SessionState::Empty, SessionSlot::state)
    }

    /// State and published document of `session_id`, read under one lock.
    pub async fn status(&self, session_id: &str) -> (SessionState, Option<Arc<DocumentSnapshot>>) {
        match self.sessions.read().await.get(session_id) {
            Some(slot) => (slot.state(), slot.document.clone()),
            None => (SessionState::Empty, None),
        }
    }

    /// Drop the session and invalidate in-flight ingestions. Returns whether it existed.
    pub async fn clear(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Number of registered sessions.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

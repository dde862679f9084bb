#![deny(missing_docs)]

//! Core library for Pagewise, a grounded question-answering service over uploaded documents.

/// HTTP routing and JSON handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text generation client abstraction and adapters.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and answering counters.
pub mod metrics;
/// Chunking, session indexing, retrieval, and answer grounding.
pub mod processing;

//! Abstractions for generating answers via a local language model.
//!
//! The processing layer hands a fully formed prompt to a [`GenerationClient`] and receives free
//! text back. The Ollama-backed client mirrors the embedding adapter by issuing HTTP requests
//! directly to the runtime.

use crate::config::Config;
use crate::processing::ModelCallError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was unreachable or reported a temporary failure.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider did not answer within the configured timeout.
    #[error("Generation request timed out after {0:?}")]
    Timeout(Duration),
}

impl ModelCallError for GenerationClientError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout(after)
    }
}

/// Interface implemented by text generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Identifier of the model answering prompts.
    fn model_name(&self) -> &str;

    /// Generate a completion for a fully formed prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError>;

    /// Report whether the provider currently answers requests.
    async fn is_reachable(&self) -> bool {
        true
    }
}

/// Build a generation client based on configuration.
pub fn get_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    Ok(Arc::new(OllamaGenerationClient::new(
        config.ollama_url.clone(),
        config.generation_model.clone(),
    )?))
}

/// Generation client backed by the Ollama `/api/generate` endpoint.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
    reachability_timeout: Duration,
}

impl OllamaGenerationClient {
    /// Build a client for `model` served at `base_url`.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationClientError> {
        let http = Client::builder()
            .user_agent("pagewise/generate")
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            http,
            base_url,
            model,
            reachability_timeout: Duration::from_secs(5),
        })
    }

    /// Override how long [`GenerationClient::is_reachable`] waits for `/api/tags`.
    pub fn with_reachability_timeout(mut self, reachability_timeout: Duration) -> Self {
        self.reachability_timeout = reachability_timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.5,
                "top_p": 0.9,
                "num_predict": 3024,
                // Keep the model from continuing the prompt template.
                "stop": ["Human:", "Assistant:", "Document excerpts:", "Question:"],
            }
        });

        let response = self
            .http
            .post(self.url("/api/generate"))
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama endpoint {} returned 404 (is model '{}' pulled?)",
                self.url("/api/generate"),
                self.model
            )));
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }

    async fn is_reachable(&self) -> bool {
        let request = self
            .http
            .get(self.url("/api/tags"))
            .timeout(self.reachability_timeout)
            .send();
        match request.await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!(error = %error, "Ollama reachability check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn client_for(server: &MockServer) -> OllamaGenerationClient {
        OllamaGenerationClient::new(server.base_url(), "llama3.1:8b".into()).expect("client")
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"model": "llama3.1:8b", "stream": false}"#);
                then.status(200).json_body(json!({
                    "response": "  The mitochondria is the powerhouse of the cell.\n",
                    "done": true
                }));
            })
            .await;

        let answer = client.generate("Question: ...").await.expect("answer");

        mock.assert();
        assert_eq!(answer, "The mitochondria is the powerhouse of the cell.");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(400).body("bad request");
            })
            .await;

        let error = client.generate("prompt").await.expect_err("error response");

        match &error {
            GenerationClientError::GenerationFailed(message) => assert!(message.contains("400")),
            other => panic!("expected failed generation, got {other:?}"),
        }
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn ollama_client_rejects_incomplete_response() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "partial", "done": false }));
            })
            .await;

        let error = client.generate("prompt").await.expect_err("incomplete");
        assert!(matches!(error, GenerationClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn reachability_check_uses_tags_endpoint() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({ "models": [] }));
            })
            .await;

        assert!(client.is_reachable().await);
        mock.assert();
    }

    #[tokio::test]
    async fn reachability_check_gives_up_on_stalled_runtime() {
        let server = MockServer::start_async().await;
        let client = client_for(&server).with_reachability_timeout(Duration::from_millis(200));

        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200)
                    .json_body(json!({ "models": [] }))
                    .delay(Duration::from_secs(3));
            })
            .await;

        let started = std::time::Instant::now();
        assert!(!client.is_reachable().await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

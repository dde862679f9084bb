use std::{env, sync::Once};

use pagewise::{
    config, embedding, generation,
    processing::{DocumentApi, DocumentService},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("GENERATION_MODEL", "llama3.1:8b");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let client = embedding::get_embedding_client(config::get_config())
        .expect("failed to build embedding client");
    let vectors = client
        .generate_embeddings(vec![
            "pagewise live embedding".to_string(),
            "a second passage".to_string(),
        ])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 2, "expected embedding per input text");
    assert!(!vectors[0].is_empty());
    assert_eq!(
        vectors[0].len(),
        vectors[1].len(),
        "dimension must be stable"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama generation"]
async fn live_ollama_generation_reply() {
    init_config_once();
    let client = generation::get_generation_client(config::get_config())
        .expect("failed to build generation client");
    let reply = client
        .generate("Reply with the single word: ready")
        .await
        .expect("failed to request generation from provider");
    assert!(!reply.trim().is_empty(), "generation should not be empty");
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings and generation"]
async fn live_document_question_is_grounded() {
    init_config_once();
    let service =
        DocumentService::from_config(config::get_config()).expect("failed to build service");
    let session = service.create_session().await;
    service
        .ingest_document(
            &session,
            vec![
                "The mitochondria is the powerhouse of the cell.".to_string(),
                "Photosynthesis occurs in chloroplasts.".to_string(),
            ],
            "bio.pdf",
        )
        .await
        .expect("ingest");

    let health = service.health().await;
    assert!(
        health.embedder_reachable,
        "embedder unreachable: {health:?}"
    );
    assert!(
        health.generator_reachable,
        "generator unreachable: {health:?}"
    );

    let answer = service
        .answer_query(&session, "What is the powerhouse of the cell?")
        .await
        .expect("answer");
    assert!(answer.has_answer, "expected an answer: {answer:?}");
    assert!(
        answer
            .answer_segments
            .iter()
            .any(|segment| segment.page_number == Some(1)),
        "expected a segment attributed to page 1: {answer:?}"
    );
}

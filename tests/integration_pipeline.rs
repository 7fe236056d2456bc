#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end pipeline tests over the in-memory index with deterministic
// embedding and generation stand-ins: ingest -> search -> prompt ->
// answer, complete and streamed.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use docqa::config::Config;
use docqa::document::{DocType, Document, Metadata};
use docqa::index::memory::MemoryIndex;
use docqa::rag::{Generator, RagService, StreamFrame, TokenStream};
use docqa::retriever::{Embedder, Retriever};
use docqa::{RagError, Result};

/// Deterministic bag-of-keywords embedder
struct KeywordEmbedder;

const KEYWORDS: [&str; 4] = ["rust", "cooking", "music", "weather"];

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = KEYWORDS
        .iter()
        .map(|kw| lower.split_whitespace().filter(|w| w == kw).count() as f32)
        .collect();
    vector.push(1.0);
    vector
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Generator that replays a fixed script of increments
struct ScriptedGenerator {
    tokens: Vec<Result<String>>,
}

impl ScriptedGenerator {
    fn answering(parts: &[&str]) -> Self {
        Self {
            tokens: parts.iter().map(|p| Ok((*p).to_string())).collect(),
        }
    }

    fn failing_after(parts: &[&str], message: &str) -> Self {
        let mut tokens: Vec<Result<String>> =
            parts.iter().map(|p| Ok((*p).to_string())).collect();
        tokens.push(Err(RagError::Backend(message.to_string())));
        Self { tokens }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        let mut answer = String::new();
        for token in &self.tokens {
            match token {
                Ok(part) => answer.push_str(part),
                Err(_) => return Err(RagError::Backend("generation failed".to_string())),
            }
        }
        Ok(answer)
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<TokenStream> {
        let (tx, stream) = TokenStream::channel(self.tokens.len().max(1));
        let script: Vec<Result<String>> = self
            .tokens
            .iter()
            .map(|t| match t {
                Ok(part) => Ok(part.clone()),
                Err(e) => Err(RagError::Backend(e.to_string())),
            })
            .collect();
        tokio::spawn(async move {
            for token in script {
                if tx.send(token).await.is_err() {
                    break;
                }
            }
        });
        Ok(stream)
    }
}

fn pipeline_config() -> Config {
    let mut config = Config::load(Path::new("/nonexistent")).expect("defaults should load");
    config.chunking.chunk_size = 5;
    config.chunking.chunk_overlap = 1;
    config
}

fn build_service(generator: ScriptedGenerator) -> RagService {
    let retriever = Arc::new(Retriever::new(
        Arc::new(MemoryIndex::new()),
        Arc::new(KeywordEmbedder),
        &pipeline_config(),
    ));
    RagService::new(retriever, Arc::new(generator))
}

fn text_document(title: &str, content: &str) -> Document {
    Document::new(
        title.to_string(),
        content.to_string(),
        DocType::Txt,
        Metadata::new(),
    )
}

// 12 words: with chunk_size=5 and chunk_overlap=1 the windows start at
// words 0, 4, 8 with lengths 5, 5, 4
const DOC1_CONTENT: &str = "rust is fast and safe rust has cargo tooling weather is irrelevant";

#[tokio::test]
async fn ingest_then_search_caps_and_ranks_results() {
    let service = build_service(ScriptedGenerator::answering(&["unused"]));

    let doc1 = text_document("Rust Notes", DOC1_CONTENT);
    let chunk_count = service
        .retriever()
        .ingest(&doc1)
        .await
        .expect("ingest should succeed");
    assert_eq!(chunk_count, 3);

    let results = service
        .retriever()
        .search("rust", 2)
        .await
        .expect("search should succeed");

    assert!(results.len() <= 2);
    assert!(!results.is_empty());
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(
        results[0]
            .snippet
            .as_deref()
            .expect("snippet present")
            .contains("rust")
    );
    assert_eq!(results[0].document.document_id, doc1.id);
}

#[tokio::test]
async fn complete_answer_carries_context_and_prompt() {
    let service = build_service(ScriptedGenerator::answering(&["Rust is a systems language."]));

    service
        .retriever()
        .ingest(&text_document("Rust Notes", DOC1_CONTENT))
        .await
        .expect("ingest should succeed");

    let response = service
        .answer("tell me about rust", 2)
        .await
        .expect("answer should succeed");

    assert_eq!(response.answer, "Rust is a systems language.");
    assert!(!response.context.is_empty());
    assert!(response.context.len() <= 2);
    assert!(response.prompt.contains("Question: tell me about rust"));
    assert!(response.prompt.ends_with("Answer:"));

    // Snippets appear in the prompt in ranked order
    let first_snippet = response.context[0]
        .snippet
        .as_deref()
        .expect("snippet present");
    assert!(response.prompt.contains(first_snippet));

    // Wire payload shape
    let json = serde_json::to_value(&response).expect("response should serialize");
    assert!(json.get("answer").is_some());
    assert!(json.get("context").is_some());
    assert!(json.get("prompt").is_some());
}

#[tokio::test]
async fn streamed_answer_reassembles_with_one_terminal_frame() {
    let service = build_service(ScriptedGenerator::answering(&[
        "Rust ", "is ", "", "a ", "systems ", "language.",
    ]));

    service
        .retriever()
        .ingest(&text_document("Rust Notes", DOC1_CONTENT))
        .await
        .expect("ingest should succeed");

    let mut streamer = service
        .answer_stream("tell me about rust", 2)
        .await
        .expect("stream should open");

    let mut frames = Vec::new();
    while let Some(frame) = streamer.next_frame().await {
        frames.push(frame.expect("frame should be ok"));
    }

    let terminal_count = frames.iter().filter(|f| f.is_terminal()).count();
    assert_eq!(terminal_count, 1);
    assert!(frames.last().expect("at least one frame").is_terminal());

    let mut text = String::new();
    for frame in &frames {
        match frame {
            StreamFrame::Token { token, finished } => {
                assert!(!finished);
                assert!(!token.is_empty());
                text.push_str(token);
            }
            StreamFrame::Context { context, finished } => {
                assert!(finished);
                assert!(!context.is_empty());
                assert!(context.len() <= 2);
            }
        }
    }
    assert_eq!(text, "Rust is a systems language.");

    // Every frame serializes as one self-contained JSON line
    for frame in &frames {
        let line = frame.to_ndjson_line().expect("frame should serialize");
        assert!(line.ends_with('\n'));
        let parsed: StreamFrame =
            serde_json::from_str(line.trim()).expect("frame should deserialize");
        assert_eq!(&parsed, frame);
    }
}

#[tokio::test]
async fn failed_generation_never_fakes_completion() {
    let service = build_service(ScriptedGenerator::failing_after(
        &["partial "],
        "model crashed",
    ));

    service
        .retriever()
        .ingest(&text_document("Rust Notes", DOC1_CONTENT))
        .await
        .expect("ingest should succeed");

    let mut streamer = service
        .answer_stream("tell me about rust", 2)
        .await
        .expect("stream should open");

    let mut saw_error = false;
    let mut saw_terminal = false;
    while let Some(frame) = streamer.next_frame().await {
        match frame {
            Ok(frame) => saw_terminal |= frame.is_terminal(),
            Err(err) => {
                assert!(matches!(err, RagError::GenerationInterrupted(_)));
                saw_error = true;
            }
        }
    }

    assert!(saw_error);
    assert!(!saw_terminal, "no context frame may follow a failure");
}

#[tokio::test]
async fn query_validation_happens_before_generation() {
    let service = build_service(ScriptedGenerator::answering(&["unused"]));

    let err = service.answer("", 2).await.expect_err("empty query");
    assert!(matches!(err, RagError::Validation(_)));

    let err = service.answer("   ", 2).await.expect_err("blank query");
    assert!(matches!(err, RagError::Validation(_)));

    let err = service.answer("q", 0).await.expect_err("limit 0");
    assert!(matches!(err, RagError::Validation(_)));

    let err = service.answer("q", 21).await.expect_err("limit above ceiling");
    assert!(matches!(err, RagError::Validation(_)));
}

#[tokio::test]
async fn empty_index_answers_with_empty_context() {
    let service = build_service(ScriptedGenerator::answering(&[
        "I don't have context for that.",
    ]));

    let response = service
        .answer("anything indexed?", 3)
        .await
        .expect("answer should succeed");

    assert!(response.context.is_empty());
    assert!(response.prompt.contains("Context:"));
    assert!(response.prompt.ends_with("Answer:"));
}

#[tokio::test]
async fn deleting_one_document_leaves_others_searchable() {
    let service = build_service(ScriptedGenerator::answering(&["unused"]));
    let retriever = service.retriever();

    let rust_doc = text_document("Rust Notes", "rust rust rust rust");
    let cooking_doc = text_document("Cooking Notes", "cooking cooking cooking cooking");
    retriever.ingest(&rust_doc).await.expect("ingest should succeed");
    retriever
        .ingest(&cooking_doc)
        .await
        .expect("ingest should succeed");

    retriever
        .delete_document(&rust_doc.id)
        .await
        .expect("delete should succeed");

    let results = retriever
        .search("rust cooking", 10)
        .await
        .expect("search should succeed");
    assert!(!results.is_empty());
    assert!(
        results
            .iter()
            .all(|r| r.document.document_id == cooking_doc.id)
    );
}

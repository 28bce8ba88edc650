//! End-to-end pipeline scenarios with the offline embedder and a scripted model.

use crate::chunker::Chunker;
use crate::clinics::{ClinicDirectory, GeoPoint};
use crate::embeddings::providers::HashedProvider;
use crate::embeddings::Embedder;
use crate::generator::Generator;
use crate::limiter::ExternalCallLimiter;
use crate::pipeline::{IngestMode, Pipeline, PipelineState, QuerySettings};
use crate::service::{CareService, ErrorCode, GENERATION_FALLBACK_MESSAGE};
use cyclecare_core::{AppConfig, AppError};
use cyclecare_llm::MockClient;
use cyclecare_prompt::{assemble, PromptTemplate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CYCLES: &str = "Menstrual cycles average 28 days.";
const HORMONES: &str = "Irregular periods may indicate hormonal imbalance.";
const QUESTION: &str = "What is a normal cycle length?";

struct Fixture {
    dir: TempDir,
    client: Arc<MockClient>,
}

impl Fixture {
    fn new(client: MockClient) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            client: Arc::new(client),
        }
    }

    fn pipeline(&self, max_prompt_chars: usize, timeout: Duration) -> Pipeline {
        let limiter = ExternalCallLimiter::new(4, timeout);
        Pipeline::new(
            Embedder::new(Arc::new(HashedProvider::new(384)), limiter.clone(), 8_192),
            Generator::new(self.client.clone(), "mock-model", 512, limiter)
                .with_retry_backoff(Duration::from_millis(1)),
            Chunker::new(50, 10).unwrap(),
            PromptTemplate::builtin(),
            QuerySettings {
                top_k: 2,
                temperature: 0.3,
                max_prompt_chars,
            },
            self.dir.path().join("index"),
        )
    }

    fn docs(&self, files: &[(&str, &str)]) -> PathBuf {
        let docs = self.dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        for (name, text) in files {
            std::fs::write(docs.join(name), text).unwrap();
        }
        docs
    }

    fn two_docs(&self) -> PathBuf {
        self.docs(&[("cycles.txt", CYCLES), ("hormones.txt", HORMONES)])
    }
}

async fn ready(pipeline: &Pipeline, source: &std::path::Path) {
    pipeline.ingest(source, IngestMode::Append).await.unwrap();
    assert_eq!(pipeline.wire().await.unwrap(), PipelineState::Ready);
}

#[tokio::test]
async fn test_two_documents_cycle_question() {
    let fixture = Fixture::new(MockClient::new("Most cycles last around 28 days."));
    let pipeline = fixture.pipeline(12_000, Duration::from_secs(5));

    let report = pipeline
        .ingest(&fixture.two_docs(), IngestMode::Append)
        .await
        .unwrap();
    assert!(report.chunks_indexed >= 2);
    pipeline.wire().await.unwrap();

    let answer = pipeline.query_with_k(QUESTION, Some(2)).await.unwrap();
    assert!(answer.grounded);
    assert_eq!(answer.text, "Most cycles last around 28 days.");
    assert_eq!(answer.sources[0].source, "cycles.txt");
    assert_eq!(answer.sources[0].snippet, CYCLES);

    let prompt = fixture.client.last_prompt().unwrap();
    assert!(prompt.contains(CYCLES));
    assert!(prompt.contains(QUESTION));
    let cycles_at = prompt.find(CYCLES).unwrap();
    if let Some(hormones_at) = prompt.find(HORMONES) {
        assert!(cycles_at < hormones_at, "higher-ranked passage comes first");
    }
}

#[tokio::test]
async fn test_chunks_respect_size() {
    let fixture = Fixture::new(MockClient::echo());
    let long = "Cramps are common in the first days of a period. \
                Heat, gentle exercise and rest can help. \
                Pain that stops daily activities should be checked.";
    let docs = fixture.docs(&[("pain.txt", long)]);
    let pipeline = fixture.pipeline(12_000, Duration::from_secs(5));

    let report = pipeline.ingest(&docs, IngestMode::Append).await.unwrap();
    assert!(report.chunks_indexed >= 3);
    pipeline.wire().await.unwrap();

    let answer = pipeline.query_with_k("Do cramps stop?", Some(10)).await.unwrap();
    assert!(answer.sources.iter().all(|s| s.snippet.chars().count() <= 50));
}

#[tokio::test]
async fn test_empty_index_gives_insufficient_information() {
    let fixture = Fixture::new(MockClient::new("should not be called"));
    let pipeline = fixture.pipeline(12_000, Duration::from_secs(5));
    let docs = fixture.docs(&[]);

    let report = pipeline.ingest(&docs, IngestMode::Append).await.unwrap();
    assert_eq!(report.chunks_indexed, 0);
    assert_eq!(pipeline.wire().await.unwrap(), PipelineState::Ready);

    let answer = pipeline.query(QUESTION).await.unwrap();
    assert!(!answer.grounded);
    assert!(answer.sources.is_empty());
    assert!(answer.text.contains("insufficient information"));
    assert_eq!(fixture.client.calls(), 0);

    let prompt = assemble(QUESTION, &[], &PromptTemplate::builtin(), 12_000).unwrap();
    assert!(!prompt.has_context());
    assert!(prompt.text.contains(QUESTION));
}

#[tokio::test]
async fn test_budget_drops_lowest_ranked_passage() {
    let template = PromptTemplate::builtin();
    let base = assemble(QUESTION, &[], &template, usize::MAX).unwrap().char_count;
    let budget = base + CYCLES.chars().count() + 5;

    let fixture = Fixture::new(MockClient::echo());
    let pipeline = fixture.pipeline(budget, Duration::from_secs(5));
    ready(&pipeline, &fixture.two_docs()).await;

    let answer = pipeline.query_with_k(QUESTION, Some(2)).await.unwrap();
    // The echo model returns the prompt it was sent.
    assert!(answer.text.chars().count() <= budget);
    assert!(answer.text.contains(CYCLES));
    assert!(!answer.text.contains(HORMONES));
    assert_eq!(answer.sources.len(), 1);
}

#[tokio::test]
async fn test_budget_too_small_for_any_passage() {
    let template = PromptTemplate::builtin();
    let base = assemble(QUESTION, &[], &template, usize::MAX).unwrap().char_count;

    let fixture = Fixture::new(MockClient::echo());
    let pipeline = fixture.pipeline(base + 3, Duration::from_secs(5));
    ready(&pipeline, &fixture.two_docs()).await;

    let answer = pipeline.query(QUESTION).await.unwrap();
    assert!(!answer.grounded);
    assert_eq!(fixture.client.calls(), 0);
}

#[tokio::test]
async fn test_query_while_uninitialized() {
    let fixture = Fixture::new(MockClient::new("answer"));
    let service = CareService::new(
        fixture.pipeline(12_000, Duration::from_secs(5)),
        ClinicDirectory::empty(),
        None,
    );

    let err = service.query(QUESTION).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotReady);
    assert_eq!(service.state().await, PipelineState::Uninitialized);
    assert_eq!(fixture.client.calls(), 0);

    let health = service.health().await;
    assert!(!health.index_ready);
    assert!(health.generator_reachable);
}

#[tokio::test]
async fn test_generation_timeout_is_reported_safely() {
    let fixture = Fixture::new(MockClient::new("late").with_delay(Duration::from_secs(5)));
    let service = CareService::new(
        fixture.pipeline(12_000, Duration::from_millis(30)),
        ClinicDirectory::empty(),
        None,
    );
    service
        .ingest(Some(&fixture.two_docs()), false)
        .await
        .unwrap();

    let err = service.query(QUESTION).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
    assert_eq!(err.message, GENERATION_FALLBACK_MESSAGE);
    // One attempt plus one retry.
    assert_eq!(fixture.client.calls(), 2);
}

#[tokio::test]
async fn test_open_is_idempotent_across_restarts() {
    let fixture = Fixture::new(MockClient::echo());
    let docs = fixture.two_docs();
    fixture
        .pipeline(12_000, Duration::from_secs(5))
        .ingest(&docs, IngestMode::Append)
        .await
        .unwrap();

    let first = fixture.pipeline(12_000, Duration::from_secs(5));
    let second = fixture.pipeline(12_000, Duration::from_secs(5));
    first.start().await.unwrap();
    second.start().await.unwrap();

    let a = first.query_with_k(QUESTION, Some(2)).await.unwrap();
    let b = second.query_with_k(QUESTION, Some(2)).await.unwrap();
    assert_eq!(a.text, b.text);
    assert_eq!(a.sources, b.sources);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_run_during_ingest() {
    let fixture = Fixture::new(MockClient::new("answer"));
    let pipeline = Arc::new(fixture.pipeline(12_000, Duration::from_secs(5)));
    ready(&pipeline, &fixture.two_docs()).await;

    let more = fixture.dir.path().join("more");
    std::fs::create_dir_all(&more).unwrap();
    for i in 0..20 {
        std::fs::write(
            more.join(format!("note{:02}.txt", i)),
            format!("Note {} about cycle tracking and symptom diaries.", i),
        )
        .unwrap();
    }

    let ingest = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.ingest(&more, IngestMode::Append).await })
    };
    let queries = (0..8).map(|_| {
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.query(QUESTION).await }
    });

    for answer in futures::future::join_all(queries).await {
        assert!(answer.unwrap().grounded);
    }
    let report = ingest.await.unwrap().unwrap();
    assert_eq!(report.documents_indexed, 20);
    assert_eq!(pipeline.state().await, PipelineState::Ready);
    assert_eq!(pipeline.stats().await.unwrap().documents, 22);
}

#[tokio::test]
async fn test_service_from_config() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("cycles.md"), format!("# Cycle length\n{}", CYCLES)).unwrap();
    std::fs::write(
        dir.path().join("clinics.json"),
        r#"[{"name": "Moon Clinic", "address": "Taipei",
             "coordinates": {"latitude": 25.036398, "longitude": 121.551830}}]"#,
    )
    .unwrap();

    let mut config = AppConfig {
        workspace: dir.path().to_path_buf(),
        provider: "mock".to_string(),
        model: "mock-model".to_string(),
        ..Default::default()
    };
    config.rag.chunk_size = 50;
    config.rag.chunk_overlap = 10;
    config.rag.documents_dir = Some("docs".into());
    config.rag.clinics_file = Some("clinics.json".into());

    let service = CareService::from_config(&config).await.unwrap();
    assert_eq!(service.state().await, PipelineState::Uninitialized);
    assert_eq!(service.stats().await.unwrap_err().code, ErrorCode::NotReady);

    let report = service.ingest(None, false).await.unwrap();
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(service.state().await, PipelineState::Ready);

    let answer = service.query(QUESTION).await.unwrap();
    assert!(answer.grounded);
    assert_eq!(answer.sources[0].source, "cycles.md");
    assert_eq!(answer.sources[0].location, "Cycle length");

    let health = service.health().await;
    assert!(health.index_ready && health.generator_reachable);
    assert_eq!(service.stats().await.unwrap().scheme, "hashed:trigram-hash:384");

    let clinics = service.recommend_clinics(GeoPoint::new(25.033671, 121.564427));
    assert_eq!(clinics.len(), 1);
    assert_eq!(clinics[0].clinic.name, "Moon Clinic");

    // A second service over the same workspace picks the index up.
    let restarted = CareService::from_config(&config).await.unwrap();
    assert_eq!(restarted.state().await, PipelineState::Ready);
}

#[tokio::test]
async fn test_invalid_question() {
    let fixture = Fixture::new(MockClient::new("answer"));
    let pipeline = fixture.pipeline(12_000, Duration::from_secs(5));
    ready(&pipeline, &fixture.two_docs()).await;
    assert!(matches!(
        pipeline.query("   ").await,
        Err(AppError::InvalidArgument(_))
    ));
}

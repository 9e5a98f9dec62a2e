//! End-to-end pipeline behavior against an in-memory metadata store and
//! fake collaborators: terminal outcomes, idempotent reprocessing, and
//! upload-file cleanup on every path.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use doc_corpus::ai::{AiBuilder, AiComponents, AiHandle};
use doc_corpus::config::ChunkingConfig;
use doc_corpus::embedding::Embedder;
use doc_corpus::extract::{ExtractError, TextExtractor};
use doc_corpus::generate::Generator;
use doc_corpus::migrate;
use doc_corpus::models::{DocumentStatus, IngestJob};
use doc_corpus::pipeline::{self, PipelineContext};
use doc_corpus::store;
use doc_corpus::vector::{MemoryIndex, VectorIndex};

#[derive(Clone)]
enum ExtractBehavior {
    Text(String),
    Fail,
}

fn text(t: &str) -> ExtractBehavior {
    ExtractBehavior::Text(t.to_string())
}

struct FakeExtractor {
    behavior: ExtractBehavior,
    calls: AtomicUsize,
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, _bytes: &[u8], _content_type: &str) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            ExtractBehavior::Text(t) => Ok(t.clone()),
            ExtractBehavior::Fail => Err(ExtractError::Transport("connection refused".to_string())),
        }
    }
}

struct FakeEmbedder {
    fail: bool,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            anyhow::bail!("embedding service unreachable");
        }
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 1.0])
            .collect())
    }
}

struct FakeGenerator;

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("generated".to_string())
    }
}

struct StaticBuilder {
    index: Arc<MemoryIndex>,
    embedder_fails: bool,
}

#[async_trait]
impl AiBuilder for StaticBuilder {
    async fn build(&self) -> Result<AiComponents> {
        Ok(AiComponents {
            embedder: Arc::new(FakeEmbedder {
                fail: self.embedder_fails,
            }),
            index: Arc::clone(&self.index) as Arc<dyn VectorIndex>,
            generator: Arc::new(FakeGenerator),
        })
    }
}

struct Harness {
    pool: SqlitePool,
    ctx: PipelineContext,
    index: Arc<MemoryIndex>,
    extractor: Arc<FakeExtractor>,
    _dir: TempDir,
    dir_path: PathBuf,
}

impl Harness {
    async fn new(behavior: ExtractBehavior) -> Self {
        Self::with_embedder(behavior, false).await
    }

    async fn with_embedder(behavior: ExtractBehavior, embedder_fails: bool) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run(&pool).await.unwrap();

        let index = Arc::new(MemoryIndex::new());
        let extractor = Arc::new(FakeExtractor {
            behavior,
            calls: AtomicUsize::new(0),
        });
        let ai = Arc::new(AiHandle::new(Box::new(StaticBuilder {
            index: Arc::clone(&index),
            embedder_fails,
        })));

        let ctx = PipelineContext {
            pool: pool.clone(),
            extractor: Arc::clone(&extractor) as Arc<dyn TextExtractor>,
            ai,
            chunking: ChunkingConfig {
                chunk_chars: 1000,
                overlap_chars: 100,
            },
        };

        let dir = TempDir::new().unwrap();
        let dir_path = dir.path().to_path_buf();

        Self {
            pool,
            ctx,
            index,
            extractor,
            _dir: dir,
            dir_path,
        }
    }

    /// Register an upload the way the server boundary does: file on disk,
    /// queued row committed, job built.
    async fn upload(&self, filename: &str) -> IngestJob {
        let file_path = self.dir_path.join(format!("{}_{}", uuid::Uuid::new_v4(), filename));
        std::fs::write(&file_path, b"raw document bytes").unwrap();

        let (document_id, _) = store::register_upload(
            &self.pool,
            filename,
            "test_agent",
            file_path.to_str().unwrap(),
        )
        .await
        .unwrap();

        IngestJob {
            document_id,
            file_path,
        }
    }

    async fn status(&self, id: i64) -> DocumentStatus {
        store::get(&self.pool, id).await.unwrap().unwrap().status
    }
}

#[tokio::test]
async fn completed_document_upserts_deterministic_ids() {
    let h = Harness::new(text("Q3 results show growth.")).await;
    let job = h.upload("report.pdf").await;

    pipeline::process(&h.ctx, &job).await;

    assert_eq!(h.status(job.document_id).await, DocumentStatus::Completed);
    assert_eq!(h.index.ids(), vec!["report.pdf_0".to_string()]);
    assert!(!job.file_path.exists(), "upload must be cleaned up");
}

#[tokio::test]
async fn empty_extraction_is_failed_no_content() {
    let h = Harness::new(text("   \n  ")).await;
    let job = h.upload("empty.txt").await;

    pipeline::process(&h.ctx, &job).await;

    assert_eq!(
        h.status(job.document_id).await,
        DocumentStatus::FailedNoContent
    );
    assert!(h.index.is_empty(), "no vector upserts may occur");
    assert!(!job.file_path.exists());
}

#[tokio::test]
async fn duplicate_delivery_after_completion_is_a_skip() {
    let h = Harness::new(text("Q3 results show growth.")).await;
    let job = h.upload("report.pdf").await;

    pipeline::process(&h.ctx, &job).await;
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    let ids_after_first = h.index.ids();

    // Duplicate delivery of the same job: file redelivered, record completed.
    std::fs::write(&job.file_path, b"raw document bytes").unwrap();
    pipeline::process(&h.ctx, &job).await;

    // No extraction, no embedding, no status change — and the redelivered
    // file is still cleaned up.
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.index.ids(), ids_after_first);
    assert_eq!(h.status(job.document_id).await, DocumentStatus::Completed);
    assert!(!job.file_path.exists());
}

#[tokio::test]
async fn reprocessing_same_filename_never_duplicates_chunks() {
    let long_text = "Quarterly figures. ".repeat(120);
    let h = Harness::new(ExtractBehavior::Text(long_text)).await;

    let job = h.upload("report.pdf").await;
    pipeline::process(&h.ctx, &job).await;
    let ids_first = h.index.ids();
    assert!(ids_first.len() > 1, "long text must produce several chunks");

    // Simulate the retry of a run whose completed commit was lost: the
    // record is back in queued and the job is delivered again.
    store::update_status(&h.pool, job.document_id, DocumentStatus::Queued)
        .await
        .unwrap();
    let job2 = h.upload("report.pdf").await;
    assert_eq!(job2.document_id, job.document_id);
    pipeline::process(&h.ctx, &job2).await;

    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.index.ids(), ids_first, "retry must upsert the same id set");
    assert_eq!(h.status(job.document_id).await, DocumentStatus::Completed);
}

#[tokio::test]
async fn extraction_failure_marks_failed_and_cleans_up() {
    let h = Harness::new(ExtractBehavior::Fail).await;
    let job = h.upload("broken.docx").await;

    pipeline::process(&h.ctx, &job).await;

    assert_eq!(h.status(job.document_id).await, DocumentStatus::Failed);
    assert!(h.index.is_empty());
    assert!(!job.file_path.exists());
}

#[tokio::test]
async fn embedding_failure_marks_failed_and_cleans_up() {
    let h = Harness::with_embedder(text("usable text"), true).await;
    let job = h.upload("report.pdf").await;

    pipeline::process(&h.ctx, &job).await;

    assert_eq!(h.status(job.document_id).await, DocumentStatus::Failed);
    assert!(h.index.is_empty());
    assert!(!job.file_path.exists());
}

#[tokio::test]
async fn missing_record_is_dropped_but_file_is_removed() {
    let h = Harness::new(text("text")).await;

    let file_path = h.dir_path.join("orphan.pdf");
    std::fs::write(&file_path, b"bytes").unwrap();
    let job = IngestJob {
        document_id: 9999,
        file_path,
    };

    pipeline::process(&h.ctx, &job).await;

    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    assert!(h.index.is_empty());
    assert!(!job.file_path.exists());
}

#[tokio::test]
async fn statuses_never_regress_from_completed() {
    let h = Harness::new(text("Q3 results show growth.")).await;
    let job = h.upload("report.pdf").await;

    pipeline::process(&h.ctx, &job).await;
    assert_eq!(h.status(job.document_id).await, DocumentStatus::Completed);

    // Stale duplicate deliveries, with and without a surviving file.
    pipeline::process(&h.ctx, &job).await;
    std::fs::write(&job.file_path, b"bytes").unwrap();
    pipeline::process(&h.ctx, &job).await;

    assert_eq!(h.status(job.document_id).await, DocumentStatus::Completed);
}

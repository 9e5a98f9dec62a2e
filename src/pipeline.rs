//! Document processing pipeline.
//!
//! `process` drives one dispatched job through extraction → chunking →
//! embedding → vector upsert → status transition. It is always terminal:
//! no error escapes to the worker loop, the on-disk upload is deleted on
//! every path, and the record is left in a terminal or re-attemptable
//! state.
//!
//! Idempotency rests on two checks:
//! - a record already `completed` short-circuits before any expensive
//!   work (a duplicate delivery is a skip, not an error);
//! - vector ids derive from `(filename, chunk_index)`, so a retry
//!   upserts the same ids instead of duplicating entries.
//!
//! Status transitions commit one at a time. No lock is held across the
//! slow collaborator calls; a crash mid-pipeline leaves a `processing`
//! row visible on the dashboard.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::ai::AiHandle;
use crate::chunk::{chunk_id, chunk_text};
use crate::config::ChunkingConfig;
use crate::extract::TextExtractor;
use crate::models::{ChunkEntry, DocumentRecord, DocumentStatus, IngestJob};
use crate::store;

/// Everything a worker needs to run the pipeline. Collaborators are
/// injected explicitly; the AI components stay behind the lazy handle so
/// the first job pays the construction cost exactly once per process.
pub struct PipelineContext {
    pub pool: SqlitePool,
    pub extractor: Arc<dyn TextExtractor>,
    pub ai: Arc<AiHandle>,
    pub chunking: ChunkingConfig,
}

enum Outcome {
    Completed { chunks: usize },
    NoContent,
}

/// Process one dispatched job to a terminal outcome.
///
/// Never returns an error: failures are converted into a single `failed`
/// status commit and logged with the document identity and cause. The
/// upload file is removed afterwards on every path.
pub async fn process(ctx: &PipelineContext, job: &IngestJob) {
    let document_id = job.document_id;

    match store::get(&ctx.pool, document_id).await {
        Err(e) => {
            tracing::error!(document_id, error = %e, "metadata store lookup failed; dropping job");
        }
        Ok(None) => {
            // The record must have been committed before dispatch; its
            // absence indicates an upstream bug. Dropped, not retried.
            tracing::error!(document_id, "job references a missing document record; dropping job");
        }
        Ok(Some(record)) if record.status == DocumentStatus::Completed => {
            tracing::info!(
                document_id,
                filename = %record.filename,
                "document already completed; skipping reprocessing"
            );
        }
        Ok(Some(record)) => match run(ctx, &record, &job.file_path).await {
            Ok(Outcome::Completed { chunks }) => {
                tracing::info!(
                    document_id,
                    filename = %record.filename,
                    chunks,
                    "document processing completed"
                );
            }
            Ok(Outcome::NoContent) => {
                tracing::warn!(
                    document_id,
                    filename = %record.filename,
                    "extraction yielded no usable text"
                );
            }
            Err(e) => {
                tracing::error!(
                    document_id,
                    filename = %record.filename,
                    error = %format!("{:#}", e),
                    "document processing failed"
                );
                if let Err(commit_err) =
                    store::update_status(&ctx.pool, document_id, DocumentStatus::Failed).await
                {
                    tracing::error!(
                        document_id,
                        error = %commit_err,
                        "could not record failed status"
                    );
                }
            }
        },
    }

    remove_upload(&job.file_path).await;
}

async fn run(ctx: &PipelineContext, record: &DocumentRecord, file_path: &Path) -> Result<Outcome> {
    // Visible to the dashboard before the slow work starts.
    store::update_status(&ctx.pool, record.id, DocumentStatus::Processing).await?;

    let ai = ctx.ai.get().await.context("AI components unavailable")?;

    let bytes = tokio::fs::read(file_path)
        .await
        .with_context(|| format!("failed to read upload at {}", file_path.display()))?;

    let text = ctx
        .extractor
        .extract(&bytes, "application/octet-stream")
        .await
        .context("extraction failed")?;
    let text = text.trim();

    if text.is_empty() {
        // Recognized terminal non-error outcome.
        store::update_status(&ctx.pool, record.id, DocumentStatus::FailedNoContent).await?;
        return Ok(Outcome::NoContent);
    }

    let chunk_texts = chunk_text(text, ctx.chunking.chunk_chars, ctx.chunking.overlap_chars);
    let embeddings = ai
        .embedder
        .embed(&chunk_texts)
        .await
        .context("embedding failed")?;

    anyhow::ensure!(
        embeddings.len() == chunk_texts.len(),
        "embedder returned {} vectors for {} chunks",
        embeddings.len(),
        chunk_texts.len()
    );

    let entries: Vec<ChunkEntry> = chunk_texts
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (text, embedding))| ChunkEntry {
            id: chunk_id(&record.filename, i as i64),
            text,
            source_filename: record.filename.clone(),
            chunk_index: i as i64,
            embedding,
        })
        .collect();

    ai.index
        .upsert(&entries)
        .await
        .context("vector index upsert failed")?;

    store::update_status(&ctx.pool, record.id, DocumentStatus::Completed).await?;

    Ok(Outcome::Completed {
        chunks: entries.len(),
    })
}

async fn remove_upload(file_path: &Path) {
    match tokio::fs::remove_file(file_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %file_path.display(), error = %e, "could not remove upload file");
        }
    }
}

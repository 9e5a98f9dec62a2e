//! Core data models used throughout doc-corpus.
//!
//! These types represent the document records, dispatch jobs, and vector
//! chunks that flow through the ingestion and query pipeline.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Processing state of a [`DocumentRecord`].
///
/// Transitions follow `queued → processing → {completed | failed |
/// failed_no_content}`. `completed` is final: the pipeline short-circuits
/// any later delivery for a completed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    FailedNoContent,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::FailedNoContent => "failed_no_content",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(DocumentStatus::Queued),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            "failed_no_content" => Some(DocumentStatus::FailedNoContent),
            _ => None,
        }
    }
}

/// Durable metadata record for one ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    pub source_agent: String,
    pub category: Option<String>,
    pub status: DocumentStatus,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip)]
    pub upload_path: Option<String>,
}

/// Immutable dispatch message handed from the upload boundary to a worker.
///
/// Ownership of the file at `file_path` passes to the worker: the pipeline
/// deletes it once the record reaches a terminal outcome.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub document_id: i64,
    pub file_path: PathBuf,
}

/// One chunk of extracted text, ready for upsert into the vector index.
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    /// Deterministic id `"{filename}_{chunk_index}"` — re-ingesting the
    /// same filename upserts the same ids.
    pub id: String,
    pub text: String,
    pub source_filename: String,
    pub chunk_index: i64,
    pub embedding: Vec<f32>,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub source_filename: String,
    pub score: f32,
}

/// Answer produced by the query engine.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: BTreeSet<String>,
}

//! Task dispatch layer.
//!
//! Decouples the fast upload request from slow document processing. The
//! durable record of a job is its `queued` row in the metadata store —
//! committed before [`Dispatcher::enqueue`] returns — so a crash between
//! enqueue and processing loses nothing: the startup sweep
//! ([`requeue_pending`]) redelivers every `queued` row whose upload file
//! still exists.
//!
//! Delivery is at-least-once. Duplicate deliveries (re-upload races, the
//! startup sweep overlapping an in-flight job) are tolerated by the
//! pipeline's idempotency, not prevented here. No ordering is guaranteed
//! between jobs for different documents.

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::models::{DocumentStatus, IngestJob};
use crate::pipeline::{self, PipelineContext};
use crate::store;

/// Sending half of the dispatch queue, held by the upload boundary.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<IngestJob>,
}

impl Dispatcher {
    /// Hand a job to the worker pool. Returns once the job is on the
    /// queue; the caller is never blocked on processing itself.
    pub async fn enqueue(&self, job: IngestJob) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| anyhow::anyhow!("dispatch queue is closed"))
    }
}

/// Create the bounded dispatch queue.
pub fn queue(capacity: usize) -> (Dispatcher, mpsc::Receiver<IngestJob>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Dispatcher { tx }, rx)
}

/// Worker pool: receive jobs and run the pipeline, at most `concurrency`
/// jobs in flight. Runs until the queue's senders are dropped.
pub async fn run_workers(
    ctx: Arc<PipelineContext>,
    mut rx: mpsc::Receiver<IngestJob>,
    concurrency: usize,
) {
    tracing::info!(concurrency, "worker pool started");
    let semaphore = Arc::new(Semaphore::new(concurrency));

    while let Some(job) = rx.recv().await {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .expect("worker semaphore is never closed");
        let ctx = Arc::clone(&ctx);

        tokio::spawn(async move {
            pipeline::process(&ctx, &job).await;
            drop(permit);
        });
    }

    tracing::info!("worker pool stopped");
}

/// Startup redelivery sweep.
///
/// Re-enqueues every `queued` row whose upload file survived; rows whose
/// file is gone can never be processed and are marked `failed`. Returns
/// the number of jobs redelivered.
pub async fn requeue_pending(pool: &SqlitePool, dispatcher: &Dispatcher) -> Result<usize> {
    let pending = store::pending_uploads(pool).await?;
    let mut requeued = 0;

    for (document_id, upload_path) in pending {
        let file_path = PathBuf::from(&upload_path);

        if tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
            dispatcher
                .enqueue(IngestJob {
                    document_id,
                    file_path,
                })
                .await?;
            requeued += 1;
        } else {
            tracing::warn!(document_id, upload_path, "queued upload file missing; marking failed");
            store::update_status(pool, document_id, DocumentStatus::Failed).await?;
        }
    }

    if requeued > 0 {
        tracing::info!(requeued, "redelivered queued jobs from previous run");
    }

    Ok(requeued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn enqueue_returns_before_processing() {
        let (dispatcher, mut rx) = queue(4);

        dispatcher
            .enqueue(IngestJob {
                document_id: 1,
                file_path: PathBuf::from("/tmp/x"),
            })
            .await
            .unwrap();

        let job = rx.recv().await.unwrap();
        assert_eq!(job.document_id, 1);
    }

    #[tokio::test]
    async fn requeue_redelivers_surviving_uploads() {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();

        let alive = dir.path().join("alive.pdf");
        std::fs::write(&alive, b"bytes").unwrap();
        let (alive_id, _) =
            store::register_upload(&pool, "alive.pdf", "agent", alive.to_str().unwrap())
                .await
                .unwrap();

        let gone = dir.path().join("gone.pdf");
        let (gone_id, _) =
            store::register_upload(&pool, "gone.pdf", "agent", gone.to_str().unwrap())
                .await
                .unwrap();

        let (dispatcher, mut rx) = queue(4);
        let requeued = requeue_pending(&pool, &dispatcher).await.unwrap();
        assert_eq!(requeued, 1);

        let job = rx.recv().await.unwrap();
        assert_eq!(job.document_id, alive_id);

        let record = store::get(&pool, gone_id).await.unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Failed);
    }
}

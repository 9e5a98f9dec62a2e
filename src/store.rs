//! Document record repository.
//!
//! Plain data in, plain data out: explicit queries against the `documents`
//! table instead of ORM entities. All mutations target a single row and
//! commit immediately, so status is observable mid-flight and no lock is
//! held across slow collaborator calls.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{DocumentRecord, DocumentStatus};

/// Outcome of registering an upload for a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDisposition {
    /// A new record was created in `queued`.
    Created,
    /// An existing non-completed record was reset to `queued` for
    /// reprocessing.
    Requeued,
    /// The record is already `completed`; the pipeline will skip it.
    AlreadyCompleted,
}

fn row_to_record(row: &SqliteRow) -> Result<DocumentRecord> {
    let status_str: String = row.get("status");
    let status = DocumentStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown document status in store: {}", status_str))?;

    Ok(DocumentRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        source_agent: row.get("source_agent"),
        category: row.get("category"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        upload_path: row.get("upload_path"),
    })
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<DocumentRecord>> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// Register an upload for `filename`, enforcing the one-record-per-filename
/// invariant.
///
/// A new filename inserts a `queued` row. An existing non-completed row is
/// reset to `queued` (reprocessing request). An existing `completed` row is
/// left untouched apart from `upload_path`/`updated_at` — the pipeline's
/// skip-if-completed check makes the redelivery a no-op.
pub async fn register_upload(
    pool: &SqlitePool,
    filename: &str,
    source_agent: &str,
    upload_path: &str,
) -> Result<(i64, UploadDisposition)> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let existing = sqlx::query("SELECT id, status FROM documents WHERE filename = ?")
        .bind(filename)
        .fetch_optional(&mut *tx)
        .await?;

    let result = match existing {
        None => {
            let id = sqlx::query(
                r#"
                INSERT INTO documents (filename, source_agent, status, created_at, updated_at, upload_path)
                VALUES (?, ?, 'queued', ?, ?, ?)
                "#,
            )
            .bind(filename)
            .bind(source_agent)
            .bind(now)
            .bind(now)
            .bind(upload_path)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            (id, UploadDisposition::Created)
        }
        Some(row) => {
            let id: i64 = row.get("id");
            let status_str: String = row.get("status");
            let completed = status_str == DocumentStatus::Completed.as_str();

            if completed {
                sqlx::query("UPDATE documents SET upload_path = ?, updated_at = ? WHERE id = ?")
                    .bind(upload_path)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                (id, UploadDisposition::AlreadyCompleted)
            } else {
                sqlx::query(
                    r#"
                    UPDATE documents
                    SET status = 'queued', source_agent = ?, upload_path = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(source_agent)
                .bind(upload_path)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                (id, UploadDisposition::Requeued)
            }
        }
    };

    tx.commit().await?;
    Ok(result)
}

/// Commit a single status transition for one record.
pub async fn update_status(pool: &SqlitePool, id: i64, status: DocumentStatus) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Most recent records for the dashboard.
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<DocumentRecord>> {
    let rows = sqlx::query("SELECT * FROM documents ORDER BY created_at DESC, id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_record).collect()
}

/// Rows still `queued` with a recorded upload path, for the startup
/// redelivery sweep.
pub async fn pending_uploads(pool: &SqlitePool) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query(
        "SELECT id, upload_path FROM documents WHERE status = 'queued' AND upload_path IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("id"), row.get("upload_path")))
        .collect())
}

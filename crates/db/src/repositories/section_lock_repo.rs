//! Repository for the `section_locks` table.
//!
//! Each `(document_id, section_id)` slot holds at most one row. Taking over
//! an expired slot or refreshing one's own overwrites it with an upsert.

use chrono::Duration;
use quire_core::lock::{self, SectionKey, SectionLock};
use quire_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::section_lock::SectionLockRow;

/// Column list for section_locks queries.
const COLUMNS: &str = "id, document_id, section_id, holder_id, acquired_at";

/// Result of an acquire attempt.
#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired(SectionLockRow),
    /// Another holder's active lock overlaps the requested section.
    Conflict(SectionLock),
    DocumentMissing,
}

/// Provides operations for advisory section locks.
pub struct SectionLockRepo;

impl SectionLockRepo {
    /// Create or refresh `holder_id`'s lock on `section`.
    ///
    /// Runs in a transaction holding `FOR UPDATE` on the document row, so
    /// concurrent acquires on one document are serialized and the conflict
    /// check sees every committed lock.
    pub async fn acquire(
        pool: &PgPool,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
        now: Timestamp,
        timeout: Duration,
    ) -> Result<AcquireOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let document: Option<(DbId,)> =
            sqlx::query_as("SELECT id FROM documents WHERE id = $1 FOR UPDATE")
                .bind(document_id)
                .fetch_optional(&mut *tx)
                .await?;
        if document.is_none() {
            return Ok(AcquireOutcome::DocumentMissing);
        }

        let query = format!("SELECT {COLUMNS} FROM section_locks WHERE document_id = $1");
        let existing: Vec<SectionLock> = sqlx::query_as::<_, SectionLockRow>(&query)
            .bind(document_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(SectionLock::from)
            .collect();
        if let Some(held) = lock::find_conflict(&existing, section, holder_id, now, timeout) {
            return Ok(AcquireOutcome::Conflict(held.clone()));
        }

        let query = format!(
            "INSERT INTO section_locks (document_id, section_id, holder_id, acquired_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (document_id, section_id) \
             DO UPDATE SET holder_id = EXCLUDED.holder_id, acquired_at = EXCLUDED.acquired_at, \
                           updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, SectionLockRow>(&query)
            .bind(document_id)
            .bind(section.as_str())
            .bind(holder_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(AcquireOutcome::Acquired(row))
    }

    /// Release a lock. Only the holder can release.
    ///
    /// Returns `true` if a lock was removed.
    pub async fn release(
        pool: &PgPool,
        document_id: DbId,
        section_id: &str,
        holder_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM section_locks \
             WHERE document_id = $1 AND section_id = $2 AND holder_id = $3",
        )
        .bind(document_id)
        .bind(section_id)
        .bind(holder_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release every lock a holder has on a document.
    pub async fn release_all_for_holder(
        pool: &PgPool,
        document_id: DbId,
        holder_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM section_locks WHERE document_id = $1 AND holder_id = $2")
                .bind(document_id)
                .bind(holder_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Remove every lock on a document regardless of holder.
    pub async fn delete_for_document(pool: &PgPool, document_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM section_locks WHERE document_id = $1")
            .bind(document_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List every stored lock on a document, expired ones included.
    pub async fn list_for_document(
        pool: &PgPool,
        document_id: DbId,
    ) -> Result<Vec<SectionLockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM section_locks
             WHERE document_id = $1
             ORDER BY acquired_at ASC, id ASC"
        );
        sqlx::query_as::<_, SectionLockRow>(&query)
            .bind(document_id)
            .fetch_all(pool)
            .await
    }

    /// Delete locks acquired before `cutoff`, on one document or on all.
    ///
    /// Returns the number of locks deleted.
    pub async fn delete_expired(
        pool: &PgPool,
        document_id: Option<DbId>,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM section_locks \
             WHERE acquired_at < $2 AND ($1::BIGINT IS NULL OR document_id = $1)",
        )
        .bind(document_id)
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

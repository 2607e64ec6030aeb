//! Repository for the `revisions` table.
//!
//! Revision numbers are assigned by the engine; the unique
//! `(document_id, revision_number)` constraint rejects duplicates. Writes
//! run inside the transaction that also updates the document row (see
//! [`DocumentRepo::commit`](super::DocumentRepo::commit)).

use quire_core::revision::RevisionWrite;
use quire_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::revision::RevisionRow;

/// Column list for revisions queries.
const COLUMNS: &str = "id, document_id, revision_number, source_text, rendered_html, \
    editor_id, updated_at, created_at";

/// Provides history operations for document revisions.
pub struct RevisionRepo;

impl RevisionRepo {
    /// Append a revision snapshot within an existing transaction.
    pub async fn create(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        write: &RevisionWrite,
    ) -> Result<RevisionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO revisions
                (document_id, revision_number, source_text, rendered_html, editor_id, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(write.document_id)
            .bind(write.revision_number)
            .bind(&write.source_text)
            .bind(&write.rendered_html)
            .bind(write.editor_id)
            .bind(write.updated_at)
            .fetch_one(&mut **tx)
            .await
    }

    /// Overwrite an existing revision in place within an existing
    /// transaction. Returns `None` if it does not exist.
    pub async fn amend(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        write: &RevisionWrite,
    ) -> Result<Option<RevisionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE revisions SET
                source_text = $3,
                rendered_html = $4,
                editor_id = $5,
                updated_at = $6
             WHERE document_id = $1 AND revision_number = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(write.document_id)
            .bind(write.revision_number)
            .bind(&write.source_text)
            .bind(&write.rendered_html)
            .bind(write.editor_id)
            .bind(write.updated_at)
            .fetch_optional(&mut **tx)
            .await
    }

    /// List all revisions for a document, oldest first.
    pub async fn list_by_document(
        pool: &PgPool,
        document_id: DbId,
    ) -> Result<Vec<RevisionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM revisions
             WHERE document_id = $1
             ORDER BY revision_number ASC"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(document_id)
            .fetch_all(pool)
            .await
    }

    /// Find a specific revision of a document.
    pub async fn find_by_document_and_number(
        pool: &PgPool,
        document_id: DbId,
        revision_number: i32,
    ) -> Result<Option<RevisionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM revisions
             WHERE document_id = $1 AND revision_number = $2"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(document_id)
            .bind(revision_number)
            .fetch_optional(pool)
            .await
    }

    /// The highest-numbered revision of a document.
    pub async fn find_latest(
        pool: &PgPool,
        document_id: DbId,
    ) -> Result<Option<RevisionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM revisions
             WHERE document_id = $1
             ORDER BY revision_number DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(document_id)
            .fetch_optional(pool)
            .await
    }

    /// The most recent revision saved at or before `time`.
    pub async fn find_at_or_before(
        pool: &PgPool,
        document_id: DbId,
        time: Timestamp,
    ) -> Result<Option<RevisionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM revisions
             WHERE document_id = $1 AND updated_at <= $2
             ORDER BY updated_at DESC, revision_number DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, RevisionRow>(&query)
            .bind(document_id)
            .bind(time)
            .fetch_optional(pool)
            .await
    }

    /// Delete every revision numbered above `revision_number` within an
    /// existing transaction.
    ///
    /// Returns the number of revisions deleted.
    pub async fn delete_after(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        document_id: DbId,
        revision_number: i32,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM revisions WHERE document_id = $1 AND revision_number > $2")
                .bind(document_id)
                .bind(revision_number)
                .execute(&mut **tx)
                .await?;
        Ok(result.rows_affected())
    }
}

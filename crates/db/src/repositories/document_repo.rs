//! Repository for the `documents` table.

use quire_core::document::DocumentRecord;
use quire_core::revision::HistoryChange;
use quire_core::types::DbId;
use sqlx::PgPool;

use crate::models::document::DocumentRow;
use crate::repositories::RevisionRepo;

/// Column list for documents queries.
const COLUMNS: &str = "id, source_text, rendered_html, structure, revision_number, \
    lock_version, editor_id, created_at, updated_at";

/// Result of [`DocumentRepo::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The stored `lock_version` moved on; nothing was written.
    Stale,
    DocumentMissing,
    /// An amend named a revision that does not exist; nothing was written.
    RevisionMissing(i32),
}

/// Provides CRUD operations for documents.
pub struct DocumentRepo;

impl DocumentRepo {
    /// Insert a new document. `record.id` is ignored.
    pub async fn create(
        pool: &PgPool,
        record: &DocumentRecord,
        structure: Option<&serde_json::Value>,
    ) -> Result<DocumentRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO documents
                (source_text, rendered_html, structure, revision_number, lock_version,
                 editor_id, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DocumentRow>(&query)
            .bind(&record.source_text)
            .bind(&record.rendered_html)
            .bind(structure)
            .bind(record.revision_number)
            .bind(record.lock_version)
            .bind(record.editor_id)
            .bind(record.updated_at)
            .fetch_one(pool)
            .await
    }

    /// Find a document by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<DocumentRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM documents WHERE id = $1");
        sqlx::query_as::<_, DocumentRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite a document and apply `history` in one transaction, if the
    /// stored `lock_version` is still `expected_lock_version`.
    ///
    /// Any failure rolls back both the document row and the revisions.
    pub async fn commit(
        pool: &PgPool,
        record: &DocumentRecord,
        structure: Option<&serde_json::Value>,
        expected_lock_version: i32,
        history: &HistoryChange,
    ) -> Result<CommitOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let written =
            Self::update_if_version_inner(&mut tx, record, structure, expected_lock_version)
                .await?;
        if !written {
            let exists: Option<(DbId,)> = sqlx::query_as("SELECT id FROM documents WHERE id = $1")
                .bind(record.id)
                .fetch_optional(&mut *tx)
                .await?;
            return Ok(match exists {
                Some(_) => CommitOutcome::Stale,
                None => CommitOutcome::DocumentMissing,
            });
        }

        match history {
            HistoryChange::Append(write) => {
                RevisionRepo::create(&mut tx, write).await?;
            }
            HistoryChange::Amend(write) => {
                if RevisionRepo::amend(&mut tx, write).await?.is_none() {
                    return Ok(CommitOutcome::RevisionMissing(write.revision_number));
                }
            }
            HistoryChange::TruncateAfter(revision_number) => {
                RevisionRepo::delete_after(&mut tx, record.id, *revision_number).await?;
            }
            HistoryChange::Keep => {}
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    /// Null out the rendered caches of the given documents.
    ///
    /// Returns the number of rows touched.
    pub async fn clear_rendered(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE documents SET rendered_html = NULL, structure = NULL \
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Overwrite a document if its `lock_version` is still
    /// `expected_lock_version`, within an existing transaction.
    ///
    /// Returns `true` if the row was written.
    async fn update_if_version_inner(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        record: &DocumentRecord,
        structure: Option<&serde_json::Value>,
        expected_lock_version: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE documents SET
                source_text = $2,
                rendered_html = $3,
                structure = $4,
                revision_number = $5,
                lock_version = $6,
                editor_id = $7,
                updated_at = $8
             WHERE id = $1 AND lock_version = $9",
        )
        .bind(record.id)
        .bind(&record.source_text)
        .bind(&record.rendered_html)
        .bind(structure)
        .bind(record.revision_number)
        .bind(record.lock_version)
        .bind(record.editor_id)
        .bind(record.updated_at)
        .bind(expected_lock_version)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

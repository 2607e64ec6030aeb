//! [`PgWikiStore`]: the `quire-core` store traits over PostgreSQL.
//!
//! Repository errors are mapped to [`CoreError::Storage`] here; nothing
//! above this layer sees `sqlx::Error`.

use async_trait::async_trait;
use chrono::Duration;
use quire_core::document::DocumentRecord;
use quire_core::error::CoreError;
use quire_core::lock::{SectionKey, SectionLock};
use quire_core::revision::{HistoryChange, Revision};
use quire_core::store::{DocumentStore, LockStore, RevisionStore};
use quire_core::types::{DbId, Timestamp};

use crate::models::document::structure_json;
use crate::repositories::{
    AcquireOutcome, CommitOutcome, DocumentRepo, RevisionRepo, SectionLockRepo,
};
use crate::DbPool;

/// Document, revision and lock persistence backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgWikiStore {
    pool: DbPool,
}

impl PgWikiStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgWikiStore {
    async fn insert_document(&self, record: &DocumentRecord) -> Result<DocumentRecord, CoreError> {
        let structure = structure_json(record).map_err(CoreError::storage)?;
        let row = DocumentRepo::create(&self.pool, record, structure.as_ref())
            .await
            .map_err(CoreError::storage)?;
        Ok(row.into())
    }

    async fn find_document(&self, id: DbId) -> Result<Option<DocumentRecord>, CoreError> {
        let row = DocumentRepo::find_by_id(&self.pool, id)
            .await
            .map_err(CoreError::storage)?;
        Ok(row.map(Into::into))
    }

    async fn commit_document(
        &self,
        record: &DocumentRecord,
        expected_lock_version: i32,
        history: &HistoryChange,
    ) -> Result<bool, CoreError> {
        let structure = structure_json(record).map_err(CoreError::storage)?;
        let outcome = DocumentRepo::commit(
            &self.pool,
            record,
            structure.as_ref(),
            expected_lock_version,
            history,
        )
        .await
        .map_err(CoreError::storage)?;
        match outcome {
            CommitOutcome::Committed => Ok(true),
            CommitOutcome::Stale => Ok(false),
            CommitOutcome::DocumentMissing => Err(CoreError::NotFound {
                entity: "document",
                id: record.id,
            }),
            CommitOutcome::RevisionMissing(revision) => Err(CoreError::RevisionNotFound {
                document_id: record.id,
                revision,
            }),
        }
    }

    async fn clear_rendered(&self, ids: &[DbId]) -> Result<u64, CoreError> {
        DocumentRepo::clear_rendered(&self.pool, ids)
            .await
            .map_err(CoreError::storage)
    }
}

#[async_trait]
impl RevisionStore for PgWikiStore {
    async fn list_revisions(&self, document_id: DbId) -> Result<Vec<Revision>, CoreError> {
        let rows = RevisionRepo::list_by_document(&self.pool, document_id)
            .await
            .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_revision(
        &self,
        document_id: DbId,
        revision_number: i32,
    ) -> Result<Option<Revision>, CoreError> {
        let row = RevisionRepo::find_by_document_and_number(&self.pool, document_id, revision_number)
            .await
            .map_err(CoreError::storage)?;
        Ok(row.map(Into::into))
    }

    async fn latest_revision(&self, document_id: DbId) -> Result<Option<Revision>, CoreError> {
        let row = RevisionRepo::find_latest(&self.pool, document_id)
            .await
            .map_err(CoreError::storage)?;
        Ok(row.map(Into::into))
    }

    async fn find_revision_since(
        &self,
        document_id: DbId,
        time: Timestamp,
    ) -> Result<Option<Revision>, CoreError> {
        let row = RevisionRepo::find_at_or_before(&self.pool, document_id, time)
            .await
            .map_err(CoreError::storage)?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl LockStore for PgWikiStore {
    async fn acquire_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
        now: Timestamp,
        timeout: Duration,
    ) -> Result<SectionLock, CoreError> {
        let outcome =
            SectionLockRepo::acquire(&self.pool, document_id, section, holder_id, now, timeout)
                .await
                .map_err(CoreError::storage)?;
        match outcome {
            AcquireOutcome::Acquired(row) => Ok(row.into()),
            AcquireOutcome::Conflict(held) => Err(held.to_error()),
            AcquireOutcome::DocumentMissing => Err(CoreError::NotFound {
                entity: "document",
                id: document_id,
            }),
        }
    }

    async fn release_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
    ) -> Result<bool, CoreError> {
        SectionLockRepo::release(&self.pool, document_id, section.as_str(), holder_id)
            .await
            .map_err(CoreError::storage)
    }

    async fn release_all_locks(
        &self,
        document_id: DbId,
        holder_id: DbId,
    ) -> Result<u64, CoreError> {
        SectionLockRepo::release_all_for_holder(&self.pool, document_id, holder_id)
            .await
            .map_err(CoreError::storage)
    }

    async fn break_locks(&self, document_id: DbId) -> Result<u64, CoreError> {
        SectionLockRepo::delete_for_document(&self.pool, document_id)
            .await
            .map_err(CoreError::storage)
    }

    async fn list_locks(&self, document_id: DbId) -> Result<Vec<SectionLock>, CoreError> {
        let rows = SectionLockRepo::list_for_document(&self.pool, document_id)
            .await
            .map_err(CoreError::storage)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_expired_locks(
        &self,
        document_id: Option<DbId>,
        cutoff: Timestamp,
    ) -> Result<u64, CoreError> {
        SectionLockRepo::delete_expired(&self.pool, document_id, cutoff)
            .await
            .map_err(CoreError::storage)
    }
}

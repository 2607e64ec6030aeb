//! Persistence seams used by the engine.
//!
//! Implementations must make each method atomic with respect to other
//! callers of the same store. Only [`WikiEngine`](crate::engine::WikiEngine)
//! is expected to call the mutating methods. Revisions are written only
//! through [`DocumentStore::commit_document`].

use async_trait::async_trait;
use chrono::Duration;

use crate::document::DocumentRecord;
use crate::error::CoreError;
use crate::lock::{SectionKey, SectionLock};
use crate::revision::{HistoryChange, Revision};
use crate::types::{DbId, Timestamp};

/// Current-state document rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. The returned record carries its assigned id.
    async fn insert_document(&self, record: &DocumentRecord) -> Result<DocumentRecord, CoreError>;

    async fn find_document(&self, id: DbId) -> Result<Option<DocumentRecord>, CoreError>;

    /// Overwrite the stored row with `record` and apply `history`, if the
    /// stored `lock_version` still equals `expected_lock_version`.
    ///
    /// Both writes land or neither does. Returns `false` when another
    /// writer got there first; an error from the history write leaves the
    /// document row untouched.
    async fn commit_document(
        &self,
        record: &DocumentRecord,
        expected_lock_version: i32,
        history: &HistoryChange,
    ) -> Result<bool, CoreError>;

    /// Drop the rendered caches of the given documents. Returns the number
    /// of rows touched.
    async fn clear_rendered(&self, ids: &[DbId]) -> Result<u64, CoreError>;
}

/// Read access to revision history.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// All revisions of a document, ascending by number.
    async fn list_revisions(&self, document_id: DbId) -> Result<Vec<Revision>, CoreError>;

    async fn find_revision(
        &self,
        document_id: DbId,
        revision_number: i32,
    ) -> Result<Option<Revision>, CoreError>;

    async fn latest_revision(&self, document_id: DbId) -> Result<Option<Revision>, CoreError>;

    /// The most recent revision saved at or before `time`.
    async fn find_revision_since(
        &self,
        document_id: DbId,
        time: Timestamp,
    ) -> Result<Option<Revision>, CoreError>;
}

/// The section lock side table.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create or refresh `holder`'s lock on `section`, or fail with
    /// [`CoreError::SectionLocked`] if another active lock conflicts.
    /// The check and the write happen atomically.
    async fn acquire_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
        now: Timestamp,
        timeout: Duration,
    ) -> Result<SectionLock, CoreError>;

    /// Returns `true` if a lock was removed.
    async fn release_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
    ) -> Result<bool, CoreError>;

    /// Remove every lock `holder_id` has on the document.
    async fn release_all_locks(&self, document_id: DbId, holder_id: DbId)
        -> Result<u64, CoreError>;

    /// Remove every lock on the document, whoever holds it.
    async fn break_locks(&self, document_id: DbId) -> Result<u64, CoreError>;

    /// All stored locks of a document, expired ones included.
    async fn list_locks(&self, document_id: DbId) -> Result<Vec<SectionLock>, CoreError>;

    /// Delete locks acquired before `cutoff`, on one document or on all.
    async fn delete_expired_locks(
        &self,
        document_id: Option<DbId>,
        cutoff: Timestamp,
    ) -> Result<u64, CoreError>;
}

/// Everything the engine needs from persistence.
pub trait WikiStore: DocumentStore + RevisionStore + LockStore {}

impl<T: DocumentStore + RevisionStore + LockStore> WikiStore for T {}

//! In-process implementation of the store traits.
//!
//! Thread-safe via an interior `RwLock`; designed to be wrapped in `Arc`
//! and shared between tasks. Useful for tests and single-node setups where
//! nothing else needs to see the data.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::RwLock;

use crate::document::DocumentRecord;
use crate::error::CoreError;
use crate::lock::{self, SectionKey, SectionLock};
use crate::revision::{HistoryChange, Revision, RevisionWrite};
use crate::store::{DocumentStore, LockStore, RevisionStore};
use crate::types::{DbId, Timestamp};

#[derive(Debug, Default)]
struct MemoryState {
    next_document_id: DbId,
    next_revision_id: DbId,
    documents: HashMap<DbId, DocumentRecord>,
    /// Kept sorted by revision number.
    revisions: HashMap<DbId, Vec<Revision>>,
    locks: Vec<SectionLock>,
}

/// Documents, revisions and locks held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_revision(id: DbId, write: &RevisionWrite) -> Revision {
    Revision {
        id,
        document_id: write.document_id,
        revision_number: write.revision_number,
        source_text: write.source_text.clone(),
        rendered_html: write.rendered_html.clone(),
        editor_id: write.editor_id,
        updated_at: write.updated_at,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_document(&self, record: &DocumentRecord) -> Result<DocumentRecord, CoreError> {
        let mut state = self.state.write().await;
        state.next_document_id += 1;
        let stored = DocumentRecord {
            id: state.next_document_id,
            ..record.clone()
        };
        state.documents.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_document(&self, id: DbId) -> Result<Option<DocumentRecord>, CoreError> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn commit_document(
        &self,
        record: &DocumentRecord,
        expected_lock_version: i32,
        history: &HistoryChange,
    ) -> Result<bool, CoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        match state.documents.get(&record.id) {
            Some(stored) if stored.lock_version == expected_lock_version => {}
            Some(_) => return Ok(false),
            None => {
                return Err(CoreError::NotFound {
                    entity: "document",
                    id: record.id,
                })
            }
        }

        // Every check that can fail runs before the first write.
        let revisions = state.revisions.entry(record.id).or_default();
        match history {
            HistoryChange::Append(write) => {
                if revisions
                    .iter()
                    .any(|r| r.revision_number == write.revision_number)
                {
                    return Err(CoreError::storage(format!(
                        "revision {} already exists for document {}",
                        write.revision_number, record.id
                    )));
                }
                state.next_revision_id += 1;
                revisions.push(new_revision(state.next_revision_id, write));
                revisions.sort_by_key(|r| r.revision_number);
            }
            HistoryChange::Amend(write) => {
                let existing = revisions
                    .iter_mut()
                    .find(|r| r.revision_number == write.revision_number)
                    .ok_or(CoreError::RevisionNotFound {
                        document_id: record.id,
                        revision: write.revision_number,
                    })?;
                *existing = new_revision(existing.id, write);
            }
            HistoryChange::TruncateAfter(revision_number) => {
                revisions.retain(|r| r.revision_number <= *revision_number);
            }
            HistoryChange::Keep => {}
        }

        state.documents.insert(record.id, record.clone());
        Ok(true)
    }

    async fn clear_rendered(&self, ids: &[DbId]) -> Result<u64, CoreError> {
        let mut state = self.state.write().await;
        let mut cleared = 0;
        for id in ids {
            if let Some(stored) = state.documents.get_mut(id) {
                stored.rendered_html = None;
                stored.structure = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl RevisionStore for MemoryStore {
    async fn list_revisions(&self, document_id: DbId) -> Result<Vec<Revision>, CoreError> {
        let state = self.state.read().await;
        Ok(state
            .revisions
            .get(&document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_revision(
        &self,
        document_id: DbId,
        revision_number: i32,
    ) -> Result<Option<Revision>, CoreError> {
        let state = self.state.read().await;
        Ok(state.revisions.get(&document_id).and_then(|history| {
            history
                .iter()
                .find(|r| r.revision_number == revision_number)
                .cloned()
        }))
    }

    async fn latest_revision(&self, document_id: DbId) -> Result<Option<Revision>, CoreError> {
        let state = self.state.read().await;
        Ok(state
            .revisions
            .get(&document_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn find_revision_since(
        &self,
        document_id: DbId,
        time: Timestamp,
    ) -> Result<Option<Revision>, CoreError> {
        let state = self.state.read().await;
        Ok(state.revisions.get(&document_id).and_then(|history| {
            history
                .iter()
                .filter(|r| r.updated_at <= time)
                .max_by_key(|r| (r.updated_at, r.revision_number))
                .cloned()
        }))
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn acquire_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
        now: Timestamp,
        timeout: Duration,
    ) -> Result<SectionLock, CoreError> {
        let mut state = self.state.write().await;
        let existing: Vec<SectionLock> = state
            .locks
            .iter()
            .filter(|l| l.document_id == document_id)
            .cloned()
            .collect();
        lock::check_available(&existing, section, holder_id, now, timeout)?;

        // The slot is free, held by us, or held by an expired lock.
        state
            .locks
            .retain(|l| !(l.document_id == document_id && l.section == *section));
        let acquired = SectionLock {
            document_id,
            section: section.clone(),
            holder_id,
            acquired_at: now,
        };
        state.locks.push(acquired.clone());
        Ok(acquired)
    }

    async fn release_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.write().await;
        let before = state.locks.len();
        state.locks.retain(|l| {
            !(l.document_id == document_id && l.section == *section && l.holder_id == holder_id)
        });
        Ok(state.locks.len() < before)
    }

    async fn release_all_locks(
        &self,
        document_id: DbId,
        holder_id: DbId,
    ) -> Result<u64, CoreError> {
        let mut state = self.state.write().await;
        let before = state.locks.len();
        state
            .locks
            .retain(|l| !(l.document_id == document_id && l.holder_id == holder_id));
        Ok((before - state.locks.len()) as u64)
    }

    async fn break_locks(&self, document_id: DbId) -> Result<u64, CoreError> {
        let mut state = self.state.write().await;
        let before = state.locks.len();
        state.locks.retain(|l| l.document_id != document_id);
        Ok((before - state.locks.len()) as u64)
    }

    async fn list_locks(&self, document_id: DbId) -> Result<Vec<SectionLock>, CoreError> {
        let state = self.state.read().await;
        Ok(state
            .locks
            .iter()
            .filter(|l| l.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn delete_expired_locks(
        &self,
        document_id: Option<DbId>,
        cutoff: Timestamp,
    ) -> Result<u64, CoreError> {
        let mut state = self.state.write().await;
        let before = state.locks.len();
        state.locks.retain(|l| {
            let in_scope = document_id.map_or(true, |id| id == l.document_id);
            !(in_scope && l.acquired_at < cutoff)
        });
        Ok((before - state.locks.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

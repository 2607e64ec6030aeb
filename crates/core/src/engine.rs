//! Document aggregate orchestration.
//!
//! [`WikiEngine`] is the single write path for documents, their revision
//! history and their section locks. Every mutation goes through the save
//! pipeline in [`WikiEngine::persist`]:
//!
//! 1. re-render if the caches are stale,
//! 2. decide between a new revision and amending the latest one,
//! 3. commit the document (conditional on its `lock_version`) together
//!    with the appended or amended revision,
//! 4. reload the in-memory revision list.
//!
//! A failing step aborts the ones after it. Step 3 is a single store
//! operation, so the document row never runs ahead of its history.

use crate::config::WikiConfig;
use crate::document::{Document, DocumentRecord};
use crate::error::CoreError;
use crate::lock::{self, SectionKey, SectionLock};
use crate::render::RenderContext;
use crate::revision::{
    decide_save, HistoryChange, PendingSave, Revision, RevisionWrite, SaveDecision,
};
use crate::store::WikiStore;
use crate::structure::Structure;
use crate::types::{DbId, Timestamp};

/// A loaded document together with its revision history.
#[derive(Debug, Clone)]
pub struct Wiki {
    document: Document,
    revisions: Vec<Revision>,
}

impl Wiki {
    pub fn id(&self) -> DbId {
        self.document.id()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable access for body edits that are later persisted with
    /// [`WikiEngine::save`].
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Revision history, ascending. Always reflects the last persist.
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn latest_revision(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    pub fn rendered_html(&mut self, render: RenderContext<'_>) -> &str {
        self.document.rendered_html(render.renderer, render.links)
    }

    pub fn structure(&mut self, render: RenderContext<'_>) -> &Structure {
        self.document.structure(render.renderer, render.links)
    }

    /// Current text of one section, to prefill a section editor.
    pub fn section_text(&mut self, id: &str, render: RenderContext<'_>) -> Result<String, CoreError> {
        self.document.section_text(id, render.renderer, render.links)
    }
}

/// An edit submission.
#[derive(Debug, Clone, Copy)]
pub struct Edit<'a> {
    pub editor_id: DbId,
    /// Revision the editor last read. `None` skips the staleness check.
    pub baseline: Option<i32>,
    pub text: &'a str,
    pub now: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    /// Regular edit: successive saves in one editing session coalesce.
    Edit,
    /// Revert: never coalesced, so the revert shows up in history.
    Revert,
}

/// Versioned document engine over a [`WikiStore`].
pub struct WikiEngine<S> {
    store: S,
    config: WikiConfig,
}

impl<S: WikiStore> WikiEngine<S> {
    pub fn new(store: S, config: WikiConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Loading and creating
    // -----------------------------------------------------------------------

    /// Create a document and its first revision.
    pub async fn create(
        &self,
        editor_id: Option<DbId>,
        body: &str,
        render: RenderContext<'_>,
        now: Timestamp,
    ) -> Result<Wiki, CoreError> {
        let record = self
            .store
            .insert_document(&DocumentRecord::new(body, editor_id, now))
            .await?;
        let mut wiki = Wiki {
            document: Document::from_record(record),
            revisions: Vec::new(),
        };
        self.persist(&mut wiki, render, now, SaveMode::Edit).await?;

        tracing::info!(document_id = wiki.id(), editor_id = ?editor_id, "Document created");
        Ok(wiki)
    }

    pub async fn load(&self, id: DbId) -> Result<Wiki, CoreError> {
        let record = self
            .store
            .find_document(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "document",
                id,
            })?;
        let revisions = self.store.list_revisions(id).await?;
        Ok(Wiki {
            document: Document::from_record(record),
            revisions,
        })
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Persist whatever body the caller set through
    /// [`Wiki::document_mut`]. No baseline or lock checks are made.
    pub async fn save(
        &self,
        wiki: &mut Wiki,
        editor_id: Option<DbId>,
        render: RenderContext<'_>,
        now: Timestamp,
    ) -> Result<SaveDecision, CoreError> {
        wiki.document.set_editor(editor_id, now);
        self.persist(wiki, render, now, SaveMode::Edit).await
    }

    /// Replace one section (or, for [`SectionKey::Document`], the whole
    /// body) on behalf of `edit.editor_id`.
    ///
    /// Fails with `StaleRevision` when the baseline is behind, with
    /// `SectionLocked` when another editor holds an overlapping active lock,
    /// and with `SectionNotFound` for an unknown heading. On success the
    /// editor's lock on the section is released.
    pub async fn update_section(
        &self,
        wiki: &mut Wiki,
        section: &SectionKey,
        edit: Edit<'_>,
        render: RenderContext<'_>,
    ) -> Result<SaveDecision, CoreError> {
        let document_id = wiki.id();
        let current = wiki.document.revision_number();

        if let Some(baseline) = edit.baseline {
            if baseline < current {
                tracing::warn!(
                    document_id,
                    baseline,
                    current,
                    editor_id = edit.editor_id,
                    "Rejected edit against stale revision"
                );
                return Err(CoreError::StaleRevision { current });
            }
        }

        let locks = self.store.list_locks(document_id).await?;
        if let Some(held) = lock::find_conflict(
            &locks,
            section,
            edit.editor_id,
            edit.now,
            self.config.lock_timeout,
        ) {
            tracing::warn!(
                document_id,
                section = %section,
                holder_id = held.holder_id,
                editor_id = edit.editor_id,
                "Rejected edit of locked section"
            );
            return Err(held.to_error());
        }

        let body = match section {
            SectionKey::Document => edit.text.to_string(),
            SectionKey::Heading(id) => {
                wiki.document
                    .body_with_section(id, edit.text, render.renderer, render.links)?
            }
        };
        wiki.document.set_body(body);
        wiki.document.set_editor(Some(edit.editor_id), edit.now);

        let decision = self.persist(wiki, render, edit.now, SaveMode::Edit).await?;

        self.store
            .release_lock(document_id, section, edit.editor_id)
            .await?;
        self.store
            .delete_expired_locks(
                Some(document_id),
                lock::expiry_cutoff(edit.now, self.config.lock_timeout),
            )
            .await?;

        tracing::info!(
            document_id,
            section = %section,
            editor_id = edit.editor_id,
            revision = wiki.document.revision_number(),
            ?decision,
            "Section updated"
        );
        Ok(decision)
    }

    /// [`update_section`](Self::update_section) for the whole document.
    pub async fn update_document(
        &self,
        wiki: &mut Wiki,
        edit: Edit<'_>,
        render: RenderContext<'_>,
    ) -> Result<SaveDecision, CoreError> {
        self.update_section(wiki, &SectionKey::Document, edit, render)
            .await
    }

    // -----------------------------------------------------------------------
    // Reverting
    // -----------------------------------------------------------------------

    /// Copy revision `revision_number`'s body into a new revision, keeping
    /// all history.
    pub async fn revert_to_revision(
        &self,
        wiki: &mut Wiki,
        revision_number: i32,
        editor_id: DbId,
        render: RenderContext<'_>,
        now: Timestamp,
    ) -> Result<SaveDecision, CoreError> {
        let revision = self.revision(wiki.id(), revision_number).await?;
        wiki.document.set_body(revision.source_text);
        wiki.document.set_editor(Some(editor_id), now);
        let decision = self.persist(wiki, render, now, SaveMode::Revert).await?;

        tracing::info!(
            document_id = wiki.id(),
            reverted_to = revision_number,
            revision = wiki.document.revision_number(),
            editor_id,
            "Document reverted"
        );
        Ok(decision)
    }

    /// Roll the document back to revision `revision_number` and delete
    /// every later revision.
    pub async fn revert_to_revision_destructive(
        &self,
        wiki: &mut Wiki,
        revision_number: i32,
        editor_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        let document_id = wiki.id();
        let revision = self.revision(document_id, revision_number).await?;

        wiki.document.set_body(revision.source_text);
        wiki.document
            .set_editor(editor_id.or(revision.editor_id), now);
        let deleted = wiki
            .revisions
            .iter()
            .filter(|r| r.revision_number > revision_number)
            .count();
        let lock_version = self
            .write_document(
                &wiki.document,
                revision_number,
                &HistoryChange::TruncateAfter(revision_number),
            )
            .await?;
        wiki.document.mark_persisted(revision_number, lock_version);
        wiki.revisions = self.store.list_revisions(document_id).await?;

        tracing::info!(
            document_id,
            reverted_to = revision_number,
            deleted,
            "Document reverted, later revisions deleted"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    pub async fn revisions(&self, document_id: DbId) -> Result<Vec<Revision>, CoreError> {
        self.store.list_revisions(document_id).await
    }

    pub async fn revision(
        &self,
        document_id: DbId,
        revision_number: i32,
    ) -> Result<Revision, CoreError> {
        self.store
            .find_revision(document_id, revision_number)
            .await?
            .ok_or(CoreError::RevisionNotFound {
                document_id,
                revision: revision_number,
            })
    }

    /// Two revisions, for an external diff view.
    pub async fn revision_pair(
        &self,
        document_id: DbId,
        old: i32,
        new: i32,
    ) -> Result<(Revision, Revision), CoreError> {
        let old = self.revision(document_id, old).await?;
        let new = self.revision(document_id, new).await?;
        Ok((old, new))
    }

    /// The revision a reader saw when they last viewed the document at
    /// `last_viewed`. `None` when they never viewed it.
    pub async fn first_revision_since(
        &self,
        document_id: DbId,
        last_viewed: Option<Timestamp>,
    ) -> Result<Option<Revision>, CoreError> {
        match last_viewed {
            Some(time) => self.store.find_revision_since(document_id, time).await,
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    pub async fn acquire_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
        now: Timestamp,
    ) -> Result<SectionLock, CoreError> {
        let acquired = self
            .store
            .acquire_lock(document_id, section, holder_id, now, self.config.lock_timeout)
            .await
            .inspect_err(|e| {
                tracing::debug!(document_id, section = %section, holder_id, error = %e, "Lock denied");
            })?;

        tracing::info!(document_id, section = %section, holder_id, "Lock acquired");
        Ok(acquired)
    }

    pub async fn release_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
    ) -> Result<bool, CoreError> {
        let released = self
            .store
            .release_lock(document_id, section, holder_id)
            .await?;
        if released {
            tracing::info!(document_id, section = %section, holder_id, "Lock released");
        }
        Ok(released)
    }

    /// Release every lock `holder_id` has on the document.
    pub async fn release_all_locks(
        &self,
        document_id: DbId,
        holder_id: DbId,
    ) -> Result<u64, CoreError> {
        self.store.release_all_locks(document_id, holder_id).await
    }

    /// Remove every lock on the document regardless of holder.
    pub async fn break_locks(&self, document_id: DbId) -> Result<u64, CoreError> {
        let broken = self.store.break_locks(document_id).await?;
        tracing::info!(document_id, broken, "Locks broken");
        Ok(broken)
    }

    /// Whether someone other than `asking_user` blocks `section`.
    pub async fn is_locked_for(
        &self,
        document_id: DbId,
        section: &SectionKey,
        asking_user: DbId,
        now: Timestamp,
    ) -> Result<bool, CoreError> {
        let locks = self.store.list_locks(document_id).await?;
        Ok(lock::find_conflict(&locks, section, asking_user, now, self.config.lock_timeout).is_some())
    }

    pub async fn sections_locked_for(
        &self,
        document_id: DbId,
        user: DbId,
        now: Timestamp,
    ) -> Result<Vec<SectionKey>, CoreError> {
        let locks = self.store.list_locks(document_id).await?;
        Ok(lock::sections_locked_for(
            &locks,
            user,
            now,
            self.config.lock_timeout,
        ))
    }

    /// The section `user` holds a lock on, so an editor can be reopened.
    pub async fn currently_editing(
        &self,
        document_id: DbId,
        user: DbId,
        now: Timestamp,
    ) -> Result<Option<SectionKey>, CoreError> {
        let locks = self.store.list_locks(document_id).await?;
        Ok(lock::currently_editing(
            &locks,
            user,
            now,
            self.config.lock_timeout,
        ))
    }

    // -----------------------------------------------------------------------
    // Cache maintenance
    // -----------------------------------------------------------------------

    /// Drop the stored HTML of documents whose rendering depends on
    /// something outside their body (for example a renamed owner).
    pub async fn invalidate_rendered(&self, ids: &[DbId]) -> Result<u64, CoreError> {
        let cleared = self.store.clear_rendered(ids).await?;
        tracing::debug!(cleared, "Rendered caches cleared");
        Ok(cleared)
    }

    // -----------------------------------------------------------------------
    // Save pipeline
    // -----------------------------------------------------------------------

    async fn persist(
        &self,
        wiki: &mut Wiki,
        render: RenderContext<'_>,
        now: Timestamp,
        mode: SaveMode,
    ) -> Result<SaveDecision, CoreError> {
        let document_id = wiki.id();

        wiki.document.ensure_rendered(render.renderer, render.links);

        let session_window = match mode {
            SaveMode::Edit => Some(self.config.edit_session_window),
            SaveMode::Revert => None,
        };
        let latest = wiki.revisions.last();
        let decision = decide_save(
            latest,
            &PendingSave {
                body: wiki.document.source_text(),
                body_changed: wiki.document.body_changed(),
                editor_id: wiki.document.editor_id(),
                now,
                session_window,
            },
        );
        let latest_number = latest.map_or(0, |r| r.revision_number);
        let revision_number = match decision {
            SaveDecision::CreateRevision => latest_number + 1,
            SaveDecision::AmendLatest | SaveDecision::DocumentOnly => latest_number,
        };

        let write = RevisionWrite {
            document_id,
            revision_number,
            source_text: wiki.document.source_text().to_string(),
            rendered_html: wiki.document.cached_html().unwrap_or_default().to_string(),
            editor_id: wiki.document.editor_id(),
            updated_at: now,
        };
        let history = match decision {
            SaveDecision::CreateRevision => HistoryChange::Append(write),
            SaveDecision::AmendLatest => HistoryChange::Amend(write),
            SaveDecision::DocumentOnly => HistoryChange::Keep,
        };

        let lock_version = self
            .write_document(&wiki.document, revision_number, &history)
            .await?;
        wiki.document.mark_persisted(revision_number, lock_version);

        match decision {
            SaveDecision::CreateRevision => {
                tracing::info!(document_id, revision = revision_number, editor_id = ?wiki.document.editor_id(), "Revision created");
            }
            SaveDecision::AmendLatest => {
                tracing::debug!(document_id, revision = revision_number, "Latest revision amended");
            }
            SaveDecision::DocumentOnly => {
                tracing::debug!(document_id, "Blank body saved without touching history");
            }
        }

        wiki.revisions = self.store.list_revisions(document_id).await?;
        debug_assert_eq!(
            wiki.revisions.last().map(|r| r.revision_number),
            Some(wiki.document.revision_number()),
        );
        Ok(decision)
    }

    /// Commit the document row with a bumped `lock_version` together with
    /// `history`, failing with `StaleRevision` if another session persisted
    /// since it was loaded.
    async fn write_document(
        &self,
        document: &Document,
        revision_number: i32,
        history: &HistoryChange,
    ) -> Result<i32, CoreError> {
        let expected = document.lock_version();
        let record = DocumentRecord {
            revision_number,
            lock_version: expected + 1,
            ..document.record().clone()
        };
        if self
            .store
            .commit_document(&record, expected, history)
            .await?
        {
            return Ok(record.lock_version);
        }

        let current = self
            .store
            .find_document(document.id())
            .await?
            .map_or(document.revision_number(), |stored| stored.revision_number);
        tracing::warn!(
            document_id = document.id(),
            expected_lock_version = expected,
            current,
            "Concurrent save detected"
        );
        Err(CoreError::StaleRevision { current })
    }
}

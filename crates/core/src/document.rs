//! The document's current state and its derived caches.
//!
//! [`DocumentRecord`] is the persisted row shape. [`Document`] wraps it and
//! owns the freshness rules: writing the body drops both caches, and reading
//! either cache re-renders both together when one is missing.

use serde::Serialize;

use crate::error::CoreError;
use crate::render::{LinkContext, Renderer};
use crate::structure::Structure;
use crate::types::{DbId, Timestamp};

/// A row of the `documents` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: DbId,
    pub source_text: String,
    /// `None` means stale.
    pub rendered_html: Option<String>,
    /// `None` means stale.
    pub structure: Option<Structure>,
    /// Number of the latest revision (0 before the first save).
    pub revision_number: i32,
    /// Bumped on every persist; guards against concurrent writers.
    pub lock_version: i32,
    pub editor_id: Option<DbId>,
    pub updated_at: Timestamp,
}

impl DocumentRecord {
    /// A record that has not been persisted yet. The store assigns `id`.
    pub fn new(source_text: impl Into<String>, editor_id: Option<DbId>, now: Timestamp) -> Self {
        Self {
            id: 0,
            source_text: source_text.into(),
            rendered_html: None,
            structure: None,
            revision_number: 0,
            lock_version: 0,
            editor_id,
            updated_at: now,
        }
    }
}

/// In-memory document with cache bookkeeping.
#[derive(Debug, Clone)]
pub struct Document {
    record: DocumentRecord,
    /// Body as of the last persist, used for the "body changed" decision.
    saved_body: String,
    body_changed: bool,
}

impl Document {
    pub fn from_record(record: DocumentRecord) -> Self {
        let saved_body = record.source_text.clone();
        Self {
            record,
            saved_body,
            body_changed: false,
        }
    }

    pub fn record(&self) -> &DocumentRecord {
        &self.record
    }

    pub fn id(&self) -> DbId {
        self.record.id
    }

    pub fn source_text(&self) -> &str {
        &self.record.source_text
    }

    pub fn revision_number(&self) -> i32 {
        self.record.revision_number
    }

    pub fn lock_version(&self) -> i32 {
        self.record.lock_version
    }

    pub fn editor_id(&self) -> Option<DbId> {
        self.record.editor_id
    }

    pub fn updated_at(&self) -> Timestamp {
        self.record.updated_at
    }

    /// Whether the body differs from what was last persisted.
    pub fn body_changed(&self) -> bool {
        self.body_changed
    }

    /// Replace the body. Always drops both caches, even when the text is
    /// identical; only a real difference counts as a change.
    pub fn set_body(&mut self, body: impl Into<String>) {
        let body = body.into();
        self.body_changed = body != self.saved_body;
        self.record.source_text = body;
        self.clear_rendered();
    }

    /// Drop both derived caches, e.g. after the link namespace changed.
    pub fn clear_rendered(&mut self) {
        self.record.rendered_html = None;
        self.record.structure = None;
    }

    pub fn needs_rendering(&self) -> bool {
        self.record.rendered_html.is_none() || self.record.structure.is_none()
    }

    /// Re-render both caches in one pass if either is stale.
    pub fn ensure_rendered(&mut self, renderer: &dyn Renderer, links: &dyn LinkContext) {
        if !self.needs_rendering() {
            return;
        }
        let prefix = links.resolve(self);
        let rendered = renderer.render(&self.record.source_text, &prefix);
        self.record.rendered_html = Some(rendered.html);
        self.record.structure = Some(rendered.structure);
        debug_assert!(!self.needs_rendering());
    }

    /// Rendered HTML, never stale relative to the body.
    pub fn rendered_html(&mut self, renderer: &dyn Renderer, links: &dyn LinkContext) -> &str {
        self.ensure_rendered(renderer, links);
        self.record.rendered_html.as_deref().unwrap_or_default()
    }

    /// Outline, never stale relative to the body.
    pub fn structure(&mut self, renderer: &dyn Renderer, links: &dyn LinkContext) -> &Structure {
        self.ensure_rendered(renderer, links);
        static EMPTY: Structure = Structure::EMPTY;
        self.record.structure.as_ref().unwrap_or(&EMPTY)
    }

    /// The body with section `id` replaced by `text`, computed against a
    /// fresh outline. The document itself is left unchanged.
    pub fn body_with_section(
        &mut self,
        id: &str,
        text: &str,
        renderer: &dyn Renderer,
        links: &dyn LinkContext,
    ) -> Result<String, CoreError> {
        self.ensure_rendered(renderer, links);
        let structure = self.record.structure.as_ref().ok_or_else(|| {
            CoreError::Internal("structure missing right after rendering".into())
        })?;
        structure.replace_section(&self.record.source_text, id, text)
    }

    /// Text of section `id` in the current body.
    pub fn section_text(
        &mut self,
        id: &str,
        renderer: &dyn Renderer,
        links: &dyn LinkContext,
    ) -> Result<String, CoreError> {
        self.ensure_rendered(renderer, links);
        let structure = self.record.structure.as_ref().ok_or_else(|| {
            CoreError::Internal("structure missing right after rendering".into())
        })?;
        structure
            .text_for(&self.record.source_text, id)
            .map(str::to_string)
    }

    /// Cached HTML without triggering a render (persistence snapshots).
    pub fn cached_html(&self) -> Option<&str> {
        self.record.rendered_html.as_deref()
    }

    pub fn set_editor(&mut self, editor_id: Option<DbId>, now: Timestamp) {
        self.record.editor_id = editor_id;
        self.record.updated_at = now;
    }

    /// Record what was just written by the store.
    pub(crate) fn mark_persisted(&mut self, revision_number: i32, lock_version: i32) {
        self.record.revision_number = revision_number;
        self.record.lock_version = lock_version;
        self.saved_body = self.record.source_text.clone();
        self.body_changed = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

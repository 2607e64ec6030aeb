//! Revision history records and the "new revision or amend" decision.

use chrono::Duration;
use serde::Serialize;

use crate::types::{DbId, Timestamp};

/// A row of the `revisions` table: an immutable snapshot of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Revision {
    pub id: DbId,
    pub document_id: DbId,
    pub revision_number: i32,
    pub source_text: String,
    /// Rendered HTML at save time. Never recomputed afterwards.
    pub rendered_html: String,
    pub editor_id: Option<DbId>,
    pub updated_at: Timestamp,
}

impl Revision {
    /// Whether the stored body is blank (empty or whitespace only).
    pub fn is_blank(&self) -> bool {
        self.source_text.trim().is_empty()
    }
}

/// Values written by an append or an amend of the latest revision.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionWrite {
    pub document_id: DbId,
    pub revision_number: i32,
    pub source_text: String,
    pub rendered_html: String,
    pub editor_id: Option<DbId>,
    pub updated_at: Timestamp,
}

/// What a persist does to the revision history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveDecision {
    /// Append revision `revision_number + 1`.
    CreateRevision,
    /// Overwrite the latest revision in place.
    AmendLatest,
    /// Persist the document only; history is left alone. Only chosen where
    /// a new blank revision would otherwise follow a non-blank one.
    DocumentOnly,
}

/// The history side of a document write. Stores apply it in the same
/// atomic step as the document row.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryChange {
    Append(RevisionWrite),
    Amend(RevisionWrite),
    /// Delete every revision numbered above this one.
    TruncateAfter(i32),
    Keep,
}

/// Inputs to [`decide_save`] describing the pending persist.
#[derive(Debug, Clone, Copy)]
pub struct PendingSave<'a> {
    pub body: &'a str,
    pub body_changed: bool,
    pub editor_id: Option<DbId>,
    pub now: Timestamp,
    /// Successive saves by the same editor inside this window amend the
    /// latest revision. `None` disables coalescing.
    pub session_window: Option<Duration>,
}

/// Decide whether a persist creates a new revision or amends the latest.
///
/// * No history yet: always create revision 1.
/// * Otherwise create a new revision only if the body changed, the latest
///   revision is not blank, and the save is not a continuation of the same
///   editor's session. Everything else amends the latest revision.
/// * A blank body that would create a revision after a non-blank one
///   touches the document only.
pub fn decide_save(latest: Option<&Revision>, pending: &PendingSave<'_>) -> SaveDecision {
    let Some(latest) = latest else {
        return SaveDecision::CreateRevision;
    };

    if !pending.body_changed || latest.is_blank() {
        return SaveDecision::AmendLatest;
    }

    if let Some(window) = pending.session_window {
        let same_editor = latest.editor_id == pending.editor_id;
        let recent = pending.now.signed_duration_since(latest.updated_at) < window;
        if same_editor && recent {
            return SaveDecision::AmendLatest;
        }
    }

    if pending.body.trim().is_empty() {
        return SaveDecision::DocumentOnly;
    }

    SaveDecision::CreateRevision
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

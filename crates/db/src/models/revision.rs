//! Revision row model.
//!
//! Revisions are immutable snapshots; only the latest one is ever amended.

use quire_core::revision::Revision;
use quire_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `revisions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RevisionRow {
    pub id: DbId,
    pub document_id: DbId,
    pub revision_number: i32,
    pub source_text: String,
    pub rendered_html: String,
    pub editor_id: Option<DbId>,
    pub updated_at: Timestamp,
    pub created_at: Timestamp,
}

impl From<RevisionRow> for Revision {
    fn from(row: RevisionRow) -> Self {
        Revision {
            id: row.id,
            document_id: row.document_id,
            revision_number: row.revision_number,
            source_text: row.source_text,
            rendered_html: row.rendered_html,
            editor_id: row.editor_id,
            updated_at: row.updated_at,
        }
    }
}

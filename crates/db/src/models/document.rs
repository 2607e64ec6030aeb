//! Document row model.

use quire_core::document::DocumentRecord;
use quire_core::structure::Structure;
use quire_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `documents` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DocumentRow {
    pub id: DbId,
    pub source_text: String,
    pub rendered_html: Option<String>,
    pub structure: Option<serde_json::Value>,
    pub revision_number: i32,
    pub lock_version: i32,
    pub editor_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<DocumentRow> for DocumentRecord {
    /// An outline that no longer deserializes is treated as a stale cache,
    /// so the next read re-renders it.
    fn from(row: DocumentRow) -> Self {
        let structure = row.structure.and_then(|value| {
            serde_json::from_value::<Structure>(value)
                .inspect_err(|e| {
                    tracing::warn!(document_id = row.id, error = %e, "Discarding unreadable outline");
                })
                .ok()
        });
        DocumentRecord {
            id: row.id,
            source_text: row.source_text,
            rendered_html: row.rendered_html,
            structure,
            revision_number: row.revision_number,
            lock_version: row.lock_version,
            editor_id: row.editor_id,
            updated_at: row.updated_at,
        }
    }
}

/// JSON form of a record's outline for the `structure` column.
pub fn structure_json(record: &DocumentRecord) -> Result<Option<serde_json::Value>, serde_json::Error> {
    record.structure.as_ref().map(serde_json::to_value).transpose()
}

//! Section lock row model.

use quire_core::lock::{SectionKey, SectionLock};
use quire_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `section_locks` table. `section_id` holds a heading
/// anchor or the whole-document sentinel.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SectionLockRow {
    pub id: DbId,
    pub document_id: DbId,
    pub section_id: String,
    pub holder_id: DbId,
    pub acquired_at: Timestamp,
}

impl From<SectionLockRow> for SectionLock {
    fn from(row: SectionLockRow) -> Self {
        SectionLock {
            document_id: row.document_id,
            section: SectionKey::parse(&row.section_id),
            holder_id: row.holder_id,
            acquired_at: row.acquired_at,
        }
    }
}

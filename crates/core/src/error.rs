use crate::types::{DbId, Timestamp};

/// Domain errors surfaced by the document engine.
///
/// `StaleRevision`, `SectionLocked`, `SectionNotFound` and
/// `RevisionNotFound` are expected, recoverable conditions: callers are
/// meant to re-read, wait, or pick a different target and try again.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Can't save your data, someone else has saved revision {current} first")]
    StaleRevision { current: i32 },

    #[error("Section '{section}' is locked by user {holder_id} since {acquired_at}")]
    SectionLocked {
        section: String,
        holder_id: DbId,
        acquired_at: Timestamp,
    },

    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("Revision {revision} not found for document {document_id}")]
    RevisionNotFound { document_id: DbId, revision: i32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap a persistence-layer error raised behind one of the store traits.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        CoreError::Storage(err.to_string())
    }
}

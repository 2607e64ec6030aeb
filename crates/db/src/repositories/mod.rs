//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or, for writes composed into a larger transaction, a
//! `&mut Transaction`) as the first argument and return `sqlx::Error`.

pub mod document_repo;
pub mod revision_repo;
pub mod section_lock_repo;

pub use document_repo::{CommitOutcome, DocumentRepo};
pub use revision_repo::RevisionRepo;
pub use section_lock_repo::{AcquireOutcome, SectionLockRepo};

//! Row structs for the wiki tables.
//!
//! Each submodule contains a `FromRow` struct matching the database row and
//! its conversion into the `quire-core` domain type.

pub mod document;
pub mod revision;
pub mod section_lock;

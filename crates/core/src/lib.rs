//! Versioned, collaboratively-edited document engine.
//!
//! Pure domain logic plus the store traits the persistence layer
//! implements. Nothing in here talks to a database directly; `quire-db`
//! provides the PostgreSQL stores and [`memory::MemoryStore`] backs tests
//! and single-process use.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod lock;
pub mod memory;
pub mod render;
pub mod revision;
pub mod store;
pub mod structure;
pub mod types;

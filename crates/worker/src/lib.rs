//! Background jobs for the document engine.

pub mod lock_sweep;

//! Advisory section locks.
//!
//! Locks are plain data rows `(document_id, section, holder, acquired_at)`.
//! Stores keep them; the functions here decide which of them are active
//! and whether a request conflicts. Expiry is lazy: a lock is inactive once
//! `now - acquired_at` exceeds the configured timeout.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Persisted section id for a whole-document lock. Heading anchors are
/// always lowercase, so this never collides with one.
pub const DOCUMENT_SECTION: &str = "ALL";

/// What a lock or an edit targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SectionKey {
    /// The whole document (structural edits).
    Document,
    /// A single section, by anchor id.
    Heading(String),
}

impl SectionKey {
    pub fn heading(id: impl Into<String>) -> Self {
        SectionKey::Heading(id.into())
    }

    /// Parse a persisted section id.
    pub fn parse(raw: &str) -> Self {
        if raw == DOCUMENT_SECTION {
            SectionKey::Document
        } else {
            SectionKey::Heading(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SectionKey::Document => DOCUMENT_SECTION,
            SectionKey::Heading(id) => id,
        }
    }

    /// Two targets overlap when they are equal or either is the whole
    /// document.
    pub fn overlaps(&self, other: &SectionKey) -> bool {
        self == other || *self == SectionKey::Document || *other == SectionKey::Document
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SectionKey> for String {
    fn from(key: SectionKey) -> Self {
        key.as_str().to_string()
    }
}

impl From<String> for SectionKey {
    fn from(raw: String) -> Self {
        SectionKey::parse(&raw)
    }
}

/// A row of the `section_locks` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionLock {
    pub document_id: DbId,
    pub section: SectionKey,
    pub holder_id: DbId,
    pub acquired_at: Timestamp,
}

impl SectionLock {
    pub fn is_expired(&self, now: Timestamp, timeout: Duration) -> bool {
        now.signed_duration_since(self.acquired_at) > timeout
    }

    pub fn is_active(&self, now: Timestamp, timeout: Duration) -> bool {
        !self.is_expired(now, timeout)
    }

    /// The error reported to someone blocked by this lock.
    pub fn to_error(&self) -> CoreError {
        CoreError::SectionLocked {
            section: self.section.to_string(),
            holder_id: self.holder_id,
            acquired_at: self.acquired_at,
        }
    }
}

/// Oldest `acquired_at` still considered active at `now`.
pub fn expiry_cutoff(now: Timestamp, timeout: Duration) -> Timestamp {
    now - timeout
}

/// The active lock held by someone other than `asking` that blocks work on
/// `section`, if any.
pub fn find_conflict<'a>(
    locks: &'a [SectionLock],
    section: &SectionKey,
    asking: DbId,
    now: Timestamp,
    timeout: Duration,
) -> Option<&'a SectionLock> {
    locks.iter().find(|lock| {
        lock.holder_id != asking && lock.is_active(now, timeout) && lock.section.overlaps(section)
    })
}

/// Fail with [`CoreError::SectionLocked`] if another holder blocks `section`.
pub fn check_available(
    locks: &[SectionLock],
    section: &SectionKey,
    asking: DbId,
    now: Timestamp,
    timeout: Duration,
) -> Result<(), CoreError> {
    match find_conflict(locks, section, asking, now, timeout) {
        Some(lock) => Err(lock.to_error()),
        None => Ok(()),
    }
}

/// Sections currently locked by anyone other than `user`.
pub fn sections_locked_for(
    locks: &[SectionLock],
    user: DbId,
    now: Timestamp,
    timeout: Duration,
) -> Vec<SectionKey> {
    locks
        .iter()
        .filter(|lock| lock.holder_id != user && lock.is_active(now, timeout))
        .map(|lock| lock.section.clone())
        .collect()
}

/// The section `user` is currently editing (holds an active lock on).
/// A whole-document lock wins over section locks.
pub fn currently_editing(
    locks: &[SectionLock],
    user: DbId,
    now: Timestamp,
    timeout: Duration,
) -> Option<SectionKey> {
    let mut held = locks
        .iter()
        .filter(|lock| lock.holder_id == user && lock.is_active(now, timeout));
    let first = held.next()?;
    if first.section == SectionKey::Document {
        return Some(SectionKey::Document);
    }
    match held.find(|lock| lock.section == SectionKey::Document) {
        Some(_) => Some(SectionKey::Document),
        None => Some(first.section.clone()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

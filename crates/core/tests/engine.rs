//! Integration tests for the document engine over the in-memory store.
//!
//! Covers the save pipeline end to end:
//! - revision numbering, session coalescing and blank bodies
//! - optimistic concurrency (stale baselines, concurrent writers)
//! - section locks (exclusion, expiry, release on edit)
//! - section edits, reverts and history queries

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use quire_core::config::WikiConfig;
use quire_core::document::DocumentRecord;
use quire_core::engine::{Edit, Wiki, WikiEngine};
use quire_core::error::CoreError;
use quire_core::lock::{SectionKey, SectionLock};
use quire_core::memory::MemoryStore;
use quire_core::render::{FixedLinkContext, HeadingRenderer, RenderContext, Rendered, Renderer};
use quire_core::revision::{HistoryChange, Revision, SaveDecision};
use quire_core::store::{DocumentStore, LockStore, RevisionStore};
use quire_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const GUIDE: &str = "h1. Intro\nhello\nh1. Usage\nrun it\n";

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn minutes(n: i64) -> Timestamp {
    t0() + Duration::minutes(n)
}

fn engine() -> WikiEngine<MemoryStore> {
    WikiEngine::new(MemoryStore::new(), WikiConfig::default())
}

fn render(links: &FixedLinkContext) -> RenderContext<'_> {
    RenderContext::new(&HeadingRenderer, links)
}

/// Replace `section` as `editor_id`, using the revision the wiki was loaded
/// at as the baseline.
async fn edit_section(
    engine: &WikiEngine<MemoryStore>,
    wiki: &mut Wiki,
    section: &SectionKey,
    editor_id: DbId,
    text: &str,
    now: Timestamp,
) -> Result<SaveDecision, CoreError> {
    let links = FixedLinkContext::default();
    let edit = Edit {
        editor_id,
        baseline: Some(wiki.document().revision_number()),
        text,
        now,
    };
    engine.update_section(wiki, section, edit, render(&links)).await
}

async fn edit_all(
    engine: &WikiEngine<MemoryStore>,
    wiki: &mut Wiki,
    editor_id: DbId,
    text: &str,
    now: Timestamp,
) -> Result<SaveDecision, CoreError> {
    edit_section(engine, wiki, &SectionKey::Document, editor_id, text, now).await
}

/// Counts how often it is invoked.
#[derive(Default)]
struct CountingRenderer {
    calls: AtomicUsize,
}

impl CountingRenderer {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for CountingRenderer {
    fn render(&self, source: &str, link_prefix: &str) -> Rendered {
        self.calls.fetch_add(1, Ordering::SeqCst);
        HeadingRenderer.render(source, link_prefix)
    }
}

/// Create a document by editor 1 at `t0` and push it to `revisions`
/// revisions, alternating editors one minute apart.
async fn with_revisions(
    engine: &WikiEngine<MemoryStore>,
    links: &FixedLinkContext,
    revisions: i32,
) -> Wiki {
    let mut wiki = engine
        .create(Some(1), "v1", render(links), t0())
        .await
        .unwrap();
    for n in 2..=revisions {
        let editor = DbId::from(n);
        let text = format!("v{n}");
        let at = minutes(i64::from(n));
        edit_all(engine, &mut wiki, editor, &text, at).await.unwrap();
    }
    assert_eq!(wiki.document().revision_number(), revisions);
    wiki
}

fn numbers(wiki: &Wiki) -> Vec<i32> {
    wiki.revisions().iter().map(|r| r.revision_number).collect()
}

/// A [`MemoryStore`] whose next document commit fails once armed, as a
/// dropped connection would.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_next_commit: AtomicBool,
}

impl FlakyStore {
    fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn insert_document(&self, record: &DocumentRecord) -> Result<DocumentRecord, CoreError> {
        self.inner.insert_document(record).await
    }

    async fn find_document(&self, id: DbId) -> Result<Option<DocumentRecord>, CoreError> {
        self.inner.find_document(id).await
    }

    async fn commit_document(
        &self,
        record: &DocumentRecord,
        expected_lock_version: i32,
        history: &HistoryChange,
    ) -> Result<bool, CoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(CoreError::storage("connection reset"));
        }
        self.inner
            .commit_document(record, expected_lock_version, history)
            .await
    }

    async fn clear_rendered(&self, ids: &[DbId]) -> Result<u64, CoreError> {
        self.inner.clear_rendered(ids).await
    }
}

#[async_trait]
impl RevisionStore for FlakyStore {
    async fn list_revisions(&self, document_id: DbId) -> Result<Vec<Revision>, CoreError> {
        self.inner.list_revisions(document_id).await
    }

    async fn find_revision(
        &self,
        document_id: DbId,
        revision_number: i32,
    ) -> Result<Option<Revision>, CoreError> {
        self.inner.find_revision(document_id, revision_number).await
    }

    async fn latest_revision(&self, document_id: DbId) -> Result<Option<Revision>, CoreError> {
        self.inner.latest_revision(document_id).await
    }

    async fn find_revision_since(
        &self,
        document_id: DbId,
        time: Timestamp,
    ) -> Result<Option<Revision>, CoreError> {
        self.inner.find_revision_since(document_id, time).await
    }
}

#[async_trait]
impl LockStore for FlakyStore {
    async fn acquire_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
        now: Timestamp,
        timeout: Duration,
    ) -> Result<SectionLock, CoreError> {
        self.inner
            .acquire_lock(document_id, section, holder_id, now, timeout)
            .await
    }

    async fn release_lock(
        &self,
        document_id: DbId,
        section: &SectionKey,
        holder_id: DbId,
    ) -> Result<bool, CoreError> {
        self.inner.release_lock(document_id, section, holder_id).await
    }

    async fn release_all_locks(
        &self,
        document_id: DbId,
        holder_id: DbId,
    ) -> Result<u64, CoreError> {
        self.inner.release_all_locks(document_id, holder_id).await
    }

    async fn break_locks(&self, document_id: DbId) -> Result<u64, CoreError> {
        self.inner.break_locks(document_id).await
    }

    async fn list_locks(&self, document_id: DbId) -> Result<Vec<SectionLock>, CoreError> {
        self.inner.list_locks(document_id).await
    }

    async fn delete_expired_locks(
        &self,
        document_id: Option<DbId>,
        cutoff: Timestamp,
    ) -> Result<u64, CoreError> {
        self.inner.delete_expired_locks(document_id, cutoff).await
    }
}

// ---------------------------------------------------------------------------
// Creating and loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_writes_first_revision() {
    let engine = engine();
    let links = FixedLinkContext::default();

    let wiki = engine
        .create(Some(1), GUIDE, render(&links), t0())
        .await
        .unwrap();

    assert_eq!(wiki.document().revision_number(), 1);
    assert_eq!(wiki.document().lock_version(), 1);
    assert_eq!(numbers(&wiki), [1]);
    let first = wiki.latest_revision().unwrap();
    assert_eq!(first.source_text, GUIDE);
    assert_eq!(first.editor_id, Some(1));
    assert!(first.rendered_html.contains("<a name=\"usage\">"));
}

#[tokio::test]
async fn create_with_blank_body_still_records_revision() {
    let engine = engine();
    let links = FixedLinkContext::default();

    let wiki = engine.create(None, "", render(&links), t0()).await.unwrap();
    assert_eq!(numbers(&wiki), [1]);
}

#[tokio::test]
async fn load_missing_document_fails() {
    let err = engine().load(42).await.unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "document", id: 42 });
}

#[tokio::test]
async fn saved_document_round_trips_without_rerendering() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let renderer = CountingRenderer::default();
    let ctx = RenderContext::new(&renderer, &links);

    let mut wiki = engine.create(Some(1), GUIDE, ctx, t0()).await.unwrap();
    let html = wiki.rendered_html(ctx).to_string();
    assert_eq!(renderer.calls(), 1);

    let mut loaded = engine.load(wiki.id()).await.unwrap();
    assert_eq!(loaded.document().source_text(), GUIDE);
    assert_eq!(loaded.rendered_html(ctx), html);
    assert_eq!(loaded.structure(ctx).sections().len(), 2);
    assert_eq!(renderer.calls(), 1);
    assert_eq!(numbers(&loaded), [1]);
}

#[tokio::test]
async fn reads_after_a_write_render_once() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let renderer = CountingRenderer::default();
    let ctx = RenderContext::new(&renderer, &links);

    let mut wiki = engine.create(Some(1), "old", ctx, t0()).await.unwrap();
    wiki.document_mut().set_body("new text");
    let first = wiki.rendered_html(ctx).to_string();
    let second = wiki.rendered_html(ctx).to_string();
    wiki.structure(ctx);

    assert_eq!(first, second);
    assert!(first.contains("new text"));
    assert_eq!(renderer.calls(), 2);
}

// ---------------------------------------------------------------------------
// Revision numbering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn different_editors_create_sequential_revisions() {
    let engine = engine();
    let links = FixedLinkContext::default();

    let wiki = with_revisions(&engine, &links, 4).await;
    assert_eq!(numbers(&wiki), [1, 2, 3, 4]);

    let stored = engine.revisions(wiki.id()).await.unwrap();
    assert_eq!(stored.last().unwrap().source_text, "v4");
    assert_eq!(stored.last().unwrap().editor_id, Some(4));
}

#[tokio::test]
async fn same_editor_inside_session_amends() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "draft", render(&links), t0()).await.unwrap();

    let decision = edit_all(&engine, &mut wiki, 1, "draft 2", minutes(5))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::AmendLatest);
    assert_eq!(numbers(&wiki), [1]);
    assert_eq!(wiki.latest_revision().unwrap().source_text, "draft 2");
    assert_eq!(wiki.latest_revision().unwrap().updated_at, minutes(5));
}

#[tokio::test]
async fn same_editor_after_session_creates() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "draft", render(&links), t0()).await.unwrap();

    edit_all(&engine, &mut wiki, 1, "draft 2", minutes(5))
        .await
        .unwrap();
    let decision = edit_all(&engine, &mut wiki, 1, "final", minutes(40))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::CreateRevision);
    assert_eq!(numbers(&wiki), [1, 2]);
    assert_eq!(wiki.revisions()[0].source_text, "draft 2");
}

#[tokio::test]
async fn other_editor_inside_session_creates() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "draft", render(&links), t0()).await.unwrap();

    let decision = edit_all(&engine, &mut wiki, 2, "review", minutes(1))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::CreateRevision);
    assert_eq!(numbers(&wiki), [1, 2]);
}

#[tokio::test]
async fn unchanged_body_does_not_grow_history() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "same", render(&links), t0()).await.unwrap();

    let decision = edit_all(&engine, &mut wiki, 2, "same", minutes(90))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::AmendLatest);
    assert_eq!(numbers(&wiki), [1]);
}

#[tokio::test]
async fn blank_body_is_never_recorded_over_content() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "content", render(&links), t0()).await.unwrap();

    let decision = edit_all(&engine, &mut wiki, 2, "   ", minutes(90))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::DocumentOnly);
    assert_eq!(wiki.document().source_text(), "   ");
    assert_eq!(numbers(&wiki), [1]);
    assert_eq!(wiki.revisions()[0].source_text, "content");

    let loaded = engine.load(wiki.id()).await.unwrap();
    assert_eq!(loaded.document().source_text(), "   ");
    assert!(loaded.revisions().iter().all(|r| !r.is_blank()));
}

#[tokio::test]
async fn blank_body_inside_session_amends_latest() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "draft", render(&links), t0()).await.unwrap();

    let decision = edit_all(&engine, &mut wiki, 1, "", minutes(5))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::AmendLatest);
    assert_eq!(numbers(&wiki), [1]);
    assert_eq!(wiki.revisions()[0].source_text, "");
    assert_eq!(wiki.document().source_text(), "");
}

#[tokio::test]
async fn first_content_replaces_blank_revision() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "", render(&links), t0()).await.unwrap();

    let decision = edit_all(&engine, &mut wiki, 2, "real text", minutes(90))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::AmendLatest);
    assert_eq!(numbers(&wiki), [1]);
    assert_eq!(wiki.revisions()[0].source_text, "real text");
    assert_eq!(wiki.revisions()[0].editor_id, Some(2));
}

#[tokio::test]
async fn plain_save_persists_document_mut_changes() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "before", render(&links), t0()).await.unwrap();

    wiki.document_mut().set_body("after");
    let decision = engine
        .save(&mut wiki, Some(2), render(&links), minutes(1))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::CreateRevision);
    let loaded = engine.load(wiki.id()).await.unwrap();
    assert_eq!(loaded.document().source_text(), "after");
    assert_eq!(loaded.document().editor_id(), Some(2));
    assert_eq!(loaded.document().revision_number(), 2);
}

// ---------------------------------------------------------------------------
// Optimistic concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_baseline_is_rejected() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = with_revisions(&engine, &links, 5).await;

    let stale = Edit {
        editor_id: 9,
        baseline: Some(4),
        text: "late edit",
        now: minutes(30),
    };
    let err = engine
        .update_document(&mut wiki, stale, render(&links))
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::StaleRevision { current: 5 });
    let loaded = engine.load(wiki.id()).await.unwrap();
    assert_eq!(loaded.document().source_text(), "v5");
    assert_eq!(numbers(&loaded), [1, 2, 3, 4, 5]);

    let current = Edit {
        baseline: Some(5),
        ..stale
    };
    engine
        .update_document(&mut wiki, current, render(&links))
        .await
        .unwrap();
    assert_eq!(numbers(&wiki), [1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn concurrent_writer_loses_on_lock_version() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let created = engine.create(Some(1), "base", render(&links), t0()).await.unwrap();

    let mut first = engine.load(created.id()).await.unwrap();
    let mut second = engine.load(created.id()).await.unwrap();

    edit_all(&engine, &mut first, 2, "first wins", minutes(1))
        .await
        .unwrap();
    let err = edit_all(&engine, &mut second, 3, "second loses", minutes(2))
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::StaleRevision { current: 2 });
    let loaded = engine.load(created.id()).await.unwrap();
    assert_eq!(loaded.document().source_text(), "first wins");
    assert_eq!(numbers(&loaded), [1, 2]);
}

// ---------------------------------------------------------------------------
// Storage failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_commit_leaves_store_and_numbering_intact() {
    let engine = WikiEngine::new(FlakyStore::default(), WikiConfig::default());
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "v1", render(&links), t0()).await.unwrap();

    engine.store().fail_next_commit();
    let edit = Edit {
        editor_id: 2,
        baseline: Some(1),
        text: "v2",
        now: minutes(1),
    };
    let err = engine
        .update_document(&mut wiki, edit, render(&links))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Storage(_));

    let stored = engine.store().find_document(wiki.id()).await.unwrap().unwrap();
    assert_eq!(stored.revision_number, 1);
    assert_eq!(stored.source_text, "v1");

    let mut reloaded = engine.load(wiki.id()).await.unwrap();
    let retry = Edit {
        editor_id: 3,
        text: "v3",
        now: minutes(2),
        ..edit
    };
    let decision = engine
        .update_document(&mut reloaded, retry, render(&links))
        .await
        .unwrap();
    assert_eq!(decision, SaveDecision::CreateRevision);
    assert_eq!(numbers(&reloaded), [1, 2]);
    assert_eq!(reloaded.revisions()[1].source_text, "v3");
    assert_eq!(reloaded.document().revision_number(), 2);

    // The copy that saw the failure is now behind.
    let err = engine
        .update_document(&mut wiki, edit, render(&links))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::StaleRevision { current: 2 });
}

#[tokio::test]
async fn failed_commit_can_be_retried_in_place() {
    let engine = WikiEngine::new(FlakyStore::default(), WikiConfig::default());
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "v1", render(&links), t0()).await.unwrap();

    engine.store().fail_next_commit();
    let edit = Edit {
        editor_id: 2,
        baseline: Some(1),
        text: "v2",
        now: minutes(1),
    };
    assert!(engine
        .update_document(&mut wiki, edit, render(&links))
        .await
        .is_err());
    assert_eq!(numbers(&wiki), [1]);

    engine
        .update_document(&mut wiki, edit, render(&links))
        .await
        .unwrap();
    assert_eq!(numbers(&wiki), [1, 2]);
    assert_eq!(engine.load(wiki.id()).await.unwrap().document().source_text(), "v2");
}

#[tokio::test]
async fn failed_destructive_revert_keeps_history() {
    let engine = WikiEngine::new(FlakyStore::default(), WikiConfig::default());
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "v1", render(&links), t0()).await.unwrap();
    let edit = Edit {
        editor_id: 2,
        baseline: Some(1),
        text: "v2",
        now: minutes(1),
    };
    engine
        .update_document(&mut wiki, edit, render(&links))
        .await
        .unwrap();

    engine.store().fail_next_commit();
    assert!(engine
        .revert_to_revision_destructive(&mut wiki, 1, Some(1), minutes(5))
        .await
        .is_err());

    let loaded = engine.load(wiki.id()).await.unwrap();
    assert_eq!(numbers(&loaded), [1, 2]);
    assert_eq!(loaded.document().revision_number(), 2);
    assert_eq!(loaded.document().source_text(), "v2");
}

// ---------------------------------------------------------------------------
// Section locks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn locks_are_mutually_exclusive() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();
    let intro = SectionKey::heading("intro");

    engine.acquire_lock(wiki.id(), &intro, 1, t0()).await.unwrap();

    let err = engine.acquire_lock(wiki.id(), &intro, 2, t0()).await.unwrap_err();
    assert_matches!(err, CoreError::SectionLocked { holder_id: 1, .. });
    let err = engine
        .acquire_lock(wiki.id(), &SectionKey::Document, 2, t0())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::SectionLocked { holder_id: 1, .. });

    engine
        .acquire_lock(wiki.id(), &SectionKey::heading("usage"), 2, t0())
        .await
        .unwrap();
    assert!(engine.is_locked_for(wiki.id(), &intro, 2, t0()).await.unwrap());
    assert!(!engine.is_locked_for(wiki.id(), &intro, 1, t0()).await.unwrap());
}

#[tokio::test]
async fn whole_document_lock_blocks_sections() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();

    engine
        .acquire_lock(wiki.id(), &SectionKey::Document, 1, t0())
        .await
        .unwrap();
    let err = engine
        .acquire_lock(wiki.id(), &SectionKey::heading("usage"), 2, t0())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::SectionLocked { .. });
}

#[tokio::test]
async fn expired_lock_can_be_taken_over() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();
    let intro = SectionKey::heading("intro");

    engine.acquire_lock(wiki.id(), &intro, 1, t0()).await.unwrap();
    assert!(engine.is_locked_for(wiki.id(), &intro, 2, minutes(30)).await.unwrap());
    assert!(!engine.is_locked_for(wiki.id(), &intro, 2, minutes(31)).await.unwrap());

    let taken = engine.acquire_lock(wiki.id(), &intro, 2, minutes(31)).await.unwrap();
    assert_eq!(taken.holder_id, 2);
    assert_eq!(engine.store().list_locks(wiki.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn only_holder_releases() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();
    let intro = SectionKey::heading("intro");

    engine.acquire_lock(wiki.id(), &intro, 1, t0()).await.unwrap();
    assert!(!engine.release_lock(wiki.id(), &intro, 2).await.unwrap());
    assert!(engine.release_lock(wiki.id(), &intro, 1).await.unwrap());
    engine.acquire_lock(wiki.id(), &intro, 2, t0()).await.unwrap();
}

#[tokio::test]
async fn locked_section_rejects_other_editors() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();
    let intro = SectionKey::heading("intro");

    engine.acquire_lock(wiki.id(), &intro, 1, t0()).await.unwrap();
    let err = edit_section(&engine, &mut wiki, &intro, 2, "h1. Intro\nhi\n", minutes(1))
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::SectionLocked { holder_id: 1, .. });
    assert_eq!(wiki.document().source_text(), GUIDE);
    assert_eq!(numbers(&wiki), [1]);
}

#[tokio::test]
async fn successful_edit_releases_own_lock_and_sweeps_expired() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();
    let intro = SectionKey::heading("intro");

    engine
        .acquire_lock(wiki.id(), &SectionKey::heading("usage"), 3, t0())
        .await
        .unwrap();
    engine.acquire_lock(wiki.id(), &intro, 2, minutes(60)).await.unwrap();
    edit_section(&engine, &mut wiki, &intro, 2, "h1. Intro\nhi\n", minutes(61))
        .await
        .unwrap();

    assert!(engine.store().list_locks(wiki.id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn lock_queries_report_holders() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();
    let id = wiki.id();

    engine.acquire_lock(id, &SectionKey::heading("intro"), 1, t0()).await.unwrap();
    engine.acquire_lock(id, &SectionKey::heading("usage"), 2, t0()).await.unwrap();

    assert_eq!(
        engine.currently_editing(id, 1, t0()).await.unwrap(),
        Some(SectionKey::heading("intro"))
    );
    assert_eq!(engine.currently_editing(id, 3, t0()).await.unwrap(), None);
    assert_eq!(
        engine.sections_locked_for(id, 2, t0()).await.unwrap(),
        vec![SectionKey::heading("intro")]
    );
    assert!(engine.sections_locked_for(id, 2, minutes(45)).await.unwrap().is_empty());
}

#[tokio::test]
async fn release_all_and_break_locks() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();
    let id = wiki.id();

    engine.acquire_lock(id, &SectionKey::heading("intro"), 1, t0()).await.unwrap();
    engine.acquire_lock(id, &SectionKey::heading("usage"), 1, t0()).await.unwrap();
    engine.acquire_lock(id, &SectionKey::heading("notes"), 2, t0()).await.unwrap();

    assert_eq!(engine.release_all_locks(id, 1).await.unwrap(), 2);
    assert_eq!(engine.break_locks(id).await.unwrap(), 1);
    assert!(engine.store().list_locks(id).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Section editing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn section_edit_replaces_only_that_section() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();

    edit_section(
        &engine,
        &mut wiki,
        &SectionKey::heading("usage"),
        2,
        "h1. Usage\nrun it twice\n",
        minutes(1),
    )
    .await
    .unwrap();

    assert_eq!(
        wiki.document().source_text(),
        "h1. Intro\nhello\nh1. Usage\nrun it twice\n"
    );
    assert_eq!(numbers(&wiki), [1, 2]);
    assert!(wiki.rendered_html(render(&links)).contains("run it twice"));
    assert_eq!(
        wiki.section_text("usage", render(&links)).unwrap(),
        "h1. Usage\nrun it twice\n"
    );
}

#[tokio::test]
async fn section_edit_keeps_following_text_on_its_own_line() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();

    edit_section(
        &engine,
        &mut wiki,
        &SectionKey::heading("intro"),
        2,
        "h1. Intro\nwelcome",
        minutes(1),
    )
    .await
    .unwrap();

    assert_eq!(
        wiki.document().source_text(),
        "h1. Intro\nwelcome\nh1. Usage\nrun it\n"
    );
    let ids: Vec<_> = wiki
        .structure(render(&links))
        .sections()
        .iter()
        .map(|s| s.id.clone())
        .collect();
    assert_eq!(ids, ["intro", "usage"]);
}

#[tokio::test]
async fn unknown_section_is_rejected() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), GUIDE, render(&links), t0()).await.unwrap();

    let err = edit_section(
        &engine,
        &mut wiki,
        &SectionKey::heading("missing"),
        2,
        "text",
        minutes(1),
    )
    .await
    .unwrap_err();

    assert_matches!(err, CoreError::SectionNotFound(id) if id == "missing");
    assert_eq!(wiki.document().source_text(), GUIDE);
    assert_eq!(numbers(&wiki), [1]);
}

// ---------------------------------------------------------------------------
// Reverting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revert_appends_copy_of_old_revision() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = with_revisions(&engine, &links, 3).await;

    // Editor 3 wrote revision 3 a moment ago; a revert is still a new entry.
    let decision = engine
        .revert_to_revision(&mut wiki, 1, 3, render(&links), minutes(4))
        .await
        .unwrap();

    assert_eq!(decision, SaveDecision::CreateRevision);
    assert_eq!(numbers(&wiki), [1, 2, 3, 4]);
    assert_eq!(wiki.document().source_text(), "v1");
    assert_eq!(wiki.latest_revision().unwrap().source_text, "v1");
}

#[tokio::test]
async fn destructive_revert_truncates_history() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = with_revisions(&engine, &links, 10).await;

    engine
        .revert_to_revision_destructive(&mut wiki, 4, Some(9), minutes(30))
        .await
        .unwrap();

    assert_eq!(wiki.document().revision_number(), 4);
    assert_eq!(wiki.document().source_text(), "v4");
    assert_eq!(numbers(&wiki), [1, 2, 3, 4]);

    let loaded = engine.load(wiki.id()).await.unwrap();
    assert_eq!(loaded.document().revision_number(), 4);
    assert_eq!(loaded.document().source_text(), "v4");
    assert_eq!(numbers(&loaded), [1, 2, 3, 4]);

    // History continues from the rewind point.
    edit_all(&engine, &mut wiki, 20, "after rewind", minutes(31))
        .await
        .unwrap();
    assert_eq!(numbers(&wiki), [1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn revert_to_missing_revision_fails() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = with_revisions(&engine, &links, 2).await;

    let err = engine
        .revert_to_revision(&mut wiki, 7, 1, render(&links), minutes(10))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::RevisionNotFound { revision: 7, .. });

    let err = engine
        .revert_to_revision_destructive(&mut wiki, 0, None, minutes(10))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::RevisionNotFound { revision: 0, .. });
    assert_eq!(numbers(&wiki), [1, 2]);
}

// ---------------------------------------------------------------------------
// History queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revision_pair_returns_both_sides() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = with_revisions(&engine, &links, 3).await;

    let (old, new) = engine.revision_pair(wiki.id(), 1, 3).await.unwrap();
    assert_eq!(old.source_text, "v1");
    assert_eq!(new.source_text, "v3");
}

#[tokio::test]
async fn first_revision_since_last_view() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let mut wiki = engine.create(Some(1), "one", render(&links), t0()).await.unwrap();
    edit_all(&engine, &mut wiki, 2, "two", minutes(60))
        .await
        .unwrap();
    edit_all(&engine, &mut wiki, 3, "three", minutes(120))
        .await
        .unwrap();

    let seen = engine
        .first_revision_since(wiki.id(), Some(minutes(90)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.revision_number, 2);

    assert!(engine
        .first_revision_since(wiki.id(), Some(minutes(-1)))
        .await
        .unwrap()
        .is_none());
    assert!(engine
        .first_revision_since(wiki.id(), None)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Cache maintenance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalidated_documents_rerender_on_next_read() {
    let engine = engine();
    let links = FixedLinkContext::default();
    let wiki = engine
        .create(Some(1), "see [[Home]]", render(&links), t0())
        .await
        .unwrap();

    assert_eq!(engine.invalidate_rendered(&[wiki.id(), 999]).await.unwrap(), 1);

    let stored = engine.store().find_document(wiki.id()).await.unwrap().unwrap();
    assert!(stored.rendered_html.is_none());
    assert!(stored.structure.is_none());

    let moved = FixedLinkContext("handbook".into());
    let mut loaded = engine.load(wiki.id()).await.unwrap();
    assert!(loaded.document().needs_rendering());
    assert!(loaded.rendered_html(render(&moved)).contains("/handbook/home"));
}

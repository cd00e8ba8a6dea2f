//! Integration tests for the cue-point synchronizer.
//!
//! Each test binds a session to a video through the in-memory player, then drives
//! adds, updates and removals while checking the catalog, the player's registry and
//! the persisted snapshot.

use std::sync::Arc;

use assert_matches::assert_matches;
use cuepoint_core::{
    Catalog, CatalogStore, CueDraft, CueError, CueId, CuePoint, MemoryPlayer, MemoryStore,
    Placement, PlayerSignal, Registration, SharedCatalog, SignalOutcome, Tracker,
    ValidationError, Video, VideoId, player::CueRegistry,
};
use tokio::sync::mpsc;

struct Harness {
    tracker: Tracker,
    player: Arc<MemoryPlayer>,
    signals: mpsc::UnboundedReceiver<PlayerSignal>,
    store: MemoryStore,
    catalog: SharedCatalog,
}

impl Harness {
    fn new(store: MemoryStore, gated: bool) -> Self {
        let (player, signals) = MemoryPlayer::new(600.0);
        let player = Arc::new(if gated { player.with_gate() } else { player });
        player.publish_video(VideoId(100), "Intro video", 60.0);
        player.publish_video(VideoId(200), "Second video", 120.0);

        let catalog = Catalog::open(store.clone()).unwrap().into_shared();
        let tracker = Tracker::new(Arc::clone(&catalog), Arc::clone(&player));
        Self {
            tracker,
            player,
            signals,
            store,
            catalog,
        }
    }

    async fn pump(&mut self) -> Vec<SignalOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            outcomes.push(self.tracker.handle(signal).await.unwrap());
        }
        outcomes
    }

    async fn open(&mut self, id: u64) {
        self.tracker.select_video(VideoId(id)).await.unwrap();
        self.pump().await;
    }

    async fn registry_texts(&self) -> Vec<(u64, String)> {
        self.player
            .cue_points()
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.ts, c.data.cue))
            .collect()
    }
}

async fn bound(gated: bool) -> Harness {
    let mut h = Harness::new(MemoryStore::new(), gated);
    h.open(100).await;
    h
}

fn texts(cues: &[CuePoint]) -> Vec<(u64, &str)> {
    cues.iter().map(|c| (c.ts, c.cue.as_str())).collect()
}

async fn wait_for_held(player: &MemoryPlayer, n: usize) {
    while player.held_adds() < n {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Test: ordering and the equal-timestamp update rule
// ---------------------------------------------------------------------------

/// Adding 10, 30, then 10 again overwrites the first cue instead of stacking a second one.
#[tokio::test]
async fn re_adding_a_timestamp_overwrites_the_cue() {
    let h = bound(false).await;
    let sync = h.tracker.sync();

    sync.add(10, "intro").await.unwrap();
    sync.add(30, "middle").await.unwrap();
    let outcome = sync.add(10, "intro-v2").await.unwrap();

    assert_eq!(outcome.placement, Placement::Update(0));
    let cues = sync.list();
    assert_eq!(texts(&cues), vec![(10, "intro-v2"), (30, "middle")]);
    assert!(cues.iter().all(CuePoint::is_registered));

    // The superseded registration was retired.
    assert_eq!(
        h.registry_texts().await,
        vec![(10, "intro-v2".to_string()), (30, "middle".to_string())]
    );
}

/// Distinct timestamps in any order end up sorted, one entry each.
#[tokio::test]
async fn distinct_timestamps_stay_sorted() {
    let h = bound(false).await;
    let sync = h.tracker.sync();

    let mut placements = Vec::new();
    for ts in [40, 5, 59, 20, 0, 21] {
        placements.push(sync.add(ts, format!("cue {ts}")).await.unwrap().placement);
    }

    assert_eq!(placements[0], Placement::Append);
    assert_eq!(placements[1], Placement::Insert(0));
    assert_eq!(placements[2], Placement::Append);
    let stamps: Vec<u64> = sync.list().iter().map(|c| c.ts).collect();
    assert_eq!(stamps, vec![0, 5, 20, 21, 40, 59]);
    assert_eq!(h.registry_texts().await.len(), 6);
}

/// Image and link given with an update replace the stored ones.
#[tokio::test]
async fn update_carries_new_media_links() {
    let h = bound(false).await;
    let sync = h.tracker.sync();

    sync.add_draft(CueDraft::new(12, "logo").with_image("https://img/a.png"))
        .await
        .unwrap();
    sync.add_draft(CueDraft::new(12, "logo v2").with_link("https://example.com"))
        .await
        .unwrap();

    let cue = &sync.list()[0];
    assert_eq!(cue.cue, "logo v2");
    assert_eq!(cue.image.as_deref(), Some("https://img/a.png"));
    assert_eq!(cue.link.as_deref(), Some("https://example.com"));
}

// ---------------------------------------------------------------------------
// Test: validation never changes state
// ---------------------------------------------------------------------------

/// Timestamps below zero or past the duration are rejected and nothing is saved.
#[tokio::test]
async fn out_of_range_timestamps_are_rejected() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    sync.add(10, "keep").await.unwrap();
    let saves = h.store.save_count();

    assert_matches!(
        sync.add(-1, "x").await,
        Err(CueError::Validation(ValidationError::TimestampOutOfRange { ts: -1, .. }))
    );
    assert_matches!(
        sync.add(61, "x").await,
        Err(CueError::Validation(ValidationError::TimestampOutOfRange { ts: 61, .. }))
    );

    assert_eq!(texts(&sync.list()), vec![(10, "keep")]);
    assert_eq!(h.store.save_count(), saves);
}

/// The duration itself is a valid timestamp.
#[tokio::test]
async fn duration_is_an_inclusive_bound() {
    let h = bound(false).await;
    assert!(h.tracker.sync().add(60, "end").await.is_ok());
}

#[tokio::test]
async fn blank_text_is_missing_fields() {
    let h = bound(false).await;
    assert_matches!(
        h.tracker.sync().add(5, "   ").await,
        Err(CueError::Validation(ValidationError::MissingFields))
    );
    assert!(h.tracker.sync().list().is_empty());
}

#[tokio::test]
async fn adding_without_an_active_video_fails() {
    let h = Harness::new(MemoryStore::new(), false);
    assert_matches!(
        h.tracker.sync().add(5, "x").await,
        Err(CueError::Validation(ValidationError::NoActiveVideo))
    );
    assert!(h.tracker.sync().list().is_empty());
}

// ---------------------------------------------------------------------------
// Test: removal
// ---------------------------------------------------------------------------

/// Removing shortens the list by one and retires the registry entry.
#[tokio::test]
async fn remove_drops_exactly_one_cue() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    for ts in [10, 20, 30] {
        sync.add(ts, format!("cue {ts}")).await.unwrap();
    }

    let outcome = sync.remove(Some(1)).await.unwrap();

    assert_eq!(outcome.removed.ts, 20);
    assert_eq!(outcome.registry_error, None);
    let remaining = sync.list();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|c| c.ts != 20));
    assert_eq!(
        h.registry_texts().await,
        vec![(10, "cue 10".to_string()), (30, "cue 30".to_string())]
    );
}

#[tokio::test]
async fn remove_requires_a_selection_in_range() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    sync.add(10, "a").await.unwrap();

    assert_matches!(
        sync.remove(None).await,
        Err(CueError::Validation(ValidationError::NoCueSelected))
    );
    assert_matches!(
        sync.remove(Some(1)).await,
        Err(CueError::Validation(ValidationError::CueNotFound { position: 1 }))
    );
    assert_eq!(sync.list().len(), 1);
}

/// A registry failure on removal is reported; the local removal stays committed.
#[tokio::test]
async fn registry_failure_does_not_undo_removal() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    sync.add(10, "a").await.unwrap();
    h.player.set_fail_removes(true);

    let outcome = sync.remove(Some(0)).await.unwrap();

    assert!(outcome.registry_error.is_some());
    assert!(sync.list().is_empty());
    let persisted = h.store.load().unwrap();
    assert!(persisted[0].cue_points.is_empty());
}

/// An update still registers the new text when retiring the old id fails.
#[tokio::test]
async fn update_registers_even_when_retiring_the_old_id_fails() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    let first = sync.add(10, "a").await.unwrap();
    let Registration::Registered(old_id) = first.registration else {
        panic!("expected the first add to register");
    };
    h.player.set_fail_removes(true);

    let outcome = sync.add(10, "b").await.unwrap();

    assert_eq!(outcome.placement, Placement::Update(0));
    let Registration::Registered(new_id) = outcome.registration else {
        panic!("expected the update to register");
    };
    assert_ne!(new_id, old_id);
    let cues = sync.list();
    assert_eq!(texts(&cues), vec![(10, "b")]);
    assert_eq!(cues[0].id.as_ref(), Some(&new_id));
    assert_eq!(h.store.load().unwrap()[0].cue_points, cues);
}

// ---------------------------------------------------------------------------
// Test: partial registry failure
// ---------------------------------------------------------------------------

/// The add at 30 is rejected while 10 succeeds; both stay local, only 10 has an id.
#[tokio::test]
async fn rejected_registration_keeps_the_local_cue() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    h.player.fail_adds_at(30);

    let first = sync.add(10, "intro").await.unwrap();
    let second = sync.add(30, "middle").await.unwrap();

    assert_matches!(first.registration, Registration::Registered(_));
    assert_matches!(second.registration, Registration::Failed(_));
    let cues = sync.list();
    assert_eq!(cues.len(), 2);
    assert!(cues[0].id.is_some());
    assert!(cues[1].id.is_none());
}

// ---------------------------------------------------------------------------
// Test: persistence round-trip
// ---------------------------------------------------------------------------

/// Reopening the catalog from the store reproduces the mutated state exactly.
#[tokio::test]
async fn persisted_snapshot_matches_memory() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    sync.add(10, "intro").await.unwrap();
    sync.add(30, "middle").await.unwrap();
    sync.remove(Some(0)).await.unwrap();

    let reopened = Catalog::open(h.store.clone()).unwrap();
    let current: Vec<Video> = h.catalog.lock().unwrap().videos().to_vec();
    assert_eq!(reopened.videos(), current.as_slice());
}

// ---------------------------------------------------------------------------
// Test: bulk replay
// ---------------------------------------------------------------------------

/// Replay registers every cue that the registry accepts, drops stale ids, and the
/// snapshot written afterwards holds the fresh ids.
#[tokio::test]
async fn replay_is_best_effort_and_refreshes_ids() {
    let store = MemoryStore::new();
    {
        let mut video = Video::new(VideoId(100), "Intro video", 60.0);
        for ts in [5, 15, 25] {
            let mut cue = CuePoint::new(ts, format!("cue {ts}"));
            cue.id = Some(CueId(format!("stale-{ts}")));
            video.cue_points.push(cue);
        }
        let mut catalog = Catalog::open(store.clone()).unwrap();
        catalog.add_video(video).unwrap();
    }

    let mut h = Harness::new(store, false);
    h.player.fail_adds_at(15);
    h.tracker.select_video(VideoId(100)).await.unwrap();
    let outcomes = h.pump().await;

    let Some(SignalOutcome::Bound { replay, created, .. }) = outcomes.first() else {
        panic!("expected a binding, got {outcomes:?}");
    };
    assert!(!created);
    assert_eq!(replay.registered.len(), 2);
    assert_eq!(replay.failed.len(), 1);
    assert_eq!(replay.failed[0].0, 15);

    let cues = h.tracker.sync().list();
    assert!(
        cues.iter()
            .all(|c| c.id.as_ref().is_none_or(|id| !id.0.starts_with("stale")))
    );
    assert!(cues[1].id.is_none());

    let registry_ids: Vec<_> = h
        .player
        .cue_points()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    let local_ids: Vec<_> = cues.iter().filter_map(|c| c.id.clone()).collect();
    assert_eq!(registry_ids, local_ids);

    let persisted = h.store.load().unwrap();
    assert_eq!(persisted[0].cue_points, cues);
}

/// A snapshot with out-of-order and repeated timestamps binds and replays in order.
#[tokio::test]
async fn unsorted_snapshot_replays_in_timestamp_order() {
    let store = MemoryStore::new();
    store
        .save(&[Video {
            cue_points: vec![
                CuePoint::new(30, "b"),
                CuePoint::new(10, "a"),
                CuePoint::new(10, "dup"),
            ],
            ..Video::new(VideoId(100), "Intro video", 60.0)
        }])
        .unwrap();

    let mut h = Harness::new(store, false);
    h.open(100).await;

    let cues = h.tracker.sync().list();
    assert_eq!(texts(&cues), vec![(10, "a"), (30, "b")]);
    assert!(cues.iter().all(CuePoint::is_registered));

    let outcome = h.tracker.sync().add(20, "between").await.unwrap();
    assert_eq!(outcome.placement, Placement::Insert(1));
}

// ---------------------------------------------------------------------------
// Test: races between an in-flight add and later edits
// ---------------------------------------------------------------------------

/// A cue removed while its registration is in flight does not linger in the registry.
#[tokio::test]
async fn removal_during_registration_retires_the_late_id() {
    let h = bound(true).await;
    let sync = h.tracker.sync().clone();

    let pending = tokio::spawn({
        let sync = sync.clone();
        async move { sync.add(10, "a").await }
    });
    wait_for_held(&h.player, 1).await;

    let removed = sync.remove(Some(0)).await.unwrap();
    assert_eq!(removed.removed.id, None);

    h.player.release_adds(1);
    let outcome = pending.await.unwrap().unwrap();

    assert_eq!(outcome.registration, Registration::Superseded);
    assert!(sync.list().is_empty());
    assert!(h.player.cue_points().await.unwrap().is_empty());
}

/// Two adds at the same second while the first is in flight leave one registry entry,
/// stamped onto the surviving text.
#[tokio::test]
async fn update_during_registration_keeps_one_registry_entry() {
    let h = bound(true).await;
    let sync = h.tracker.sync().clone();

    let first = tokio::spawn({
        let sync = sync.clone();
        async move { sync.add(10, "a").await }
    });
    wait_for_held(&h.player, 1).await;
    let second = tokio::spawn({
        let sync = sync.clone();
        async move { sync.add(10, "b").await }
    });
    wait_for_held(&h.player, 2).await;

    h.player.release_adds(2);
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first.registration, Registration::Superseded);
    let Registration::Registered(id) = second.registration else {
        panic!("second add should register");
    };

    let cues = sync.list();
    assert_eq!(texts(&cues), vec![(10, "b")]);
    assert_eq!(cues[0].id.as_ref(), Some(&id));

    let registry = h.player.cue_points().await.unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry[0].id, id);
}

// ---------------------------------------------------------------------------
// Test: registry listing and selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registered_lists_what_the_player_holds() {
    let h = bound(false).await;
    let sync = h.tracker.sync();
    assert!(sync.registered().await.unwrap().is_empty());

    sync.add(7, "seven").await.unwrap();
    let registered = sync.registered().await.unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].data.cue, "seven");
    assert_eq!(sync.select(0), Some((7, "seven".to_string())));
    assert_eq!(sync.select(1), None);
}

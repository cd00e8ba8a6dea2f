//! Keeps a video's cue points, the player's cue registry and the persisted catalog in step.
//!
//! Local cue points are the source of truth. The registry is brought in line with them
//! on a best-effort basis: a rejected registry call is logged and reported, never rolled
//! back into local state.

use std::sync::{Arc, MutexGuard};

use tokio::task::JoinSet;

use crate::{
    catalog::{Catalog, SharedCatalog},
    error::{CueError, RegistryError, Result, ValidationError},
    player::CueRegistry,
    session::SharedSession,
    types::{CueId, CuePayload, CuePoint, RegisteredCue, VideoId},
};

/// Where a new cue point lands relative to the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Later than every existing cue point.
    Append,
    /// Same timestamp as the cue point at this position; it is overwritten.
    Update(usize),
    /// Goes right before the cue point at this position.
    Insert(usize),
}

impl Placement {
    /// Locate `ts` using the first cue point whose timestamp is `>= ts`.
    pub fn locate(cue_points: &[CuePoint], ts: u64) -> Self {
        match cue_points.iter().position(|c| c.ts >= ts) {
            None => Placement::Append,
            Some(pos) if cue_points[pos].ts == ts => Placement::Update(pos),
            Some(pos) => Placement::Insert(pos),
        }
    }
}

/// A cue point as entered by the user, before validation.
#[derive(Debug, Clone, Default)]
pub struct CueDraft {
    pub ts: i64,
    pub cue: String,
    pub image: Option<String>,
    pub link: Option<String>,
}

impl CueDraft {
    pub fn new(ts: i64, cue: impl Into<String>) -> Self {
        Self {
            ts,
            cue: cue.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// How a registry add for one cue point settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Registered(CueId),
    Failed(RegistryError),
    /// The cue point changed or disappeared while the add was in flight.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub placement: Placement,
    pub position: usize,
    pub registration: Registration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub removed: CuePoint,
    pub registry_error: Option<RegistryError>,
}

/// Result of replaying a video's cue points into the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub registered: Vec<(u64, CueId)>,
    pub failed: Vec<(u64, RegistryError)>,
    pub superseded: usize,
}

impl ReplayReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.superseded == 0
    }
}

#[derive(Clone)]
pub struct CueSync {
    catalog: SharedCatalog,
    session: SharedSession,
    registry: Arc<dyn CueRegistry>,
}

impl CueSync {
    pub fn new(
        catalog: SharedCatalog,
        session: SharedSession,
        registry: Arc<dyn CueRegistry>,
    ) -> Self {
        Self {
            catalog,
            session,
            registry,
        }
    }

    /// Register every cue point of the video at `index` with the registry.
    ///
    /// Existing ids are dropped first. All adds run without waiting for each other and
    /// each settles on its own; the catalog is persisted once they all have.
    pub async fn load_all(&self, index: usize) -> Result<ReplayReport> {
        let (video_id, pending) = {
            let mut catalog = self.lock_catalog();
            let video_id = catalog
                .get(index)
                .map(|v| v.id)
                .ok_or(ValidationError::NoActiveVideo)?;
            // Stripped ids reach the snapshot before any add is issued, so a replay cut
            // short never leaves ids the registry no longer knows.
            let pending = catalog.mutate_cue_points(index, |cues| {
                cues.iter_mut()
                    .map(|c| {
                        c.id = None;
                        (c.ts, c.payload())
                    })
                    .collect::<Vec<_>>()
            })?;
            (video_id, pending)
        };

        let mut adds = JoinSet::new();
        for (ts, payload) in pending {
            let registry = Arc::clone(&self.registry);
            adds.spawn(async move {
                let result = registry.add_cue_point(ts, &payload).await;
                (ts, payload, result)
            });
        }

        let mut report = ReplayReport::default();
        let mut accepted = Vec::new();
        while let Some(joined) = adds.join_next().await {
            match joined {
                Ok((ts, payload, Ok(id))) => {
                    tracing::debug!(video_id = %video_id, ts, cue_id = %id, "cuepoint added");
                    accepted.push((ts, payload, id));
                }
                Ok((ts, _, Err(e))) => {
                    tracing::warn!(video_id = %video_id, ts, error = %e, "cue point error");
                    report.failed.push((ts, e));
                }
                Err(e) => {
                    tracing::error!(video_id = %video_id, error = %e, "Registry add task aborted");
                }
            }
        }

        let still_active = self.is_active(video_id);
        let orphans = {
            let mut catalog = self.lock_catalog();
            let index = catalog
                .find_index_by_id(video_id)
                .ok_or(ValidationError::NoActiveVideo)?;
            catalog.mutate_cue_points(index, |cues| {
                let mut orphans = Vec::new();
                for (ts, payload, id) in accepted {
                    if still_active && stamp(cues, ts, &payload, &id) {
                        report.registered.push((ts, id));
                    } else {
                        orphans.push(id);
                    }
                }
                orphans
            })?
        };

        report.registered.sort_by_key(|(ts, _)| *ts);
        report.failed.sort_by_key(|(ts, _)| *ts);
        report.superseded = orphans.len();
        if still_active {
            for id in orphans {
                self.retire(video_id, &id).await;
            }
        }

        if report.is_complete() {
            tracing::info!(
                video_id = %video_id,
                registered = report.registered.len(),
                "Cue points replayed"
            );
        } else {
            tracing::warn!(
                video_id = %video_id,
                registered = report.registered.len(),
                failed = report.failed.len(),
                superseded = report.superseded,
                "Cue points partially replayed"
            );
        }
        Ok(report)
    }

    pub async fn add(&self, ts: i64, cue: impl Into<String>) -> Result<AddOutcome> {
        self.add_draft(CueDraft::new(ts, cue)).await
    }

    /// Add a cue point to the active video, or overwrite the one at the same timestamp.
    ///
    /// Invalid input fails with a [`ValidationError`] and changes nothing. Registry
    /// outcomes are reported in the returned [`AddOutcome`] and never fail the call.
    pub async fn add_draft(&self, draft: CueDraft) -> Result<AddOutcome> {
        let cue = draft.cue.trim().to_string();
        if cue.is_empty() {
            return Err(ValidationError::MissingFields.into());
        }
        let (index, video_id) = self.active()?;

        let (placement, position, retired, ts, payload) = {
            let mut catalog = self.lock_catalog();
            let video = catalog.get(index).ok_or(ValidationError::NoActiveVideo)?;
            if !video.accepts(draft.ts) {
                return Err(ValidationError::TimestampOutOfRange {
                    ts: draft.ts,
                    duration: video.duration,
                }
                .into());
            }
            let ts = draft.ts as u64;

            catalog.mutate_cue_points(index, |cues| {
                let placement = Placement::locate(cues, ts);
                let (position, retired) = match placement {
                    Placement::Append => {
                        cues.push(new_cue_point(ts, cue, &draft));
                        (cues.len() - 1, None)
                    }
                    Placement::Update(pos) => {
                        let existing = &mut cues[pos];
                        existing.cue = cue;
                        if draft.image.is_some() {
                            existing.image = draft.image.clone();
                        }
                        if draft.link.is_some() {
                            existing.link = draft.link.clone();
                        }
                        (pos, existing.id.take())
                    }
                    Placement::Insert(pos) => {
                        cues.insert(pos, new_cue_point(ts, cue, &draft));
                        (pos, None)
                    }
                };
                (placement, position, retired, ts, cues[position].payload())
            })?
        };

        tracing::debug!(video_id = %video_id, ts, ?placement, "Cue point stored");

        let registration = match retired {
            Some(old) => {
                let (_, added) = tokio::join!(
                    self.retire(video_id, &old),
                    self.registry.add_cue_point(ts, &payload)
                );
                added
            }
            None => {
                if matches!(placement, Placement::Update(_)) {
                    tracing::debug!(video_id = %video_id, ts, "Updated cue point had no registry id");
                }
                self.registry.add_cue_point(ts, &payload).await
            }
        };

        let registration = self.settle(video_id, ts, &payload, registration).await;
        Ok(AddOutcome {
            placement,
            position,
            registration,
        })
    }

    /// Remove the cue point at `selected` from the active video.
    ///
    /// The local removal is committed and persisted first. A failed registry removal is
    /// reported but leaves the local removal in place.
    pub async fn remove(&self, selected: Option<usize>) -> Result<RemoveOutcome> {
        let position = selected.ok_or(ValidationError::NoCueSelected)?;
        let (index, video_id) = self.active()?;

        let removed = {
            let mut catalog = self.lock_catalog();
            let len = catalog
                .get(index)
                .map(|v| v.cue_points.len())
                .ok_or(ValidationError::NoActiveVideo)?;
            if position >= len {
                return Err(ValidationError::CueNotFound { position }.into());
            }
            catalog.mutate_cue_points(index, |cues| cues.remove(position))?
        };

        let registry_error = match &removed.id {
            Some(id) => self.retire(video_id, id).await.err(),
            None => {
                tracing::debug!(
                    video_id = %video_id,
                    ts = removed.ts,
                    "Removed cue point was not registered"
                );
                None
            }
        };

        Ok(RemoveOutcome {
            removed,
            registry_error,
        })
    }

    /// Cue points of the active video, in timestamp order.
    pub fn list(&self) -> Vec<CuePoint> {
        let Ok((index, _)) = self.active() else {
            return Vec::new();
        };
        self.lock_catalog()
            .get(index)
            .map(|v| v.cue_points.clone())
            .unwrap_or_default()
    }

    /// Timestamp and text of the cue point at `position`, to prefill the edit fields.
    pub fn select(&self, position: usize) -> Option<(u64, String)> {
        self.list()
            .into_iter()
            .nth(position)
            .map(|c| (c.ts, c.cue))
    }

    /// What the player's registry currently holds.
    pub async fn registered(&self) -> Result<Vec<RegisteredCue>> {
        let cues = self.registry.cue_points().await.map_err(|e| {
            tracing::warn!(error = %e, "getCuePoints error");
            CueError::from(e)
        })?;
        if cues.is_empty() {
            tracing::info!("no cue points are set on this video.");
        }
        Ok(cues)
    }

    fn active(&self) -> std::result::Result<(usize, VideoId), ValidationError> {
        let session = self.session.lock().expect("session poisoned");
        match (session.is_loaded, session.active_index, session.active_id) {
            (true, Some(index), Some(id)) => Ok((index, id)),
            _ => Err(ValidationError::NoActiveVideo),
        }
    }

    fn is_active(&self, video_id: VideoId) -> bool {
        self.active().is_ok_and(|(_, id)| id == video_id)
    }

    /// Stamp the id of a settled add onto its cue point, or retire it if the cue point moved on.
    async fn settle(
        &self,
        video_id: VideoId,
        ts: u64,
        payload: &CuePayload,
        result: std::result::Result<CueId, RegistryError>,
    ) -> Registration {
        let id = match result {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(video_id = %video_id, ts, error = %e, "cue point error");
                return Registration::Failed(e);
            }
        };

        if !self.is_active(video_id) {
            tracing::debug!(video_id = %video_id, ts, "Video no longer active, dropping cue id");
            return Registration::Superseded;
        }

        let stamped = {
            let mut catalog = self.lock_catalog();
            catalog
                .find_index_by_id(video_id)
                .and_then(|index| {
                    catalog
                        .mutate_cue_points(index, |cues| stamp(cues, ts, payload, &id))
                        .ok()
                })
                .unwrap_or(false)
        };

        if stamped {
            tracing::info!(video_id = %video_id, ts, cue_id = %id, "cuepoint added");
            Registration::Registered(id)
        } else {
            let _ = self.retire(video_id, &id).await;
            Registration::Superseded
        }
    }

    async fn retire(&self, video_id: VideoId, id: &CueId) -> std::result::Result<(), RegistryError> {
        match self.registry.remove_cue_point(id).await {
            Ok(()) => {
                tracing::info!(video_id = %video_id, cue_id = %id, "cuepoint removed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(video_id = %video_id, cue_id = %id, error = %e, "cue point error");
                Err(e)
            }
        }
    }

    fn lock_catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().expect("catalog poisoned")
    }
}

fn new_cue_point(ts: u64, cue: String, draft: &CueDraft) -> CuePoint {
    CuePoint {
        id: None,
        ts,
        cue,
        image: draft.image.clone(),
        link: draft.link.clone(),
    }
}

/// Give the cue point at `ts` its registry id if it still matches what was registered.
fn stamp(cues: &mut [CuePoint], ts: u64, payload: &CuePayload, id: &CueId) -> bool {
    match cues.iter_mut().find(|c| c.ts == ts) {
        Some(c) if c.id.is_none() && c.payload() == *payload => {
            c.id = Some(id.clone());
            true
        }
        _ => false,
    }
}

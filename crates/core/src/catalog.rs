use std::sync::{Arc, Mutex};

use crate::{
    error::{PersistenceError, ValidationError},
    store::CatalogStore,
    types::{CuePoint, Video, VideoId},
};

pub type SharedCatalog = Arc<Mutex<Catalog>>;

/// Ordered collection of every known video and its cue points.
///
/// Every accepted mutation writes the whole catalog through the store before returning.
/// A failed write is logged and leaves the catalog marked dirty; the in-memory change stands.
pub struct Catalog {
    videos: Vec<Video>,
    store: Box<dyn CatalogStore>,
    dirty: bool,
}

impl Catalog {
    /// Rehydrate the catalog from the store's last snapshot.
    pub fn open(store: impl CatalogStore + 'static) -> Result<Self, PersistenceError> {
        let loaded = store.load()?;

        let mut videos: Vec<Video> = Vec::with_capacity(loaded.len());
        for mut video in loaded {
            if videos.iter().any(|v| v.id == video.id) {
                tracing::warn!(video_id = %video.id, "Dropping duplicate video from snapshot");
                continue;
            }
            if !is_strictly_ordered(&video.cue_points) {
                let stored = video.cue_points.len();
                normalize(&mut video.cue_points);
                tracing::warn!(
                    video_id = %video.id,
                    stored,
                    kept = video.cue_points.len(),
                    "Reordered cue points from snapshot"
                );
            }
            videos.push(video);
        }

        tracing::debug!(videos = videos.len(), "Catalog loaded");
        Ok(Self {
            videos,
            store: Box::new(store),
            dirty: false,
        })
    }

    pub fn into_shared(self) -> SharedCatalog {
        Arc::new(Mutex::new(self))
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn get(&self, index: usize) -> Option<&Video> {
        self.videos.get(index)
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Whether the durable snapshot lags the in-memory state.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn find_index_by_id(&self, id: VideoId) -> Option<usize> {
        self.videos.iter().position(|v| v.id == id)
    }

    /// Append a video and return its index.
    pub fn add_video(&mut self, video: Video) -> Result<usize, ValidationError> {
        if self.find_index_by_id(video.id).is_some() {
            return Err(ValidationError::DuplicateVideo { id: video.id });
        }

        tracing::info!(video_id = %video.id, title = %video.title, "Video added to catalog");
        self.videos.push(video);
        self.commit();
        Ok(self.videos.len() - 1)
    }

    /// Replace a video's cue points. The sequence is sorted by timestamp and later
    /// duplicates of a timestamp are dropped.
    pub fn replace_cue_points(
        &mut self,
        index: usize,
        mut cue_points: Vec<CuePoint>,
    ) -> Result<(), ValidationError> {
        normalize(&mut cue_points);
        self.mutate_cue_points(index, move |current| *current = cue_points)
    }

    /// Apply `f` to a video's cue points, then persist.
    pub fn mutate_cue_points<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Vec<CuePoint>) -> R,
    ) -> Result<R, ValidationError> {
        let video = self
            .videos
            .get_mut(index)
            .ok_or(ValidationError::NoActiveVideo)?;

        let out = f(&mut video.cue_points);
        debug_assert!(
            is_strictly_ordered(&video.cue_points),
            "cue points must stay strictly ordered by timestamp"
        );

        self.commit();
        Ok(out)
    }

    /// Write the whole catalog through the store.
    pub fn persist(&mut self) -> Result<(), PersistenceError> {
        match self.store.save(&self.videos) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                Err(e)
            }
        }
    }

    fn commit(&mut self) {
        if let Err(e) = self.persist() {
            tracing::error!(error = %e, "Failed to persist catalog");
        }
    }
}

fn is_strictly_ordered(cue_points: &[CuePoint]) -> bool {
    cue_points.windows(2).all(|w| w[0].ts < w[1].ts)
}

/// Sort by timestamp and keep the first cue point seen for each timestamp.
fn normalize(cue_points: &mut Vec<CuePoint>) {
    cue_points.sort_by_key(|c| c.ts);
    cue_points.dedup_by_key(|c| c.ts);
}

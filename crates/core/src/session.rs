//! Tracks which catalog entry the player currently shows.
//!
//! The session is rebuilt from player signals and never persisted. A `Loaded` signal
//! binds it to the catalog entry for that id, creating the entry from the player's
//! metadata when the id is new.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::sync::{broadcast, mpsc};

use crate::{
    catalog::{Catalog, SharedCatalog},
    config::CUE_DISPLAY,
    error::{Result, ValidationError},
    player::{CueRegistry, Player, PlayerSignal, VideoSource},
    sync::{CueSync, ReplayReport},
    types::{Video, VideoId},
};

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub active_index: Option<usize>,
    pub active_id: Option<VideoId>,
    pub is_loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Bound { index: usize, id: VideoId },
}

impl Session {
    pub fn state(&self) -> SessionState {
        match (self.is_loaded, self.active_index, self.active_id) {
            (true, Some(index), Some(id)) => SessionState::Bound { index, id },
            _ => SessionState::Unloaded,
        }
    }

    fn bind(&mut self, index: usize, id: VideoId) {
        self.active_index = Some(index);
        self.active_id = Some(id);
        self.is_loaded = true;
    }
}

/// What handling one player signal led to.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Bound {
        index: usize,
        created: bool,
        replay: ReplayReport,
    },
    /// Show cue text for `hide_after`, then hide it.
    ShowCue { text: String, hide_after: Duration },
    Logged,
}

pub struct Tracker {
    catalog: SharedCatalog,
    session: SharedSession,
    source: Arc<dyn VideoSource>,
    sync: CueSync,
    cue_display: Duration,
}

impl Tracker {
    pub fn new<P: Player + 'static>(catalog: SharedCatalog, player: Arc<P>) -> Self {
        let session: SharedSession = Arc::default();
        let registry: Arc<dyn CueRegistry> = player.clone();
        let sync = CueSync::new(Arc::clone(&catalog), Arc::clone(&session), registry);

        Self {
            catalog,
            session,
            source: player,
            sync,
            cue_display: CUE_DISPLAY,
        }
    }

    pub fn with_cue_display(mut self, cue_display: Duration) -> Self {
        self.cue_display = cue_display;
        self
    }

    pub fn sync(&self) -> &CueSync {
        &self.sync
    }

    pub fn session(&self) -> Session {
        self.session.lock().expect("session poisoned").clone()
    }

    pub fn videos(&self) -> Vec<Video> {
        self.lock_catalog().videos().to_vec()
    }

    /// Load a video that is not in the catalog yet.
    ///
    /// Ids already in the catalog are rejected; those go through [`select_video`](Self::select_video).
    pub async fn request_video(&self, id: VideoId) -> Result<()> {
        if self.lock_catalog().find_index_by_id(id).is_some() {
            let err = ValidationError::DuplicateVideo { id };
            tracing::info!(video_id = %id, "add video: {err}");
            return Err(err.into());
        }
        self.load(id).await
    }

    /// Load a video picked from the catalog.
    pub async fn select_video(&self, id: VideoId) -> Result<()> {
        self.load(id).await
    }

    async fn load(&self, id: VideoId) -> Result<()> {
        self.source.load_video(id).await.map_err(|e| {
            tracing::warn!(video_id = %id, error = %e, "video id {id} not loaded.");
            e.into()
        })
    }

    pub async fn handle(&self, signal: PlayerSignal) -> Result<SignalOutcome> {
        match signal {
            PlayerSignal::Loaded { id } => self.bind(id).await,
            PlayerSignal::CuePoint { data, time, .. } => {
                tracing::debug!(time, cue = %data.cue, "cuepoint");
                Ok(SignalOutcome::ShowCue {
                    text: data.cue,
                    hide_after: self.cue_display,
                })
            }
            PlayerSignal::Error(message) => {
                tracing::warn!(%message, "player error");
                Ok(SignalOutcome::Logged)
            }
            other => {
                tracing::debug!(signal = other.name(), "player signal");
                Ok(SignalOutcome::Logged)
            }
        }
    }

    /// Handle signals one at a time until the channel closes or shutdown fires.
    pub async fn run(
        self,
        mut signals: mpsc::UnboundedReceiver<PlayerSignal>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                signal = signals.recv() => match signal {
                    Some(signal) => {
                        let name = signal.name();
                        if let Err(e) = self.handle(signal).await {
                            tracing::warn!(signal = name, error = %e, "Signal handling failed");
                        }
                    }
                    None => return,
                },
            }
        }
    }

    async fn bind(&self, id: VideoId) -> Result<SignalOutcome> {
        let found = self.lock_catalog().find_index_by_id(id);
        if let Some(index) = found {
            self.lock_session().bind(index, id);
            tracing::info!(video_id = %id, index, "Bound to catalog video");

            let replay = self.sync.load_all(index).await?;
            return Ok(SignalOutcome::Bound {
                index,
                created: false,
                replay,
            });
        }

        let (title, duration) = tokio::try_join!(self.source.title(), self.source.duration())
            .map_err(|e| {
                tracing::warn!(video_id = %id, error = %e, "metadata error");
                e
            })?;

        let (index, created) = {
            let mut catalog = self.lock_catalog();
            match catalog.add_video(Video::new(id, title, duration)) {
                Ok(index) => (index, true),
                // Another signal for the same id got here first.
                Err(ValidationError::DuplicateVideo { .. }) => {
                    let index = catalog
                        .find_index_by_id(id)
                        .ok_or(ValidationError::NoActiveVideo)?;
                    (index, false)
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.lock_session().bind(index, id);
        tracing::info!(video_id = %id, index, created, "Bound to new video");

        let replay = self.sync.load_all(index).await?;
        Ok(SignalOutcome::Bound {
            index,
            created,
            replay,
        })
    }

    fn lock_catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().expect("catalog poisoned")
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().expect("session poisoned")
    }
}

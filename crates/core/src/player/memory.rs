use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use uuid::Uuid;

use crate::{
    error::{MetadataError, RegistryError},
    player::{CueRegistry, PlayerSignal, VideoSource},
    types::{CueId, CuePayload, RegisteredCue, VideoId},
};

struct LoadedVideo {
    id: VideoId,
    title: String,
    duration: f64,
}

#[derive(Default)]
struct PlayerState {
    loaded: Option<LoadedVideo>,
    library: HashMap<VideoId, (String, f64)>,
    cues: Vec<RegisteredCue>,
    position: f64,
    fail_adds: HashSet<u64>,
    fail_removes: bool,
    fail_metadata: bool,
}

/// Player that keeps its cue registry in memory.
///
/// Used by the CLI harness and by tests. Failures can be injected per timestamp, and a
/// gate can hold registry adds until they are released so races can be staged.
pub struct MemoryPlayer {
    state: Mutex<PlayerState>,
    signals: mpsc::UnboundedSender<PlayerSignal>,
    gate: Option<Semaphore>,
    held: AtomicUsize,
    default_duration: f64,
}

impl MemoryPlayer {
    pub fn new(default_duration: f64) -> (Self, mpsc::UnboundedReceiver<PlayerSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Self {
            state: Mutex::new(PlayerState::default()),
            signals: tx,
            gate: None,
            held: AtomicUsize::new(0),
            default_duration,
        };
        (player, rx)
    }

    /// Hold every registry add until [`release_adds`](Self::release_adds) lets it through.
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Make `id` known to the player with the given metadata.
    pub fn publish_video(&self, id: VideoId, title: impl Into<String>, duration: f64) {
        self.lock().library.insert(id, (title.into(), duration));
    }

    pub fn fail_adds_at(&self, ts: u64) {
        self.lock().fail_adds.insert(ts);
    }

    pub fn set_fail_removes(&self, fail: bool) {
        self.lock().fail_removes = fail;
    }

    pub fn set_fail_metadata(&self, fail: bool) {
        self.lock().fail_metadata = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_adds.clear();
        state.fail_removes = false;
        state.fail_metadata = false;
    }

    /// Let `n` held adds settle, oldest first.
    pub fn release_adds(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Adds currently waiting at the gate.
    pub fn held_adds(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn loaded_id(&self) -> Option<VideoId> {
        self.lock().loaded.as_ref().map(|v| v.id)
    }

    pub fn position(&self) -> f64 {
        self.lock().position
    }

    pub fn ready(&self) {
        self.emit(PlayerSignal::Ready);
    }

    /// Play from the current position to `seconds`, firing every cue point passed on the way.
    /// Returns the number of cue points fired.
    pub fn play_to(&self, seconds: f64) -> usize {
        let (from, to, fired, ended) = {
            let mut state = self.lock();
            let Some(duration) = state.loaded.as_ref().map(|v| v.duration) else {
                drop(state);
                self.emit(PlayerSignal::Error("no video loaded".into()));
                return 0;
            };

            let from = state.position;
            let to = seconds.clamp(0.0, duration);
            let ended = to >= duration;
            let fired: Vec<RegisteredCue> = state
                .cues
                .iter()
                .filter(|c| (c.ts as f64) > from && (c.ts as f64) <= to)
                .cloned()
                .collect();
            state.position = if ended { 0.0 } else { to };
            (from, to, fired, ended)
        };

        self.emit(PlayerSignal::Play { seconds: from });
        for cue in &fired {
            self.emit(PlayerSignal::CuePoint {
                time: cue.ts as f64,
                id: cue.id.clone(),
                data: cue.data.clone(),
            });
        }
        if ended {
            self.emit(PlayerSignal::Ended);
        } else {
            self.emit(PlayerSignal::Pause { seconds: to });
        }
        fired.len()
    }

    fn emit(&self, signal: PlayerSignal) {
        // No receiver only means nobody listens for signals.
        let _ = self.signals.send(signal);
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().expect("MemoryPlayer poisoned")
    }
}

#[async_trait]
impl CueRegistry for MemoryPlayer {
    async fn add_cue_point(&self, ts: u64, payload: &CuePayload) -> Result<CueId, RegistryError> {
        if let Some(gate) = &self.gate {
            self.held.fetch_add(1, Ordering::SeqCst);
            let permit = gate.acquire().await;
            self.held.fetch_sub(1, Ordering::SeqCst);
            permit
                .map_err(|e| RegistryError::Player(e.to_string()))?
                .forget();
        }

        let mut state = self.lock();
        let Some(duration) = state.loaded.as_ref().map(|v| v.duration) else {
            return Err(RegistryError::NotLoaded);
        };
        if (ts as f64) > duration {
            return Err(RegistryError::Rejected {
                ts,
                reason: "time is out of range".into(),
            });
        }
        if state.fail_adds.contains(&ts) {
            return Err(RegistryError::Rejected {
                ts,
                reason: "simulated failure".into(),
            });
        }

        let id = CueId(Uuid::new_v4().to_string());
        state.cues.push(RegisteredCue {
            id: id.clone(),
            ts,
            data: payload.clone(),
        });
        state.cues.sort_by_key(|c| c.ts);
        Ok(id)
    }

    async fn remove_cue_point(&self, id: &CueId) -> Result<(), RegistryError> {
        let mut state = self.lock();
        if state.fail_removes {
            return Err(RegistryError::Player("simulated failure".into()));
        }

        let before = state.cues.len();
        state.cues.retain(|c| &c.id != id);
        if state.cues.len() == before {
            return Err(RegistryError::UnknownCue(id.clone()));
        }
        Ok(())
    }

    async fn cue_points(&self) -> Result<Vec<RegisteredCue>, RegistryError> {
        let state = self.lock();
        if state.loaded.is_none() {
            return Err(RegistryError::NotLoaded);
        }
        Ok(state.cues.clone())
    }
}

#[async_trait]
impl VideoSource for MemoryPlayer {
    async fn load_video(&self, id: VideoId) -> Result<(), MetadataError> {
        {
            let mut state = self.lock();
            if state.fail_metadata {
                return Err(MetadataError::LoadFailed {
                    id,
                    reason: "simulated failure".into(),
                });
            }

            let (title, duration) = state
                .library
                .get(&id)
                .cloned()
                .unwrap_or_else(|| (format!("Video {id}"), self.default_duration));
            state.loaded = Some(LoadedVideo {
                id,
                title,
                duration,
            });
            state.cues.clear();
            state.position = 0.0;
        }

        self.emit(PlayerSignal::Loaded { id });
        Ok(())
    }

    async fn title(&self) -> Result<String, MetadataError> {
        let state = self.lock();
        if state.fail_metadata {
            return Err(MetadataError::Title("simulated failure".into()));
        }
        state
            .loaded
            .as_ref()
            .map(|v| v.title.clone())
            .ok_or_else(|| MetadataError::Title("no video loaded".into()))
    }

    async fn duration(&self) -> Result<f64, MetadataError> {
        let state = self.lock();
        if state.fail_metadata {
            return Err(MetadataError::Duration("simulated failure".into()));
        }
        state
            .loaded
            .as_ref()
            .map(|v| v.duration)
            .ok_or_else(|| MetadataError::Duration("no video loaded".into()))
    }
}

//! Boundary to the video player.
//!
//! The player owns its own cue registry and reports lifecycle signals. Nothing in the
//! core depends on a concrete player; any integration implementing [`CueRegistry`] and
//! [`VideoSource`] is a [`Player`].

pub mod memory;

pub use memory::*;

use async_trait::async_trait;

use crate::{
    error::{MetadataError, RegistryError},
    types::{CueId, CuePayload, RegisteredCue, VideoId},
};

/// The player's own store of cue points for the loaded video.
///
/// Calls may run concurrently and settle in any order.
#[async_trait]
pub trait CueRegistry: Send + Sync {
    async fn add_cue_point(&self, ts: u64, payload: &CuePayload) -> Result<CueId, RegistryError>;

    async fn remove_cue_point(&self, id: &CueId) -> Result<(), RegistryError>;

    async fn cue_points(&self) -> Result<Vec<RegisteredCue>, RegistryError>;
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Ask the player to load `id`. Completion is reported by a [`PlayerSignal::Loaded`].
    async fn load_video(&self, id: VideoId) -> Result<(), MetadataError>;

    async fn title(&self) -> Result<String, MetadataError>;

    async fn duration(&self) -> Result<f64, MetadataError>;
}

pub trait Player: CueRegistry + VideoSource {}

impl<T: CueRegistry + VideoSource> Player for T {}

/// Lifecycle and playback signals a player emits.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerSignal {
    Ready,
    Loaded { id: VideoId },
    Play { seconds: f64 },
    Pause { seconds: f64 },
    Ended,
    CuePoint { time: f64, id: CueId, data: CuePayload },
    Error(String),
}

impl PlayerSignal {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerSignal::Ready => "ready",
            PlayerSignal::Loaded { .. } => "loaded",
            PlayerSignal::Play { .. } => "play",
            PlayerSignal::Pause { .. } => "pause",
            PlayerSignal::Ended => "ended",
            PlayerSignal::CuePoint { .. } => "cuepoint",
            PlayerSignal::Error(_) => "error",
        }
    }
}

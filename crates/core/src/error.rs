use std::path::PathBuf;

use thiserror::Error;

use crate::types::{CueId, VideoId};

#[derive(Error, Debug)]
pub enum CueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Cue registry call failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Video metadata unavailable: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Persisting the catalog failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Bad user input. Never leaves a state change behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("add a valid cue point text and timestamp.")]
    MissingFields,

    #[error("no video is loaded.")]
    NoActiveVideo,

    #[error("cue point must be from 0 - duration ({duration:.2}).")]
    TimestampOutOfRange { ts: i64, duration: f64 },

    #[error("not added; id {id} already in list")]
    DuplicateVideo { id: VideoId },

    #[error("no cue point is selected.")]
    NoCueSelected,

    #[error("no cue point at position {position}.")]
    CueNotFound { position: usize },

    #[error("that video id {raw} is not valid.")]
    InvalidVideoId { raw: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("cue point at {ts}s rejected: {reason}")]
    Rejected { ts: u64, reason: String },

    #[error("unknown cue point id {0}")]
    UnknownCue(CueId),

    #[error("no video is loaded in the player")]
    NotLoaded,

    #[error("player call failed: {0}")]
    Player(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("title unavailable: {0}")]
    Title(String),

    #[error("duration unavailable: {0}")]
    Duration(String),

    #[error("video {id} could not be loaded: {reason}")]
    LoadFailed { id: VideoId, reason: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CueError>;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::types::VideoId;

pub const DATA_DIR_ENV: &str = "CUEPOINT_DATA_DIR";

/// Storage key of the original harness, kept as the snapshot file name.
pub const CATALOG_FILE: &str = "videos.json";

pub const DEFAULT_VIDEO_ID: VideoId = VideoId(74687463);

/// Duration the in-memory player reports for ids it has never seen.
pub const DEFAULT_DURATION_SECS: f64 = 600.0;

/// How long fired cue text stays on screen.
pub const CUE_DISPLAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub default_video_id: VideoId,
    pub default_duration: f64,
    pub cue_display: Duration,
}

impl Config {
    /// Read the configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(get_root_data_dir);
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_video_id: DEFAULT_VIDEO_ID,
            default_duration: DEFAULT_DURATION_SECS,
            cue_display: CUE_DISPLAY,
        }
    }

    pub fn catalog_file(&self) -> PathBuf {
        get_catalog_path(&self.data_dir)
    }
}

pub fn get_root_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("cuepoint")
}

pub fn get_catalog_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CATALOG_FILE)
}

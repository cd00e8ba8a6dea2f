use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Provider identifier of a video.
///
/// Players report ids sometimes as numbers and sometimes as numeric strings, so every id
/// is normalized to a `u64` on ingestion and compared in that form only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VideoId(pub u64);

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VideoId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(VideoId)
            .map_err(|_| ValidationError::InvalidVideoId { raw: s.to_string() })
    }
}

impl From<u64> for VideoId {
    fn from(id: u64) -> Self {
        VideoId(id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVideoId {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for VideoId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawVideoId::deserialize(deserializer)? {
            RawVideoId::Number(n) => Ok(VideoId(n)),
            RawVideoId::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Identifier the player's cue registry assigns to a registered cue point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CueId(pub String);

impl fmt::Display for CueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data handed to the registry with a cue point. Never carries the registry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuePayload {
    pub cue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl CuePayload {
    pub fn text(cue: impl Into<String>) -> Self {
        Self {
            cue: cue.into(),
            image: None,
            link: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuePoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CueId>,
    pub ts: u64,
    pub cue: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub link: Option<String>,
}

impl CuePoint {
    pub fn new(ts: u64, cue: impl Into<String>) -> Self {
        Self {
            id: None,
            ts,
            cue: cue.into(),
            image: None,
            link: None,
        }
    }

    /// Registry payload for this cue point, without its id.
    pub fn payload(&self) -> CuePayload {
        CuePayload {
            cue: self.cue.clone(),
            image: self.image.clone(),
            link: self.link.clone(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.id.is_some()
    }
}

/// Older snapshots stored absent URLs as empty strings.
fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// A cue point as the player's registry reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredCue {
    pub id: CueId,
    pub ts: u64,
    pub data: CuePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub duration: f64,
    #[serde(rename = "cuePoints", default)]
    pub cue_points: Vec<CuePoint>,
}

impl Video {
    pub fn new(id: VideoId, title: impl Into<String>, duration: f64) -> Self {
        Self {
            id,
            title: title.into(),
            duration: duration.max(0.0),
            cue_points: Vec::new(),
        }
    }

    /// Whether `ts` lies in `[0, duration]`.
    pub fn accepts(&self, ts: i64) -> bool {
        ts >= 0 && (ts as f64) <= self.duration
    }

    pub fn cue_point_at(&self, ts: u64) -> Option<&CuePoint> {
        self.cue_points.iter().find(|c| c.ts == ts)
    }
}

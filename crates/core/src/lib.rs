//! Cuepoint Core Library
//!
//! Keeps the cue points of each video consistent across the in-memory catalog, the
//! player's own cue registry and the persisted snapshot.

pub mod catalog;
pub mod config;
pub mod error;
pub mod format;
pub mod player;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

// Re-export commonly used items at crate root
pub use catalog::{Catalog, SharedCatalog};
pub use config::Config;
pub use error::{CueError, MetadataError, PersistenceError, RegistryError, Result, ValidationError};
pub use format::{cue_label, format_cue_list, format_registry, format_timestamp, video_label};
pub use player::{CueRegistry, MemoryPlayer, Player, PlayerSignal, VideoSource};
pub use session::{Session, SessionState, SharedSession, SignalOutcome, Tracker};
pub use store::{CatalogStore, JsonFileStore, MemoryStore};
pub use sync::{AddOutcome, CueDraft, CueSync, Placement, Registration, RemoveOutcome, ReplayReport};
pub use types::{CueId, CuePayload, CuePoint, RegisteredCue, Video, VideoId};

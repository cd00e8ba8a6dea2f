use crate::types::{CuePoint, RegisteredCue, Video};

const TITLE_WIDTH: usize = 30;

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

/// Selection-list label of a video: id, title cut to 30 characters, duration.
pub fn video_label(video: &Video) -> String {
    let title: String = video.title.chars().take(TITLE_WIDTH).collect();
    let ellipsis = if video.title.chars().count() > TITLE_WIDTH {
        "..."
    } else {
        ""
    };
    format!("{}: {}{} ({}s)", video.id, title, ellipsis, video.duration)
}

/// Selection-list label of a cue point.
pub fn cue_label(cue: &CuePoint) -> String {
    format!("{}: {}", cue.ts, cue.cue)
}

/// Cue points one per line, with position, clock time and registration state.
pub fn format_cue_list(cues: &[CuePoint]) -> String {
    cues.iter()
        .enumerate()
        .map(|(pos, cue)| {
            let state = match &cue.id {
                Some(id) => format!("registered {id}"),
                None => "unregistered".to_string(),
            };
            format!(
                "{pos:>3}. [{}] {} ({state})",
                format_timestamp(cue.ts as f64),
                cue_label(cue)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The player's registry as one line per cue.
pub fn format_registry(cues: &[RegisteredCue]) -> String {
    cues.iter()
        .map(|c| format!("[{}] {} -> {}", format_timestamp(c.ts as f64), c.data.cue, c.id))
        .collect::<Vec<_>>()
        .join("\n")
}

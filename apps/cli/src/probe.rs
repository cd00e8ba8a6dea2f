use std::time::Duration;

use console::style;
use cuepoint_core::VideoId;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;

const OEMBED_URL: &str = "https://vimeo.com/api/oembed.json";

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("video id {id} not found (HTTP {status})")]
    NotFound { id: VideoId, status: u16 },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),
}

/// What the provider reports about an existing video.
#[derive(Debug, Deserialize)]
pub struct OembedVideo {
    pub title: String,
    #[serde(default)]
    pub duration: f64,
}

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(template);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Check that `id` exists at the provider before the player is asked to load it.
pub async fn probe_video(client: &reqwest::Client, id: VideoId) -> Result<OembedVideo, ProbeError> {
    let spinner = create_spinner(&format!("Checking video {id}..."));
    let result = fetch(client, id).await;
    match &result {
        Ok(video) => spinner.finish_with_message(format!(
            "{} Found: {} {}",
            style("✓").green().bold(),
            video.title,
            style(format!("({}s)", video.duration)).dim()
        )),
        Err(e) => spinner.finish_with_message(format!("{} {}", style("✗").red().bold(), e)),
    }
    result
}

async fn fetch(client: &reqwest::Client, id: VideoId) -> Result<OembedVideo, ProbeError> {
    let video_url = format!("https://vimeo.com/{id}");
    let response = client
        .get(OEMBED_URL)
        .query(&[("url", video_url.as_str())])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ProbeError::NotFound {
            id,
            status: response.status().as_u16(),
        });
    }

    Ok(response.json::<OembedVideo>().await?)
}

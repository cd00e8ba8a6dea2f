use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use cuepoint_core::{
    Catalog, Config, JsonFileStore, MemoryPlayer, Tracker, VideoId, format_cue_list, video_label,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::repl::Repl;

mod probe;
mod repl;

#[derive(Parser)]
#[command(name = "cuepoint")]
#[command(about = "Attach timestamped cue points to videos and watch them fire during playback")]
struct Cli {
    /// Directory holding the video catalog (defaults to $CUEPOINT_DATA_DIR or the user data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive session against an in-memory player
    Session {
        /// Video to load on start
        video_id: Option<VideoId>,

        /// Duration in seconds the player reports for unknown videos
        #[arg(short, long)]
        duration: Option<f64>,

        /// Check that a video exists at the provider before loading it
        #[arg(long)]
        verify: bool,
    },
    /// List the videos in the catalog
    Videos,
    /// List the stored cue points of a video
    Cues { video_id: VideoId },
}

fn init_tracing(quiet: bool) {
    let default = if quiet {
        "warn"
    } else {
        "cuepoint=info,cuepoint_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let config = match cli.data_dir {
        Some(dir) => Config::with_data_dir(dir),
        None => Config::from_env(),
    };
    let store = JsonFileStore::new(config.catalog_file());
    tracing::debug!(path = %store.path().display(), "Opening catalog");
    let catalog = Catalog::open(store)?;

    match cli.command {
        Command::Session {
            video_id,
            duration,
            verify,
        } => {
            println!(
                "\n{}  {}\n",
                style("cuepoint").cyan().bold(),
                style("Cue Point Harness").dim()
            );

            let (player, signals) =
                MemoryPlayer::new(duration.unwrap_or(config.default_duration));
            let player = Arc::new(player);
            let tracker = Tracker::new(catalog.into_shared(), Arc::clone(&player))
                .with_cue_display(config.cue_display);

            Repl::new(tracker, player, signals, verify)
                .run(video_id)
                .await?;
        }
        Command::Videos => {
            if catalog.is_empty() {
                println!(
                    "{} {}",
                    style("No videos yet.").dim(),
                    style(format!(
                        "Try: cuepoint session {}",
                        config.default_video_id
                    ))
                    .dim()
                );
            }
            for video in catalog.videos() {
                println!("{}", video_label(video));
            }
        }
        Command::Cues { video_id } => {
            let Some(index) = catalog.find_index_by_id(video_id) else {
                eprintln!(
                    "{} video {} is not in the catalog",
                    style("Error:").red().bold(),
                    video_id
                );
                std::process::exit(1);
            };
            if let Some(video) = catalog.get(index) {
                println!("{}", style(video_label(video)).bold());
                println!("{}", style("─".repeat(60)).dim());
                println!("{}", format_cue_list(&video.cue_points));
            }
        }
    }

    Ok(())
}

use std::sync::Arc;

use anyhow::Result;
use console::style;
use cuepoint_core::{
    CueError, MemoryPlayer, PlayerSignal, Registration, SignalOutcome, Tracker, VideoId,
    format_cue_list, format_registry, video_label,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

use crate::probe::probe_video;

const HELP: &str = "\
commands:
  load <id>          add a new video and load it
  open <id>          load a video from the list
  videos             show the video list
  add <ts> <text>    add a cue point, or update the one at <ts>
  rm <pos>           delete the cue point at list position <pos>
  select <pos>       show the cue point at <pos>
  list               show the cue points of the loaded video
  registry           show what the player has registered
  play <seconds>     play up to <seconds>, firing cue points
  fail-add <ts>      make the player reject adds at <ts>
  fail-remove        make the player reject removals
  heal               clear injected failures
  help               show this help
  quit";

#[derive(Debug, PartialEq)]
pub enum Command {
    Load(VideoId),
    Open(VideoId),
    Videos,
    Add { ts: i64, text: String },
    Remove(Option<usize>),
    Select(usize),
    List,
    Registry,
    Play(f64),
    FailAdd(u64),
    FailRemove,
    Heal,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let video_id = |rest: &str| rest.parse::<VideoId>().map_err(|e| e.to_string());
    let number = |rest: &str, what: &str| {
        rest.parse::<i64>()
            .map_err(|_| format!("{what} must be a whole number"))
    };

    match word {
        "load" => video_id(rest).map(Command::Load),
        "open" => video_id(rest).map(Command::Open),
        "videos" => Ok(Command::Videos),
        "add" => {
            let (ts, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let ts = if ts.is_empty() {
                // Empty timestamp is caught by the same check as empty text.
                -1
            } else {
                number(ts, "timestamp")?
            };
            Ok(Command::Add {
                ts,
                text: text.trim().to_string(),
            })
        }
        "rm" | "delete" => {
            if rest.is_empty() {
                return Ok(Command::Remove(None));
            }
            let pos = rest
                .parse::<usize>()
                .map_err(|_| "position must be a whole number".to_string())?;
            Ok(Command::Remove(Some(pos)))
        }
        "select" => rest
            .parse::<usize>()
            .map(Command::Select)
            .map_err(|_| "position must be a whole number".to_string()),
        "list" | "ls" => Ok(Command::List),
        "registry" => Ok(Command::Registry),
        "play" => rest
            .parse::<f64>()
            .map(Command::Play)
            .map_err(|_| "seconds must be a number".to_string()),
        "fail-add" => rest
            .parse::<u64>()
            .map(Command::FailAdd)
            .map_err(|_| "timestamp must be a whole number".to_string()),
        "fail-remove" => Ok(Command::FailRemove),
        "heal" => Ok(Command::Heal),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}', try 'help'")),
    }
}

pub struct Repl {
    tracker: Tracker,
    player: Arc<MemoryPlayer>,
    signals: mpsc::UnboundedReceiver<PlayerSignal>,
    client: Option<reqwest::Client>,
}

impl Repl {
    pub fn new(
        tracker: Tracker,
        player: Arc<MemoryPlayer>,
        signals: mpsc::UnboundedReceiver<PlayerSignal>,
        verify: bool,
    ) -> Self {
        Self {
            tracker,
            player,
            signals,
            client: verify.then(reqwest::Client::new),
        }
    }

    pub async fn run(mut self, initial: Option<VideoId>) -> Result<()> {
        self.player.ready();
        if let Some(id) = initial {
            let command = if self.tracker.videos().iter().any(|v| v.id == id) {
                Command::Open(id)
            } else {
                Command::Load(id)
            };
            self.execute(command).await;
        }
        self.drain().await;
        println!("{}", style(HELP).dim());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(message) => error(&message),
            }
            self.drain().await;
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) {
        let result = match command {
            Command::Load(id) => self.load(id).await,
            Command::Open(id) => self.tracker.select_video(id).await,
            Command::Videos => {
                self.show_videos();
                Ok(())
            }
            Command::Add { ts, text } => self.add(ts, text).await,
            Command::Remove(position) => self.remove(position).await,
            Command::Select(position) => {
                match self.tracker.sync().select(position) {
                    Some((ts, cue)) => println!("timestamp {ts}, cue {cue}"),
                    None => error("no cue point at that position"),
                }
                Ok(())
            }
            Command::List => {
                self.show_cues();
                Ok(())
            }
            Command::Registry => self.show_registry().await,
            Command::Play(seconds) => {
                let fired = self.player.play_to(seconds);
                println!("{} {fired} cue point(s) fired", style("▶").cyan());
                Ok(())
            }
            Command::FailAdd(ts) => {
                self.player.fail_adds_at(ts);
                Ok(())
            }
            Command::FailRemove => {
                self.player.set_fail_removes(true);
                Ok(())
            }
            Command::Heal => {
                self.player.clear_failures();
                Ok(())
            }
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Quit => Ok(()),
        };

        if let Err(e) = result {
            error(&e.to_string());
        }
    }

    async fn load(&self, id: VideoId) -> Result<(), CueError> {
        if let Some(client) = &self.client {
            match probe_video(client, id).await {
                Ok(found) => self.player.publish_video(id, found.title, found.duration),
                Err(e) => {
                    tracing::warn!(video_id = %id, error = %e, "that video id {id} is not valid.");
                    return Ok(());
                }
            }
        }
        self.tracker.request_video(id).await
    }

    async fn add(&self, ts: i64, text: String) -> Result<(), CueError> {
        let outcome = self.tracker.sync().add(ts, text).await?;
        let state = match outcome.registration {
            Registration::Registered(id) => style(format!("registered {id}")).green(),
            Registration::Failed(e) => style(format!("not registered: {e}")).yellow(),
            Registration::Superseded => style("superseded".to_string()).dim(),
        };
        println!(
            "{} {:?} at position {} ({state})",
            style("✓").green().bold(),
            outcome.placement,
            outcome.position
        );
        self.show_cues();
        Ok(())
    }

    async fn remove(&self, position: Option<usize>) -> Result<(), CueError> {
        let outcome = self.tracker.sync().remove(position).await?;
        println!(
            "{} removed {}: {}",
            style("✓").green().bold(),
            outcome.removed.ts,
            outcome.removed.cue
        );
        if let Some(e) = outcome.registry_error {
            println!("{} player still holds it: {e}", style("!").yellow().bold());
        }
        self.show_cues();
        Ok(())
    }

    async fn show_registry(&self) -> Result<(), CueError> {
        let cues = self.tracker.sync().registered().await?;
        if cues.is_empty() {
            println!("{}", style("no cue points are set on this video.").dim());
        } else {
            println!("{}", format_registry(&cues));
        }
        Ok(())
    }

    fn show_videos(&self) {
        let active = self.tracker.session().active_id;
        for video in self.tracker.videos() {
            let marker = if Some(video.id) == active { "*" } else { " " };
            println!("{marker} {}", video_label(&video));
        }
    }

    fn show_cues(&self) {
        let cues = self.tracker.sync().list();
        if cues.is_empty() {
            println!("{}", style("(no cue points)").dim());
        } else {
            println!("{}", format_cue_list(&cues));
        }
    }

    /// Hand every pending player signal to the tracker.
    async fn drain(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            match self.tracker.handle(signal).await {
                Ok(SignalOutcome::Bound {
                    index,
                    created,
                    replay,
                }) => {
                    if let Some(video) = self.tracker.videos().get(index) {
                        let verb = if created { "Added" } else { "Loaded" };
                        println!(
                            "{} {verb} {}",
                            style("✓").green().bold(),
                            video_label(video)
                        );
                    }
                    if !replay.failed.is_empty() {
                        println!(
                            "{} {} cue point(s) not registered",
                            style("!").yellow().bold(),
                            replay.failed.len()
                        );
                    }
                    self.show_cues();
                }
                Ok(SignalOutcome::ShowCue { text, hide_after }) => {
                    println!(
                        "  {} {} {}",
                        style("●").magenta(),
                        style(text).bold(),
                        style(format!("(hides after {}s)", hide_after.as_secs())).dim()
                    );
                }
                Ok(SignalOutcome::Logged) => {}
                Err(e) => error(&e.to_string()),
            }
        }
    }
}

fn error(message: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), message);
}

//! Fire-and-forget control commands.
//!
//! Each command runs on a helper thread. When it succeeds, the query it
//! affects is invalidated after a short settle delay so the backend has time
//! to apply the change before we read it back.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Deserialize;

use media_remote_types::PlayerId;

use crate::api::MediaApi;
use crate::exec::Executor;
use crate::query::{QueryClient, QueryKey};

/// Delays before re-reading state after a successful command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    pub play_pause_ms: u64,
    pub seek_ms: u64,
    pub set_position_ms: u64,
    pub volume_ms: u64,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            play_pause_ms: 200,
            seek_ms: 250,
            set_position_ms: 400,
            volume_ms: 300,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    PlayPause {
        player: PlayerId,
    },
    Seek {
        player: PlayerId,
        offset_secs: i64,
    },
    SetPosition {
        player: PlayerId,
        track_id: String,
        position_us: i64,
    },
    SetVolume {
        percent: u32,
    },
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::PlayPause { .. } => "play/pause",
            Command::Seek { .. } => "seek",
            Command::SetPosition { .. } => "set position",
            Command::SetVolume { .. } => "volume",
        }
    }

    /// Query to refresh once the command succeeded, and when.
    pub fn invalidation(&self, settle: &SettleDelays) -> Option<(QueryKey, Duration)> {
        match self {
            Command::PlayPause { player } => Some((
                QueryKey::Status(player.clone()),
                Duration::from_millis(settle.play_pause_ms),
            )),
            Command::Seek { player, .. } => Some((
                QueryKey::Position(player.clone()),
                Duration::from_millis(settle.seek_ms),
            )),
            Command::SetPosition { player, .. } => Some((
                QueryKey::Position(player.clone()),
                Duration::from_millis(settle.set_position_ms),
            )),
            Command::SetVolume { .. } => Some((
                QueryKey::Volume,
                Duration::from_millis(settle.volume_ms),
            )),
        }
    }

    fn run(&self, api: &dyn MediaApi) -> anyhow::Result<()> {
        match self {
            Command::PlayPause { player } => api.play_pause(player),
            Command::Seek {
                player,
                offset_secs,
            } => api.seek(player, *offset_secs),
            Command::SetPosition {
                player,
                track_id,
                position_us,
            } => api.set_position(player, track_id, *position_us),
            Command::SetVolume { percent } => api.set_volume(*percent),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: Command,
    pub result: Result<(), String>,
}

pub struct Commands {
    api: Arc<dyn MediaApi>,
    settle: SettleDelays,
    executor: Executor,
    tx: Sender<CommandOutcome>,
    rx: Receiver<CommandOutcome>,
}

impl Commands {
    pub fn new(api: Arc<dyn MediaApi>, settle: SettleDelays) -> Self {
        Self::with_executor(api, settle, Executor::Threads)
    }

    #[cfg(test)]
    pub(crate) fn inline(api: Arc<dyn MediaApi>, settle: SettleDelays) -> Self {
        Self::with_executor(api, settle, Executor::Inline)
    }

    fn with_executor(api: Arc<dyn MediaApi>, settle: SettleDelays, executor: Executor) -> Self {
        let (tx, rx) = unbounded();
        Self {
            api,
            settle,
            executor,
            tx,
            rx,
        }
    }

    pub fn send(&self, command: Command) {
        tracing::info!(command = ?command, "send command");
        let api = self.api.clone();
        let tx = self.tx.clone();
        let job = move || {
            let result = command.run(api.as_ref()).map_err(|e| format!("{e:#}"));
            let _ = tx.send(CommandOutcome { command, result });
        };
        if let Err(e) = self.executor.spawn("command", job) {
            tracing::warn!(error = %e, "spawn command failed");
        }
    }

    /// Collect finished commands and schedule their follow-up refreshes.
    pub fn pump(&self, queries: &mut QueryClient) -> Vec<CommandOutcome> {
        let mut done = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            match &outcome.result {
                Ok(()) => {
                    if let Some((key, delay)) = outcome.command.invalidation(&self.settle) {
                        queries.invalidate_after(key, delay);
                    }
                }
                Err(e) => {
                    tracing::warn!(command = outcome.command.label(), error = e.as_str(), "command failed");
                }
            }
            done.push(outcome);
        }
        done
    }
}

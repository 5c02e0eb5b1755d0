//! UI view-models for the TUI.
//!
//! This module converts `App` state into render-ready strings, labels,
//! and modal payloads so `render.rs` stays layout-focused.

use media_remote::logging::LogRecord;
use media_remote::now_playing::track_line;
use media_remote::position::PositionMode;
use media_remote::query::QueryState;
use media_remote::store::Player;
use media_remote::time_format::progress_label;
use media_remote::volume::{MAX_VOLUME, VolumeLevel};
use media_remote_types::PlaybackStatus;

use crate::ui::app::App;

pub(crate) struct UiView {
    pub(crate) header_lines: Vec<String>,
    pub(crate) now_playing: Vec<String>,
    pub(crate) progress: Progress,
    pub(crate) volume: (f64, String),
    pub(crate) status_line: String,
    pub(crate) keys_line: String,
    pub(crate) debug_lines: Option<Vec<String>>,
    pub(crate) active_modal: Option<UiModal>,
}

pub(crate) enum Progress {
    /// Track has a length; the bar can be scrubbed.
    Bar { ratio: f64, label: String },
    /// Nothing to seek in.
    Disabled { label: String },
}

pub(crate) enum UiModal {
    Players { title: String, items: Vec<String>, layout: ModalLayout },
    Help { title: String, body: String, layout: ModalLayout },
    Logs { title: String, lines: Vec<String>, layout: ModalLayout },
}

pub(crate) struct ModalLayout {
    pub(crate) width_pct: u16,
    pub(crate) height_pct: u16,
}

impl UiView {
    pub(crate) fn from_app(app: &App) -> Self {
        let remote = &app.remote;
        let current = remote.current_player();

        let header_lines = vec![
            format!("media-remote  →  {}", remote.settings().server),
            format!("players: {}", remote.store().state().len()),
        ];
        let now_playing = match current {
            Some((_, player)) => now_playing_lines(player),
            None => vec![empty_state(remote.players_state(), remote.players_error())],
        };
        let length = current.map(|(_, p)| p.meta.length).unwrap_or(0);
        let slider = remote.slider();
        let scrubbing = slider.is_dragging() && !slider.is_loading();
        let progress = build_progress(slider.value(), length, scrubbing);
        let volume = build_volume(remote.volume(), remote.volume_level());

        let debug_lines = app.ui.show_debug.then(|| {
            vec![
                format!("session dir: {}", remote.settings().session_dir.display()),
                format!("players query: {:?}", remote.players_state()),
                format!("store revision: {}", remote.store_revision()),
                format!("connections: {}", remote.connection_count()),
                format!("subscribed: {}", remote.subscribed_player().unwrap_or("-")),
                format!("position: {} ({})", remote.position(), mode_label(remote.position_mode())),
            ]
        });

        let active_modal = if app.ui.logs_open {
            Some(UiModal::Logs {
                title: "Logs (Esc to close, ↑/↓ scroll)".to_string(),
                lines: app.logs.records().iter().map(log_line).collect(),
                layout: ModalLayout { width_pct: 90, height_pct: 80 },
            })
        } else if app.ui.help_open {
            Some(UiModal::Help {
                title: "Help".to_string(),
                body: build_help_lines().join("\n"),
                layout: ModalLayout { width_pct: 60, height_pct: 70 },
            })
        } else if app.ui.sheet_open {
            let current_id = current.map(|(id, _)| id);
            Some(UiModal::Players {
                title: "Players (Enter to switch, Esc to close)".to_string(),
                items: remote
                    .store()
                    .players()
                    .map(|(id, player)| player_label(player, current_id == Some(id.as_str())))
                    .collect(),
                layout: ModalLayout { width_pct: 60, height_pct: 50 },
            })
        } else {
            None
        };

        Self {
            header_lines,
            now_playing,
            progress,
            volume,
            status_line: format!("status: {}", app.ui.status),
            keys_line: "keys: Space play/pause | ←/→ seek | Shift+←/→ scrub | +/- volume | m mute | p players | i info | l logs | h help | q quit".to_string(),
            debug_lines,
            active_modal,
        }
    }
}

fn now_playing_lines(player: &Player) -> Vec<String> {
    vec![
        format!("{} [{}]", player.name, status_label(player.status)),
        track_line(&player.meta.artist, &player.meta.title),
    ]
}

fn empty_state(players: QueryState, error: Option<&str>) -> String {
    match players {
        QueryState::Pending => "Loading players...".to_string(),
        QueryState::Error => format!("Cannot reach backend: {}", error.unwrap_or("unknown error")),
        QueryState::Ready => "No player available".to_string(),
    }
}

fn status_label(status: Option<PlaybackStatus>) -> &'static str {
    match status {
        Some(PlaybackStatus::Playing) => "playing",
        Some(PlaybackStatus::Paused) => "paused",
        Some(PlaybackStatus::Stopped) => "stopped",
        None => "-",
    }
}

fn mode_label(mode: PositionMode) -> &'static str {
    match mode {
        PositionMode::Idle => "idle",
        PositionMode::Push => "stream",
        PositionMode::Pull => "polled",
    }
}

pub(crate) fn build_progress(position_us: i64, length_us: i64, scrubbing: bool) -> Progress {
    if length_us <= 0 {
        return Progress::Disabled {
            label: "--:-- / --:--".to_string(),
        };
    }
    let ratio = (position_us as f64 / length_us as f64).clamp(0.0, 1.0);
    let mut label = progress_label(position_us, length_us);
    if scrubbing {
        label.push_str(" (Enter to seek)");
    }
    Progress::Bar { ratio, label }
}

pub(crate) fn build_volume(volume: u32, level: VolumeLevel) -> (f64, String) {
    let ratio = (volume as f64 / MAX_VOLUME as f64).clamp(0.0, 1.0);
    let label = match level {
        VolumeLevel::Off => "vol muted".to_string(),
        VolumeLevel::Low => format!("vol {volume}% ▁"),
        VolumeLevel::High => format!("vol {volume}% ▅"),
    };
    (ratio, label)
}

pub(crate) fn player_label(player: &Player, current: bool) -> String {
    let tag = if current { " *" } else { "" };
    let track = track_line(&player.meta.artist, &player.meta.title);
    if track.is_empty() {
        format!("{}  [{}]{tag}", player.name, status_label(player.status))
    } else {
        format!("{}  [{}]  {track}{tag}", player.name, status_label(player.status))
    }
}

pub(crate) fn log_line(record: &LogRecord) -> String {
    format!(
        "{} {:<5} {}: {}",
        record.clock(),
        record.level.as_str(),
        record.target,
        record.text
    )
}

fn build_help_lines() -> Vec<String> {
    [
        "Playback",
        "  Space        play/pause",
        "  ←/→          seek back / forward",
        "  Shift+←/→    scrub seek bar",
        "  Enter        seek to scrubbed position",
        "  Esc          cancel scrub",
        "",
        "Volume",
        "  + / -        louder / quieter",
        "  m            mute / unmute",
        "",
        "Other",
        "  p            players",
        "  i            debug info",
        "  l            logs",
        "  h or ?       help",
        "  q            quit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

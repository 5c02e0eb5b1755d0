//! Ratatui UI loop.
//!
//! Keys:
//! - Space: play/pause
//! - Left/Right: seek by the configured step
//! - Shift+Left/Right: scrub the seek bar, Enter to seek, Esc to cancel
//! - +/-: volume, m: mute
//! - p: player sheet (Up/Down, Enter to switch)
//! - i: debug info, l: logs, h: help
//! - q: quit

mod app;
mod render;
mod view_model;
mod widgets;

pub(crate) use app::run_tui;

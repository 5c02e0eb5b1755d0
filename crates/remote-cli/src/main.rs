//! `media-remote`: a terminal remote for players exposed by the media backend.
//!
//! Shows the current player's track, play state, position and volume, and
//! lets you switch between players. See `ui` for key bindings.

mod ui;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use media_remote::config::{Overrides, RemoteConfig, Settings};
use media_remote::logging::{self, LogRing};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

const LOG_CAPACITY: usize = 500;

#[derive(Parser, Debug)]
#[command(name = "media-remote", version = VERSION)]
struct Args {
    /// Base URL of the media backend, e.g. http://raspberrypi:3000
    #[arg(long)]
    server: Option<String>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path prefix of the API routes (default `/api`).
    #[arg(long)]
    api_prefix: Option<String>,

    /// Session name; remotes sharing a name share the remembered player.
    #[arg(long)]
    session: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let logs = LogRing::new(LOG_CAPACITY);
    logging::init(logs.clone())?;

    let cfg = RemoteConfig::discover(args.config.as_deref())?;
    let settings = Settings::resolve(
        cfg,
        Overrides {
            server: args.server,
            api_prefix: args.api_prefix,
            session: args.session,
        },
    )?;
    ui::run_tui(settings, logs)
}

//! Configuration loading and parsing.
//!
//! The TOML file is optional; every key has a default except the server URL,
//! which may come from the command line instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::commands::SettleDelays;

pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_SEEK_STEP_SECS: i64 = 5;
pub const DEFAULT_VOLUME_STEP: u32 = 5;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Remote configuration as read from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct RemoteConfig {
    /// Backend base URL, e.g. `http://raspberrypi:3000`.
    pub server: Option<String>,
    /// Path prefix of the API routes (default `/api`).
    pub api_prefix: Option<String>,
    /// Root for per-session state (default: system temp dir).
    pub session_dir: Option<String>,
    /// Delays before re-reading state after commands.
    pub settle: Option<SettleDelays>,
    /// Seconds skipped by the seek buttons.
    pub seek_step_secs: Option<i64>,
    /// Percent changed per volume key press.
    pub volume_step: Option<u32>,
    /// Player list refresh interval; `0` disables polling.
    pub poll_interval_ms: Option<u64>,
    /// Show the debug panel on start.
    pub show_debug_info: Option<bool>,
    /// Open the player sheet on start.
    pub player_sheet_open: Option<bool>,
}

impl RemoteConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<RemoteConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Load `path` if given, else `config.toml` next to the executable if it
    /// exists, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let auto_path = std::env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
        match auto_path {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "using config next to executable");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// Resolved runtime settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub server: String,
    pub api_prefix: String,
    pub session_dir: PathBuf,
    pub session: Option<String>,
    pub settle: SettleDelays,
    pub seek_step_secs: i64,
    pub volume_step: u32,
    pub poll_interval: Option<Duration>,
    pub show_debug_info: bool,
    pub player_sheet_open: bool,
}

/// Values given on the command line; they win over the file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub api_prefix: Option<String>,
    pub session: Option<String>,
}

impl Settings {
    pub fn resolve(cfg: RemoteConfig, overrides: Overrides) -> Result<Self> {
        let server = overrides
            .server
            .or(cfg.server)
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("server is required; use --server or set it in config"))?;
        if !server.starts_with("http://") && !server.starts_with("https://") {
            return Err(anyhow::anyhow!("server must be an http(s) URL, got {server}"));
        }
        let poll_interval_ms = cfg.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        Ok(Self {
            server,
            api_prefix: overrides
                .api_prefix
                .or(cfg.api_prefix)
                .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string()),
            session_dir: cfg
                .session_dir
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            session: overrides.session,
            settle: cfg.settle.unwrap_or_default(),
            seek_step_secs: cfg.seek_step_secs.unwrap_or(DEFAULT_SEEK_STEP_SECS),
            volume_step: cfg.volume_step.unwrap_or(DEFAULT_VOLUME_STEP),
            poll_interval: (poll_interval_ms > 0).then(|| Duration::from_millis(poll_interval_ms)),
            show_debug_info: cfg.show_debug_info.unwrap_or(false),
            player_sheet_open: cfg.player_sheet_open.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_file_is_empty() {
        let cfg: RemoteConfig = toml::from_str("").unwrap();
        let settings = Settings::resolve(
            cfg,
            Overrides {
                server: Some("http://pi:3000/".into()),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.server, "http://pi:3000");
        assert_eq!(settings.api_prefix, "/api");
        assert_eq!(settings.settle, SettleDelays::default());
        assert_eq!(settings.seek_step_secs, 5);
        assert_eq!(settings.poll_interval, Some(Duration::from_secs(5)));
        assert!(!settings.player_sheet_open);
    }

    #[test]
    fn file_values_and_cli_precedence() {
        let cfg: RemoteConfig = toml::from_str(
            r#"
server = "http://from-file:3000"
api_prefix = ""
poll_interval_ms = 0
show_debug_info = true

[settle]
seek_ms = 500
"#,
        )
        .unwrap();
        let settings = Settings::resolve(
            cfg,
            Overrides {
                server: Some("https://cli:8443".into()),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.server, "https://cli:8443");
        assert_eq!(settings.api_prefix, "");
        assert_eq!(settings.poll_interval, None);
        assert!(settings.show_debug_info);
        assert_eq!(settings.settle.seek_ms, 500);
        assert_eq!(settings.settle.play_pause_ms, 200);
    }

    #[test]
    fn server_is_required() {
        let err = Settings::resolve(RemoteConfig::default(), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("--server"));
        assert!(
            Settings::resolve(
                RemoteConfig::default(),
                Overrides {
                    server: Some("pi:3000".into()),
                    ..Overrides::default()
                }
            )
            .is_err()
        );
    }

    #[test]
    fn load_reads_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "media-remote-config-{}.toml",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&path, "volume_step = 10\n").unwrap();
        let cfg = RemoteConfig::load(&path).unwrap();
        assert_eq!(cfg.volume_step, Some(10));
        let _ = std::fs::remove_file(&path);
        assert!(RemoteConfig::load(&path).is_err());
    }
}

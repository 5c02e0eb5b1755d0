//! Blocking HTTP client for the media control backend.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use media_remote_types::{Metadata, NameId, PlaybackStatus};

pub trait MediaApi: Send + Sync {
    fn players(&self) -> Result<Vec<NameId>>;
    fn metadata(&self, id: &str) -> Result<Metadata>;
    fn status(&self, id: &str) -> Result<PlaybackStatus>;
    /// Current position in microseconds.
    fn position(&self, id: &str) -> Result<i64>;
    /// System volume in percent.
    fn volume(&self) -> Result<u32>;
    fn play_pause(&self, id: &str) -> Result<()>;
    /// Relative seek in whole seconds.
    fn seek(&self, id: &str, offset_secs: i64) -> Result<()>;
    fn set_position(&self, id: &str, track_id: &str, position_us: i64) -> Result<()>;
    fn set_volume(&self, percent: u32) -> Result<()>;
}

/// URL layout of the backend, rooted at `<server><api_prefix>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(server: &str, api_prefix: &str) -> Self {
        let server = server.trim_end_matches('/');
        let prefix = api_prefix.trim_matches('/');
        let base = if prefix.is_empty() {
            server.to_string()
        } else {
            format!("{server}/{prefix}")
        };
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn players(&self) -> String {
        format!("{}/media/players", self.base)
    }

    pub fn metadata(&self, id: &str) -> String {
        self.player_path("metadata", id)
    }

    pub fn status(&self, id: &str) -> String {
        self.player_path("status", id)
    }

    pub fn position(&self, id: &str) -> String {
        self.player_path("position", id)
    }

    pub fn play_pause(&self, id: &str) -> String {
        self.player_path("play_pause", id)
    }

    pub fn seek(&self, id: &str, offset_secs: i64) -> String {
        format!("{}?offset={offset_secs}", self.player_path("seek", id))
    }

    pub fn set_position(&self, id: &str, track_id: &str, position_us: i64) -> String {
        format!(
            "{}?track_id={}&position={position_us}",
            self.player_path("position", id),
            urlencoding::encode(track_id)
        )
    }

    pub fn volume(&self) -> String {
        format!("{}/volume", self.base)
    }

    /// Push stream carrying `metadata` and `status` events.
    pub fn player_events(&self, id: &str) -> String {
        self.player_path("player-sse", id)
    }

    /// Push stream carrying `position` events.
    pub fn position_events(&self, id: &str) -> String {
        self.player_path("position-sse", id)
    }

    fn player_path(&self, kind: &str, id: &str) -> String {
        format!("{}/media/{kind}/{}", self.base, urlencoding::encode(id))
    }
}

#[derive(Clone, Debug)]
pub struct HttpMediaApi {
    endpoints: Endpoints,
}

impl HttpMediaApi {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

impl MediaApi for HttpMediaApi {
    fn players(&self) -> Result<Vec<NameId>> {
        let url = self.endpoints.players();
        read_json(
            ureq::get(&url).call().context("request /media/players")?,
            "media/players",
        )
    }

    fn metadata(&self, id: &str) -> Result<Metadata> {
        let url = self.endpoints.metadata(id);
        read_json(
            ureq::get(&url).call().context("request /media/metadata")?,
            "media/metadata",
        )
    }

    fn status(&self, id: &str) -> Result<PlaybackStatus> {
        let url = self.endpoints.status(id);
        let body = read_text(
            ureq::get(&url).call().context("request /media/status")?,
            "media/status",
        )?;
        body.parse::<PlaybackStatus>()
            .context("decode /media/status response")
    }

    fn position(&self, id: &str) -> Result<i64> {
        let url = self.endpoints.position(id);
        let body = read_text(
            ureq::get(&url).call().context("request /media/position")?,
            "media/position",
        )?;
        body.trim()
            .parse::<i64>()
            .with_context(|| format!("decode /media/position response {body:?}"))
    }

    fn volume(&self) -> Result<u32> {
        let url = self.endpoints.volume();
        let body = read_text(ureq::get(&url).call().context("request /volume")?, "volume")?;
        body.trim()
            .trim_matches('"')
            .parse::<u32>()
            .with_context(|| format!("decode /volume response {body:?}"))
    }

    fn play_pause(&self, id: &str) -> Result<()> {
        let url = self.endpoints.play_pause(id);
        let resp = ureq::post(&url)
            .send_empty()
            .context("request /media/play_pause")?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("play/pause failed with {}", resp.status()));
        }
        Ok(())
    }

    fn seek(&self, id: &str, offset_secs: i64) -> Result<()> {
        let url = self.endpoints.seek(id, offset_secs);
        let resp = ureq::post(&url)
            .send_empty()
            .context("request /media/seek")?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("seek failed with {}", resp.status()));
        }
        Ok(())
    }

    fn set_position(&self, id: &str, track_id: &str, position_us: i64) -> Result<()> {
        let url = self.endpoints.set_position(id, track_id, position_us);
        let resp = ureq::post(&url)
            .send_empty()
            .context("request /media/position")?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("set position failed with {}", resp.status()));
        }
        Ok(())
    }

    fn set_volume(&self, percent: u32) -> Result<()> {
        let url = self.endpoints.volume();
        let percent = percent.to_string();
        let resp = ureq::post(&url)
            .send_form([("percent", percent.as_str())])
            .context("request /volume")?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("set volume failed with {}", resp.status()));
        }
        Ok(())
    }
}

fn read_text(mut resp: ureq::http::Response<ureq::Body>, label: &str) -> Result<String> {
    resp.body_mut()
        .read_to_string()
        .with_context(|| format!("read /{label} response body"))
}

fn read_json<T: DeserializeOwned>(resp: ureq::http::Response<ureq::Body>, label: &str) -> Result<T> {
    let body = read_text(resp, label)?;
    serde_json::from_str(&body).with_context(|| format!("decode /{label} response"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_prefix_and_encode_ids() {
        let ep = Endpoints::new("http://pi:3000/", "/api");
        assert_eq!(ep.players(), "http://pi:3000/api/media/players");
        assert_eq!(
            ep.player_events("org.mpris.MediaPlayer2.vlc"),
            "http://pi:3000/api/media/player-sse/org.mpris.MediaPlayer2.vlc"
        );
        assert_eq!(ep.status("a b"), "http://pi:3000/api/media/status/a%20b");
        assert_eq!(ep.seek("vlc", -5), "http://pi:3000/api/media/seek/vlc?offset=-5");
        assert_eq!(
            ep.set_position("vlc", "/org/track/1", 42),
            "http://pi:3000/api/media/position/vlc?track_id=%2Forg%2Ftrack%2F1&position=42"
        );
        assert_eq!(ep.volume(), "http://pi:3000/api/volume");
    }

    #[test]
    fn empty_prefix_uses_server_root() {
        let ep = Endpoints::new("http://pi:3000", "");
        assert_eq!(ep.position_events("x"), "http://pi:3000/media/position-sse/x");
    }
}

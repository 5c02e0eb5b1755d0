use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque player identifier as reported by the control backend.
pub type PlayerId = String;

/// Payload sent on the position stream when the track has no more frames.
pub const END_OF_STREAM: &str = "EOS";

/// Now-playing metadata reported for a player.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Metadata {
    /// Track object path/id, required to set an absolute position.
    pub track_id: String,
    /// Track title.
    pub title: String,
    /// Cover art URL (`file://` or remote).
    pub art_url: String,
    /// Media URL.
    pub url: String,
    /// Track length in microseconds.
    pub length: i64,
    /// Artists in reported order.
    pub artist: Vec<String>,
}

/// Partial metadata; `None` fields leave the previous value untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub art_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<Vec<String>>,
}

impl MetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.track_id.is_none()
            && self.title.is_none()
            && self.art_url.is_none()
            && self.url.is_none()
            && self.length.is_none()
            && self.artist.is_none()
    }
}

impl From<Metadata> for MetadataUpdate {
    fn from(meta: Metadata) -> Self {
        Self {
            track_id: Some(meta.track_id),
            title: Some(meta.title),
            art_url: Some(meta.art_url),
            url: Some(meta.url),
            length: Some(meta.length),
            artist: Some(meta.artist),
        }
    }
}

impl Metadata {
    /// Merge `update` into `self`, field by field.
    pub fn apply(&mut self, update: &MetadataUpdate) {
        if let Some(track_id) = update.track_id.as_ref() {
            self.track_id = track_id.clone();
        }
        if let Some(title) = update.title.as_ref() {
            self.title = title.clone();
        }
        if let Some(art_url) = update.art_url.as_ref() {
            self.art_url = art_url.clone();
        }
        if let Some(url) = update.url.as_ref() {
            self.url = url.clone();
        }
        if let Some(length) = update.length {
            self.length = length;
        }
        if let Some(artist) = update.artist.as_ref() {
            self.artist = artist.clone();
        }
    }

    /// Return a copy with `update` merged in.
    pub fn merged(&self, update: &MetadataUpdate) -> Self {
        let mut out = self.clone();
        out.apply(update);
        out
    }
}

/// Playback state of a player.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown playback status {:?}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for PlaybackStatus {
    type Err = ParseStatusError;

    /// Accepts the bare status word as well as a JSON string (`"Playing"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"') {
            "Playing" => Ok(PlaybackStatus::Playing),
            "Paused" => Ok(PlaybackStatus::Paused),
            "Stopped" => Ok(PlaybackStatus::Stopped),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// `(name, id)` pair as returned by the player list endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameId(pub String, pub PlayerId);

impl NameId {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }
}

/// A value received on the position stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionUpdate {
    /// Current position in microseconds.
    Micros(i64),
    /// The track reached its end; no further updates follow.
    EndOfStream,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsePositionError(pub String);

impl fmt::Display for ParsePositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid position payload {:?}", self.0)
    }
}

impl std::error::Error for ParsePositionError {}

impl FromStr for PositionUpdate {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw == END_OF_STREAM {
            return Ok(PositionUpdate::EndOfStream);
        }
        raw.parse::<i64>()
            .map(PositionUpdate::Micros)
            .map_err(|_| ParsePositionError(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_id_decodes_from_pair() {
        let list: Vec<NameId> =
            serde_json::from_str(r#"[["VLC", "org.mpris.MediaPlayer2.vlc"]]"#).unwrap();
        assert_eq!(list[0].name(), "VLC");
        assert_eq!(list[0].id(), "org.mpris.MediaPlayer2.vlc");
    }

    #[test]
    fn partial_metadata_keeps_untouched_fields() {
        let base = Metadata {
            track_id: "/t/1".into(),
            title: "Old".into(),
            length: 10,
            artist: vec!["A".into()],
            ..Metadata::default()
        };
        let update: MetadataUpdate = serde_json::from_str(r#"{"title":"New"}"#).unwrap();
        let merged = base.merged(&update);
        assert_eq!(merged.title, "New");
        assert_eq!(merged.track_id, "/t/1");
        assert_eq!(merged.length, 10);
        assert_eq!(merged.artist, vec!["A".to_string()]);
    }

    #[test]
    fn status_parses_plain_and_quoted() {
        assert_eq!("Playing".parse::<PlaybackStatus>(), Ok(PlaybackStatus::Playing));
        assert_eq!("\"Paused\"\n".parse::<PlaybackStatus>(), Ok(PlaybackStatus::Paused));
        assert!("playing".parse::<PlaybackStatus>().is_err());
    }

    #[test]
    fn end_of_stream_is_not_a_number() {
        assert_eq!("EOS".parse::<PositionUpdate>(), Ok(PositionUpdate::EndOfStream));
        assert_eq!("0".parse::<PositionUpdate>(), Ok(PositionUpdate::Micros(0)));
        assert_eq!(
            "125000000".parse::<PositionUpdate>(),
            Ok(PositionUpdate::Micros(125_000_000))
        );
        assert!("EOSX".parse::<PositionUpdate>().is_err());
    }
}

//! Log capture for the terminal UI.
//!
//! The terminal is in raw mode while the remote runs, so records are kept in
//! a bounded in-memory ring and shown by the logs modal instead of stderr.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::{Context as _, Result};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;

pub const DEFAULT_FILTER: &str = "info,media_remote=info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    /// Message followed by `[key=value, ...]` when the event carries fields.
    pub text: String,
    pub at: SystemTime,
}

impl LogRecord {
    /// `HH:MM:SS` (UTC) of the record.
    pub fn clock(&self) -> String {
        let secs = self
            .at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            % 86_400;
        format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
    }
}

/// Shared ring of the most recent records. Clones share the same ring.
#[derive(Clone, Debug)]
pub struct LogRing {
    records: Arc<Mutex<VecDeque<LogRecord>>>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, record: LogRecord) {
        let Ok(mut records) = self.records.lock() else {
            return;
        };
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Layer feeding every enabled event into a [`LogRing`].
pub struct RingLayer {
    ring: LogRing,
}

impl RingLayer {
    pub fn new(ring: LogRing) -> Self {
        Self { ring }
    }
}

impl<S: Subscriber> Layer<S> for RingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);
        let meta = event.metadata();
        self.ring.push(LogRecord {
            level: *meta.level(),
            target: meta.target().to_string(),
            text: fields.finish(),
            at: SystemTime::now(),
        });
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    pairs: Vec<(&'static str, String)>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.pairs.push((field.name(), value));
        }
    }

    fn finish(self) -> String {
        let mut text = self.message;
        if self.pairs.is_empty() {
            return text;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push('[');
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            let _ = write!(text, "{name}={value}");
        }
        text.push(']');
        text
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `%value` fields and format_args messages arrive here.
        self.put(field, format!("{value:?}"));
    }
}

/// Install the global subscriber: `RUST_LOG` filtering, records into `ring`.
pub fn init(ring: LogRing) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(RingLayer::new(ring))
        .try_init()
        .context("install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn capture(ring: &LogRing, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(RingLayer::new(ring.clone()));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn ring_drops_oldest_first() {
        let ring = LogRing::new(2);
        capture(&ring, || {
            for i in 0..3 {
                tracing::info!("m{i}");
            }
        });
        let texts: Vec<_> = ring.records().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["m1".to_string(), "m2".to_string()]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn fields_follow_message_in_brackets() {
        let ring = LogRing::new(8);
        capture(&ring, || {
            tracing::warn!(player = "vlc", connection = 3u64, keepalive = true, "event stream failed");
            tracing::info!("plain");
        });
        let records = ring.records();
        assert_eq!(records[0].level, Level::WARN);
        assert_eq!(
            records[0].text,
            "event stream failed [player=vlc, connection=3, keepalive=true]"
        );
        assert_eq!(records[1].text, "plain");
    }

    #[test]
    fn display_fields_are_not_quoted() {
        let ring = LogRing::new(8);
        let reason = "connection reset";
        capture(&ring, || {
            tracing::debug!(reason = %reason, "closed");
        });
        assert_eq!(ring.records()[0].text, "closed [reason=connection reset]");
    }

    #[test]
    fn clock_is_utc_time_of_day() {
        let record = LogRecord {
            level: Level::INFO,
            target: "t".into(),
            text: String::new(),
            at: SystemTime::UNIX_EPOCH + Duration::from_secs(86_400 + 3_723),
        };
        assert_eq!(record.clock(), "01:02:03");
    }
}

//! Push-connection transports.
//!
//! A transport opens one long-lived event stream and forwards every decoded
//! event, tagged with the connection id it was opened with, into a channel.
//! Reader threads never touch shared state; the multiplexer drains the channel.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;

use crate::sse::SseDecoder;

/// Message sent from a connection reader to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Event {
        connection: u64,
        event: String,
        data: String,
    },
    /// The connection is gone (I/O error, end of body, refused request).
    Failed { connection: u64, reason: String },
}

/// Owner-side handle of an open connection. Closing (or dropping) it raises
/// the cancel flag; the reader exits on its next wake-up.
#[derive(Debug)]
pub struct ConnectionHandle {
    cancel: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    pub fn close(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub trait EventTransport: Send + Sync {
    /// Open a stream for `url`. Must not block on the network.
    fn open(
        &self,
        url: &str,
        connection: u64,
        events: Sender<StreamMessage>,
    ) -> Result<ConnectionHandle>;
}

/// Server-sent events over HTTP, one reader thread per connection.
#[derive(Clone, Debug)]
pub struct HttpEventTransport {
    connect_timeout: Duration,
}

impl Default for HttpEventTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl HttpEventTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl EventTransport for HttpEventTransport {
    fn open(
        &self,
        url: &str,
        connection: u64,
        events: Sender<StreamMessage>,
    ) -> Result<ConnectionHandle> {
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = ConnectionHandle::new(cancel.clone());
        let url = url.to_string();
        let connect_timeout = self.connect_timeout;
        std::thread::Builder::new()
            .name(format!("sse-{connection}"))
            .spawn(move || {
                let reason = match read_stream(&url, connection, connect_timeout, &cancel, &events)
                {
                    Ok(()) => "stream ended".to_string(),
                    Err(e) => format!("{e:#}"),
                };
                if !cancel.load(Ordering::Relaxed) {
                    tracing::debug!(url = url.as_str(), connection, reason = reason.as_str(), "event stream closed");
                    let _ = events.send(StreamMessage::Failed { connection, reason });
                }
            })
            .context("spawn event stream reader")?;
        Ok(handle)
    }
}

fn read_stream(
    url: &str,
    connection: u64,
    connect_timeout: Duration,
    cancel: &AtomicBool,
    events: &Sender<StreamMessage>,
) -> Result<()> {
    let resp = ureq::get(url)
        .config()
        .timeout_connect(Some(connect_timeout))
        .build()
        .header("Accept", "text/event-stream")
        .call()
        .with_context(|| format!("request {url}"))?;
    tracing::debug!(url, connection, "event stream open");

    let (_, body) = resp.into_parts();
    let reader = BufReader::new(body.into_reader());
    let mut decoder = SseDecoder::new();
    for line in reader.lines() {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        let line = line.context("read event stream")?;
        if let Some(event) = decoder.push_line(&line) {
            let msg = StreamMessage::Event {
                connection,
                event: event.event,
                data: event.data,
            };
            if events.send(msg).is_err() {
                // Owner is gone.
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Opened {
        log: Vec<String>,
        live: HashMap<String, (u64, Sender<StreamMessage>, Arc<AtomicBool>)>,
        fail_next: bool,
    }

    /// Records opened URLs and lets tests push events into live connections.
    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        inner: Arc<Mutex<Opened>>,
    }

    impl FakeTransport {
        pub(crate) fn opened(&self) -> Vec<String> {
            self.inner.lock().unwrap().log.clone()
        }

        pub(crate) fn is_open(&self, url: &str) -> bool {
            self.inner
                .lock()
                .unwrap()
                .live
                .get(url)
                .map(|(_, _, cancel)| !cancel.load(Ordering::Relaxed))
                .unwrap_or(false)
        }

        pub(crate) fn fail_next_open(&self) {
            self.inner.lock().unwrap().fail_next = true;
        }

        pub(crate) fn emit(&self, url: &str, event: &str, data: &str) {
            let inner = self.inner.lock().unwrap();
            let (connection, tx, _) = inner.live.get(url).expect("connection for url");
            tx.send(StreamMessage::Event {
                connection: *connection,
                event: event.to_string(),
                data: data.to_string(),
            })
            .unwrap();
        }

        pub(crate) fn drop_connection(&self, url: &str) {
            let inner = self.inner.lock().unwrap();
            let (connection, tx, _) = inner.live.get(url).expect("connection for url");
            tx.send(StreamMessage::Failed {
                connection: *connection,
                reason: "connection reset".into(),
            })
            .unwrap();
        }
    }

    impl EventTransport for FakeTransport {
        fn open(
            &self,
            url: &str,
            connection: u64,
            events: Sender<StreamMessage>,
        ) -> Result<ConnectionHandle> {
            let mut inner = self.inner.lock().unwrap();
            if std::mem::take(&mut inner.fail_next) {
                return Err(anyhow::anyhow!("refused"));
            }
            let cancel = Arc::new(AtomicBool::new(false));
            inner.log.push(url.to_string());
            inner
                .live
                .insert(url.to_string(), (connection, events, cancel.clone()));
            Ok(ConnectionHandle::new(cancel))
        }
    }
}

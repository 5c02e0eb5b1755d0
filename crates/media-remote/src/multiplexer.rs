//! Shared push-connection registry.
//!
//! One connection per URL, shared by every subscriber of that URL. The
//! registry exclusively owns the connections; listeners are reference-counted
//! callbacks compared by pointer, so removing one subscriber never disturbs its
//! siblings. A connection exists exactly while its listener set is non-empty.
//!
//! Reader threads only enqueue [`StreamMessage`]s; [`StreamMultiplexer::pump`]
//! runs on the owning (UI) thread and invokes listeners there.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::transport::{ConnectionHandle, EventTransport, StreamMessage};

/// Heartbeat event name; handled as a no-op when requested.
pub const KEEPALIVE_EVENT: &str = "keepalive";
/// Server-signalled failure on a stream.
pub const ERROR_EVENT: &str = "error";

/// Subscriber callback, invoked with `(event_name, raw_payload)`.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&str, &str) + Send + Sync>);

impl Listener {
    pub fn new(f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, event: &str, data: &str) {
        (self.0)(event, data)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", self.addr())
    }
}

struct Source {
    connection: u64,
    handle: ConnectionHandle,
    events: Vec<String>,
    keepalive: bool,
    listeners: Vec<Listener>,
}

/// Outcome of one [`StreamMultiplexer::pump`] pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Listener invocations performed.
    pub delivered: usize,
    /// URLs whose connection failed and was torn down.
    pub failed: Vec<String>,
}

pub struct StreamMultiplexer {
    transport: Box<dyn EventTransport>,
    sources: HashMap<String, Source>,
    urls_by_connection: HashMap<u64, String>,
    next_connection: u64,
    tx: Sender<StreamMessage>,
    rx: Receiver<StreamMessage>,
}

impl StreamMultiplexer {
    pub fn new(transport: Box<dyn EventTransport>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            transport,
            sources: HashMap::new(),
            urls_by_connection: HashMap::new(),
            next_connection: 1,
            tx,
            rx,
        }
    }

    /// Register `listener` on `url`, opening the connection on first use.
    ///
    /// `events` and `keepalive` only take effect when this call opens the
    /// connection. Registering the same listener twice is a no-op.
    pub fn connect(
        &mut self,
        url: &str,
        events: &[&str],
        keepalive: bool,
        listener: &Listener,
    ) -> Result<()> {
        if !self.sources.contains_key(url) {
            let connection = self.next_connection;
            self.next_connection += 1;
            let handle = self
                .transport
                .open(url, connection, self.tx.clone())
                .with_context(|| format!("open event stream {url}"))?;
            tracing::debug!(url, connection, events = ?events, keepalive, "event source opened");
            self.urls_by_connection.insert(connection, url.to_string());
            self.sources.insert(
                url.to_string(),
                Source {
                    connection,
                    handle,
                    events: events.iter().map(|e| e.to_string()).collect(),
                    keepalive,
                    listeners: Vec::new(),
                },
            );
        }

        if let Some(source) = self.sources.get_mut(url) {
            if !source.listeners.contains(listener) {
                source.listeners.push(listener.clone());
            }
        }
        Ok(())
    }

    /// Remove `listener` from `url`; the last removal closes the connection.
    pub fn close(&mut self, url: &str, listener: &Listener) {
        let Some(source) = self.sources.get_mut(url) else {
            return;
        };
        source.listeners.retain(|l| l != listener);
        if source.listeners.is_empty() {
            tracing::debug!(url, "last listener removed, closing event source");
            self.teardown(url);
        }
    }

    pub fn is_connected(&self, url: &str) -> bool {
        self.sources.contains_key(url)
    }

    pub fn listener_count(&self, url: &str) -> usize {
        self.sources
            .get(url)
            .map(|s| s.listeners.len())
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.sources.len()
    }

    /// Deliver everything the readers queued since the last pass.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                StreamMessage::Event {
                    connection,
                    event,
                    data,
                } => {
                    let Some(url) = self.urls_by_connection.get(&connection).cloned() else {
                        // Stale message from a connection closed earlier.
                        continue;
                    };
                    if event == ERROR_EVENT && !self.wants(&url, ERROR_EVENT) {
                        tracing::warn!(url = url.as_str(), error = data.as_str(), "event stream reported error");
                        self.teardown(&url);
                        report.failed.push(url);
                        continue;
                    }
                    report.delivered += self.dispatch(&url, &event, &data);
                }
                StreamMessage::Failed { connection, reason } => {
                    let Some(url) = self.urls_by_connection.get(&connection).cloned() else {
                        continue;
                    };
                    tracing::warn!(url = url.as_str(), reason = reason.as_str(), "event stream failed");
                    self.teardown(&url);
                    report.failed.push(url);
                }
            }
        }
        report
    }

    fn wants(&self, url: &str, event: &str) -> bool {
        self.sources
            .get(url)
            .map(|s| s.events.iter().any(|e| e == event))
            .unwrap_or(false)
    }

    fn dispatch(&self, url: &str, event: &str, data: &str) -> usize {
        let Some(source) = self.sources.get(url) else {
            return 0;
        };
        if !source.events.iter().any(|e| e == event) {
            if event == KEEPALIVE_EVENT && source.keepalive {
                tracing::trace!(url, "keepalive");
            } else {
                tracing::trace!(url, event, "ignoring unrequested event");
            }
            return 0;
        }

        let mut delivered = 0;
        for listener in &source.listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.call(event, data)));
            match result {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(url, event, listener = ?listener, "listener panicked");
                }
            }
        }
        delivered
    }

    fn teardown(&mut self, url: &str) {
        if let Some(source) = self.sources.remove(url) {
            source.handle.close();
            self.urls_by_connection.remove(&source.connection);
        }
    }
}

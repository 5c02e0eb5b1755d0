//! Request/response cache.
//!
//! Each [`QueryKey`] maps to one cached result. Fetches run on helper threads
//! and report back over a channel; [`QueryClient::pump`] folds the results into
//! the cache on the owning thread. At most one fetch per key is in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use media_remote_types::{Metadata, NameId, PlaybackStatus, PlayerId};

use crate::api::MediaApi;
use crate::exec::Executor;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Players,
    Metadata(PlayerId),
    Status(PlayerId),
    Position(PlayerId),
    Volume,
}

impl QueryKey {
    /// Request path segments, used in log lines.
    pub fn path(&self) -> String {
        match self {
            QueryKey::Players => "/media/players".to_string(),
            QueryKey::Metadata(id) => format!("/media/metadata/{id}"),
            QueryKey::Status(id) => format!("/media/status/{id}"),
            QueryKey::Position(id) => format!("/media/position/{id}"),
            QueryKey::Volume => "/volume".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryData {
    Players(Vec<NameId>),
    Metadata(Metadata),
    Status(PlaybackStatus),
    Position(i64),
    Volume(u32),
}

impl QueryData {
    pub fn as_players(&self) -> Option<&[NameId]> {
        match self {
            QueryData::Players(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&Metadata> {
        match self {
            QueryData::Metadata(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<PlaybackStatus> {
        match self {
            QueryData::Status(status) => Some(*status),
            _ => None,
        }
    }

    pub fn as_position(&self) -> Option<i64> {
        match self {
            QueryData::Position(us) => Some(*us),
            _ => None,
        }
    }

    pub fn as_volume(&self) -> Option<u32> {
        match self {
            QueryData::Volume(percent) => Some(*percent),
            _ => None,
        }
    }
}

/// What a reader of a key should render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryState {
    /// No result yet.
    Pending,
    /// Data available (possibly being refreshed).
    Ready,
    /// Last fetch failed and no data was ever received.
    Error,
}

#[derive(Debug, Default)]
struct Entry {
    data: Option<QueryData>,
    error: Option<String>,
    in_flight: bool,
    refetch_when_done: bool,
    updated_at: Option<Instant>,
}

struct Completed {
    key: QueryKey,
    result: Result<QueryData, String>,
}

pub struct QueryClient {
    api: Arc<dyn MediaApi>,
    entries: HashMap<QueryKey, Entry>,
    scheduled: Vec<(Instant, QueryKey)>,
    intervals: HashMap<QueryKey, (Duration, Instant)>,
    tx: Sender<Completed>,
    rx: Receiver<Completed>,
    executor: Executor,
}

impl QueryClient {
    pub fn new(api: Arc<dyn MediaApi>) -> Self {
        Self::with_executor(api, Executor::Threads)
    }

    /// Runs fetches synchronously on the calling thread.
    #[cfg(test)]
    pub(crate) fn inline(api: Arc<dyn MediaApi>) -> Self {
        Self::with_executor(api, Executor::Inline)
    }

    fn with_executor(api: Arc<dyn MediaApi>, executor: Executor) -> Self {
        let (tx, rx) = unbounded();
        Self {
            api,
            entries: HashMap::new(),
            scheduled: Vec::new(),
            intervals: HashMap::new(),
            tx,
            rx,
            executor,
        }
    }

    pub fn api(&self) -> &Arc<dyn MediaApi> {
        &self.api
    }

    /// Start a fetch for `key` unless one is already running.
    pub fn fetch(&mut self, key: &QueryKey) {
        let entry = self.entries.entry(key.clone()).or_default();
        if entry.in_flight {
            return;
        }
        entry.in_flight = true;
        tracing::debug!(query = %key.path(), "fetch");

        let api = self.api.clone();
        let tx = self.tx.clone();
        let job_key = key.clone();
        let job = move || {
            let result = run_query(api.as_ref(), &job_key).map_err(|e| format!("{e:#}"));
            let _ = tx.send(Completed {
                key: job_key,
                result,
            });
        };
        if let Err(e) = self.executor.spawn("query", job) {
            tracing::warn!(query = %key.path(), error = %e, "spawn query failed");
            if let Some(entry) = self.entries.get_mut(key) {
                entry.in_flight = false;
                entry.error = Some(format!("spawn query: {e}"));
            }
        }
    }

    /// Fetch `key` the first time it is read.
    pub fn ensure(&mut self, key: &QueryKey) -> QueryState {
        if !self.entries.contains_key(key) {
            self.fetch(key);
        }
        self.state(key)
    }

    /// Mark `key` stale and refetch it if anybody has read it. A fetch already
    /// in flight is followed by a fresh one.
    pub fn invalidate(&mut self, key: &QueryKey) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        if entry.in_flight {
            entry.refetch_when_done = true;
            return;
        }
        self.fetch(key);
    }

    pub fn invalidate_after(&mut self, key: QueryKey, delay: Duration) {
        self.scheduled.push((Instant::now() + delay, key));
    }

    /// Refetch `key` every `interval`, starting one interval from now.
    pub fn set_refetch_interval(&mut self, key: QueryKey, interval: Duration) {
        self.intervals.insert(key, (interval, Instant::now()));
    }

    /// Overwrite the cached value without a round-trip.
    pub fn set_query_data(&mut self, key: QueryKey, data: QueryData) {
        let entry = self.entries.entry(key).or_default();
        entry.data = Some(data);
        entry.error = None;
        entry.updated_at = Some(Instant::now());
    }

    pub fn data(&self, key: &QueryKey) -> Option<&QueryData> {
        self.entries.get(key).and_then(|e| e.data.as_ref())
    }

    pub fn error(&self, key: &QueryKey) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.error.as_deref())
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.entries.get(key).map(|e| e.in_flight).unwrap_or(false)
    }

    pub fn updated_at(&self, key: &QueryKey) -> Option<Instant> {
        self.entries.get(key).and_then(|e| e.updated_at)
    }

    pub fn state(&self, key: &QueryKey) -> QueryState {
        match self.entries.get(key) {
            Some(Entry { data: Some(_), .. }) => QueryState::Ready,
            Some(Entry { error: Some(_), .. }) => QueryState::Error,
            _ => QueryState::Pending,
        }
    }

    pub fn is_pending(&self, key: &QueryKey) -> bool {
        self.state(key) == QueryState::Pending
    }

    /// Fold finished fetches into the cache and fire due timers. Returns the
    /// keys whose fetch settled, in completion order.
    pub fn pump(&mut self) -> Vec<QueryKey> {
        self.pump_at(Instant::now())
    }

    pub(crate) fn pump_at(&mut self, now: Instant) -> Vec<QueryKey> {
        let mut settled = Vec::new();
        while let Ok(Completed { key, result }) = self.rx.try_recv() {
            let entry = self.entries.entry(key.clone()).or_default();
            entry.in_flight = false;
            match result {
                Ok(data) => {
                    entry.data = Some(data);
                    entry.error = None;
                    entry.updated_at = Some(now);
                }
                Err(error) => {
                    tracing::warn!(query = %key.path(), error = error.as_str(), "query failed");
                    entry.error = Some(error);
                }
            }
            let again = std::mem::take(&mut entry.refetch_when_done);
            settled.push(key.clone());
            if again {
                self.fetch(&key);
            }
        }

        let mut due = Vec::new();
        self.scheduled.retain(|(at, key)| {
            if *at <= now {
                due.push(key.clone());
                false
            } else {
                true
            }
        });
        for key in due {
            self.invalidate(&key);
        }

        let mut polls = Vec::new();
        for (key, (interval, last)) in self.intervals.iter_mut() {
            if now.duration_since(*last) >= *interval {
                *last = now;
                polls.push(key.clone());
            }
        }
        for key in polls {
            self.fetch(&key);
        }
        settled
    }
}

fn run_query(api: &dyn MediaApi, key: &QueryKey) -> anyhow::Result<QueryData> {
    Ok(match key {
        QueryKey::Players => QueryData::Players(api.players()?),
        QueryKey::Metadata(id) => QueryData::Metadata(api.metadata(id)?),
        QueryKey::Status(id) => QueryData::Status(api.status(id)?),
        QueryKey::Position(id) => QueryData::Position(api.position(id)?),
        QueryKey::Volume => QueryData::Volume(api.volume()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;

    fn client(api: FakeApi) -> (QueryClient, Arc<FakeApi>) {
        let api = Arc::new(api);
        (QueryClient::inline(api.clone()), api)
    }

    #[test]
    fn ensure_fetches_once_and_settles_on_pump() {
        let (mut q, api) = client(FakeApi::default().with_player("VLC", "vlc", PlaybackStatus::Paused));
        assert_eq!(q.ensure(&QueryKey::Players), QueryState::Pending);
        assert_eq!(q.ensure(&QueryKey::Players), QueryState::Pending);
        assert_eq!(q.pump(), vec![QueryKey::Players]);
        assert_eq!(q.state(&QueryKey::Players), QueryState::Ready);
        assert_eq!(
            q.data(&QueryKey::Players).and_then(QueryData::as_players).map(|l| l.len()),
            Some(1)
        );
        q.ensure(&QueryKey::Players);
        assert_eq!(api.calls(), vec!["players".to_string()]);
    }

    #[test]
    fn failure_surfaces_as_error_state() {
        let api = FakeApi::default();
        api.state.lock().unwrap().fail = true;
        let (mut q, _api) = client(api);
        q.ensure(&QueryKey::Volume);
        q.pump();
        assert_eq!(q.state(&QueryKey::Volume), QueryState::Error);
        assert!(q.error(&QueryKey::Volume).unwrap().contains("unavailable"));
        assert!(q.data(&QueryKey::Volume).is_none());
    }

    #[test]
    fn invalidate_while_in_flight_refetches_after_completion() {
        let (mut q, api) = client(FakeApi::default().with_player("VLC", "vlc", PlaybackStatus::Paused));
        let key = QueryKey::Status("vlc".into());
        q.fetch(&key);
        assert!(q.is_fetching(&key));
        q.invalidate(&key);
        q.pump();
        q.pump();
        let statuses = api.calls().iter().filter(|c| c.starts_with("status")).count();
        assert_eq!(statuses, 2);
        assert_eq!(q.data(&key).and_then(QueryData::as_status), Some(PlaybackStatus::Paused));
    }

    #[test]
    fn invalidating_unread_key_does_nothing() {
        let (mut q, api) = client(FakeApi::default());
        q.invalidate(&QueryKey::Volume);
        assert!(api.calls().is_empty());
    }

    #[test]
    fn delayed_invalidation_waits_for_deadline() {
        let (mut q, api) = client(FakeApi::default().with_player("VLC", "vlc", PlaybackStatus::Playing));
        let key = QueryKey::Position("vlc".into());
        q.ensure(&key);
        q.pump();
        q.invalidate_after(key.clone(), Duration::from_millis(250));
        q.pump_at(Instant::now());
        assert_eq!(api.calls().len(), 1);
        q.pump_at(Instant::now() + Duration::from_millis(300));
        assert_eq!(api.calls().len(), 2);
    }

    #[test]
    fn set_query_data_replaces_cached_value() {
        let (mut q, api) = client(FakeApi::default());
        let key = QueryKey::Metadata("vlc".into());
        let meta = Metadata {
            title: "Pushed".into(),
            ..Metadata::default()
        };
        q.set_query_data(key.clone(), QueryData::Metadata(meta.clone()));
        assert_eq!(q.state(&key), QueryState::Ready);
        assert_eq!(q.data(&key).and_then(QueryData::as_metadata), Some(&meta));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn refetch_interval_polls() {
        let (mut q, api) = client(FakeApi::default());
        q.set_refetch_interval(QueryKey::Players, Duration::from_secs(5));
        q.pump_at(Instant::now());
        assert!(api.calls().is_empty());
        q.pump_at(Instant::now() + Duration::from_secs(6));
        assert_eq!(api.calls(), vec!["players".to_string()]);
    }
}

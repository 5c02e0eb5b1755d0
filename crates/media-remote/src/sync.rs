//! Keeps the player store in step with the backend.
//!
//! Pull side: the player list, per-player metadata and status come from the
//! query cache and are reconciled into the store. Push side: the current
//! player's `metadata`/`status` stream patches the store and forces refetches.
//! Stream listeners only forward into a channel; all store writes happen in
//! [`PlayerSync::drain`] on the owning thread.

use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};

use media_remote_types::{Metadata, MetadataUpdate, PlayerId};

use crate::api::Endpoints;
use crate::multiplexer::{Listener, StreamMultiplexer};
use crate::query::{QueryClient, QueryData, QueryKey};
use crate::store::{Action, PlayerStore};

pub const METADATA_EVENT: &str = "metadata";
pub const STATUS_EVENT: &str = "status";

/// An event received on a player stream, tagged with the player it was
/// subscribed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Push {
    pub(crate) player: PlayerId,
    pub(crate) event: String,
    pub(crate) data: String,
}

/// One listener registered on one URL, on behalf of one player.
pub(crate) struct Subscription {
    pub(crate) player: PlayerId,
    url: String,
    listener: Listener,
}

impl Subscription {
    /// Register a listener forwarding every event into `tx`.
    pub(crate) fn open(
        mux: &mut StreamMultiplexer,
        player: &str,
        url: String,
        events: &[&str],
        keepalive: bool,
        tx: &Sender<Push>,
    ) -> Result<Self> {
        let tx = tx.clone();
        let owner = player.to_string();
        let listener = Listener::new(move |event, data| {
            let _ = tx.send(Push {
                player: owner.clone(),
                event: event.to_string(),
                data: data.to_string(),
            });
        });
        mux.connect(&url, events, keepalive, &listener)?;
        Ok(Self {
            player: player.to_string(),
            url,
            listener,
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn close(self, mux: &mut StreamMultiplexer) {
        mux.close(&self.url, &self.listener);
    }
}

pub struct PlayerSync {
    endpoints: Endpoints,
    tx: Sender<Push>,
    rx: Receiver<Push>,
    subscription: Option<Subscription>,
}

impl PlayerSync {
    pub fn new(endpoints: Endpoints) -> Self {
        let (tx, rx) = unbounded();
        Self {
            endpoints,
            tx,
            rx,
            subscription: None,
        }
    }

    /// Kick off discovery and keep the player list fresh.
    pub fn start(&self, queries: &mut QueryClient, poll_interval: Option<Duration>) {
        queries.ensure(&QueryKey::Players);
        if let Some(interval) = poll_interval {
            queries.set_refetch_interval(QueryKey::Players, interval);
        }
    }

    /// Reconcile pull results into the store.
    pub fn discover(&self, store: &mut PlayerStore, queries: &mut QueryClient) {
        queries.ensure(&QueryKey::Players);
        let Some(list) = queries
            .data(&QueryKey::Players)
            .and_then(QueryData::as_players)
            .map(|list| list.to_vec())
        else {
            return;
        };

        for entry in &list {
            let id = entry.id().to_string();
            let meta_key = QueryKey::Metadata(id.clone());
            let status_key = QueryKey::Status(id.clone());
            queries.ensure(&meta_key);
            queries.ensure(&status_key);

            if let Some(meta) = queries.data(&meta_key).and_then(QueryData::as_metadata) {
                let action = match store.get_player(&id) {
                    None => {
                        tracing::info!(player = id.as_str(), name = entry.name(), "player discovered");
                        Some(Action::SetPlayer {
                            id: id.clone(),
                            name: entry.name().to_string(),
                            metadata: meta.clone(),
                        })
                    }
                    Some(known) if known.meta != *meta => Some(Action::UpdateMetadata {
                        id: id.clone(),
                        metadata: MetadataUpdate::from(meta.clone()),
                    }),
                    Some(_) => None,
                };
                if let Some(action) = action {
                    store.dispatch(action);
                }
            }

            // Pending and failed status fetches are not dispatched.
            if let Some(status) = queries.data(&status_key).and_then(QueryData::as_status) {
                store.dispatch(Action::UpdateStatus { id, status });
            }
        }
    }

    /// After a player list refetch settles, refetch status and metadata of
    /// every listed player without a push stream. Only the subscribed player
    /// hears about its changes; the rest would otherwise keep the first value
    /// they were discovered with.
    pub fn refresh_listed(&self, settled: &[QueryKey], queries: &mut QueryClient) {
        if !settled.contains(&QueryKey::Players) {
            return;
        }
        let Some(ids) = queries
            .data(&QueryKey::Players)
            .and_then(QueryData::as_players)
            .map(|list| list.iter().map(|e| e.id().to_string()).collect::<Vec<_>>())
        else {
            return;
        };
        for id in ids {
            if self.subscribed_player() == Some(id.as_str()) {
                continue;
            }
            queries.invalidate(&QueryKey::Status(id.clone()));
            queries.invalidate(&QueryKey::Metadata(id));
        }
    }

    /// Move the push subscription to the current player.
    pub fn follow_current(&mut self, store: &PlayerStore, mux: &mut StreamMultiplexer) {
        let target = store
            .current()
            .filter(|_| store.current_player().is_some())
            .map(str::to_string);
        let subscribed = self.subscription.as_ref().map(|s| s.player.clone());
        if target == subscribed {
            return;
        }

        if let Some(old) = self.subscription.take() {
            tracing::debug!(player = old.player.as_str(), "player stream unsubscribed");
            old.close(mux);
        }
        let Some(player) = target else {
            return;
        };
        let url = self.endpoints.player_events(&player);
        match Subscription::open(
            mux,
            &player,
            url,
            &[METADATA_EVENT, STATUS_EVENT],
            true,
            &self.tx,
        ) {
            Ok(sub) => {
                tracing::info!(player = player.as_str(), url = sub.url(), "player stream subscribed");
                self.subscription = Some(sub);
            }
            Err(e) => {
                tracing::warn!(player = player.as_str(), error = %format!("{e:#}"), "player stream subscribe failed");
            }
        }
    }

    /// Apply queued push events. Returns how many were handled.
    pub fn drain(&mut self, store: &mut PlayerStore, queries: &mut QueryClient) -> usize {
        let mut handled = 0;
        while let Ok(push) = self.rx.try_recv() {
            handled += 1;
            match push.event.as_str() {
                METADATA_EVENT => on_metadata(store, queries, &push.player, &push.data),
                STATUS_EVENT => queries.invalidate(&QueryKey::Status(push.player)),
                other => tracing::trace!(event = other, "ignoring player event"),
            }
        }
        handled
    }

    pub fn subscribed_player(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.player.as_str())
    }

    pub fn close(&mut self, mux: &mut StreamMultiplexer) {
        if let Some(sub) = self.subscription.take() {
            sub.close(mux);
        }
    }
}

fn on_metadata(store: &mut PlayerStore, queries: &mut QueryClient, player: &str, data: &str) {
    let update: MetadataUpdate = match serde_json::from_str(data) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(player, error = %e, "unparseable metadata event");
            return;
        }
    };
    tracing::debug!(player, title = ?update.title, "metadata pushed");
    store.dispatch(Action::UpdateMetadata {
        id: player.to_string(),
        metadata: update.clone(),
    });

    let meta_key = QueryKey::Metadata(player.to_string());
    let merged = queries
        .data(&meta_key)
        .and_then(QueryData::as_metadata)
        .cloned()
        .unwrap_or_else(Metadata::default)
        .merged(&update);
    queries.set_query_data(meta_key.clone(), QueryData::Metadata(merged));
    queries.invalidate(&meta_key);
    queries.invalidate(&QueryKey::Status(player.to_string()));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use media_remote_types::PlaybackStatus;

    use super::*;
    use crate::api::fake::FakeApi;
    use crate::transport::fake::FakeTransport;

    const VLC_EVENTS: &str = "http://hub/api/media/player-sse/vlc";

    struct Rig {
        api: Arc<FakeApi>,
        transport: FakeTransport,
        store: PlayerStore,
        queries: QueryClient,
        mux: StreamMultiplexer,
        sync: PlayerSync,
    }

    impl Rig {
        fn new(api: FakeApi) -> Self {
            let api = Arc::new(api);
            let transport = FakeTransport::default();
            Self {
                queries: QueryClient::inline(api.clone()),
                mux: StreamMultiplexer::new(Box::new(transport.clone())),
                sync: PlayerSync::new(Endpoints::new("http://hub", "/api")),
                store: PlayerStore::new(),
                api,
                transport,
            }
        }

        fn tick(&mut self) {
            self.mux.pump();
            let settled = self.queries.pump();
            self.sync.refresh_listed(&settled, &mut self.queries);
            self.sync.drain(&mut self.store, &mut self.queries);
            self.sync.discover(&mut self.store, &mut self.queries);
            let settled = self.queries.pump();
            self.sync.refresh_listed(&settled, &mut self.queries);
            self.sync.discover(&mut self.store, &mut self.queries);
            self.sync.follow_current(&self.store, &mut self.mux);
        }
    }

    fn two_players() -> FakeApi {
        FakeApi::default()
            .with_player("VLC", "vlc", PlaybackStatus::Playing)
            .with_player("Spotify", "spotify", PlaybackStatus::Stopped)
    }

    #[test]
    fn discovery_populates_store_in_list_order() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        rig.tick();
        let ids: Vec<_> = rig.store.players().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["vlc".to_string(), "spotify".to_string()]);
        assert!(rig.store.get_player("vlc").unwrap().is_playing());
        assert_eq!(
            rig.store.get_player("spotify").unwrap().status,
            Some(PlaybackStatus::Stopped)
        );
        assert_eq!(rig.store.get_player("vlc").unwrap().meta.title, "VLC track");
    }

    #[test]
    fn changed_metadata_is_merged_on_refetch() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        rig.tick();
        rig.api
            .state
            .lock()
            .unwrap()
            .metadata
            .get_mut("vlc")
            .unwrap()
            .title = "Next song".into();
        rig.queries.invalidate(&QueryKey::Metadata("vlc".into()));
        rig.tick();
        assert_eq!(rig.store.get_player("vlc").unwrap().meta.title, "Next song");
        assert_eq!(rig.store.players().count(), 2);
    }

    #[test]
    fn list_refetch_refreshes_players_without_stream() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        rig.store.dispatch(Action::SetCurrent {
            id: Some("vlc".into()),
        });
        rig.tick();
        assert_eq!(
            rig.store.get_player("spotify").unwrap().status,
            Some(PlaybackStatus::Stopped)
        );

        rig.api
            .state
            .lock()
            .unwrap()
            .status
            .insert("spotify".into(), PlaybackStatus::Playing);
        let before = rig.api.calls().len();
        rig.queries.invalidate(&QueryKey::Players);
        rig.tick();
        rig.tick();

        assert!(rig.store.get_player("spotify").unwrap().is_playing());
        let calls = rig.api.calls()[before..].to_vec();
        assert!(calls.contains(&"status spotify".to_string()));
        assert!(!calls.contains(&"status vlc".to_string()));
    }

    #[test]
    fn subscribes_only_for_current_player() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        assert!(rig.transport.opened().is_empty());

        rig.store.dispatch(Action::SetCurrent {
            id: Some("vlc".into()),
        });
        rig.tick();
        assert_eq!(rig.transport.opened(), vec![VLC_EVENTS.to_string()]);
        assert_eq!(rig.sync.subscribed_player(), Some("vlc"));

        rig.store.dispatch(Action::SetCurrent {
            id: Some("spotify".into()),
        });
        rig.tick();
        assert!(!rig.transport.is_open(VLC_EVENTS));
        assert!(rig.transport.is_open("http://hub/api/media/player-sse/spotify"));

        rig.sync.close(&mut rig.mux);
        assert_eq!(rig.mux.connection_count(), 0);
    }

    #[test]
    fn metadata_push_patches_store_and_cache_then_refetches() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        rig.store.dispatch(Action::SetCurrent {
            id: Some("vlc".into()),
        });
        rig.tick();
        let before = rig.api.calls().len();

        rig.transport
            .emit(VLC_EVENTS, "metadata", r#"{"title":"Pushed","artist":["A","B"]}"#);
        rig.mux.pump();
        assert_eq!(rig.sync.drain(&mut rig.store, &mut rig.queries), 1);

        let player = rig.store.get_player("vlc").unwrap();
        assert_eq!(player.meta.title, "Pushed");
        assert_eq!(player.meta.artist, vec!["A".to_string(), "B".to_string()]);
        let cached = rig
            .queries
            .data(&QueryKey::Metadata("vlc".into()))
            .and_then(QueryData::as_metadata)
            .unwrap();
        assert_eq!(cached.title, "Pushed");

        let after: Vec<_> = rig.api.calls()[before..].to_vec();
        assert_eq!(after, vec!["metadata vlc".to_string(), "status vlc".to_string()]);
    }

    #[test]
    fn status_push_only_refetches_status() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        rig.store.dispatch(Action::SetCurrent {
            id: Some("vlc".into()),
        });
        rig.tick();
        let before = rig.api.calls().len();
        rig.transport.emit(VLC_EVENTS, "status", "Paused");
        rig.mux.pump();
        rig.sync.drain(&mut rig.store, &mut rig.queries);
        assert_eq!(rig.api.calls()[before..].to_vec(), vec!["status vlc".to_string()]);
    }

    #[test]
    fn malformed_metadata_is_ignored() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        rig.store.dispatch(Action::SetCurrent {
            id: Some("vlc".into()),
        });
        rig.tick();
        let rev = rig.store.revision();
        rig.transport.emit(VLC_EVENTS, "metadata", "{not json");
        rig.mux.pump();
        rig.sync.drain(&mut rig.store, &mut rig.queries);
        assert_eq!(rig.store.revision(), rev);
        assert!(rig.mux.is_connected(VLC_EVENTS));
    }

    #[test]
    fn failed_stream_is_not_reopened_for_same_player() {
        let mut rig = Rig::new(two_players());
        rig.tick();
        rig.store.dispatch(Action::SetCurrent {
            id: Some("vlc".into()),
        });
        rig.tick();
        rig.transport.drop_connection(VLC_EVENTS);
        rig.tick();
        rig.tick();
        assert_eq!(rig.transport.opened().len(), 1);
        assert!(!rig.mux.is_connected(VLC_EVENTS));
    }
}

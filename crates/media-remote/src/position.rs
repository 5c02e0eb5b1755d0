//! Playback position of the current player.
//!
//! While the player is playing the position comes from its push stream; while
//! it is not, a one-shot pull query supplies it. The mode follows the play
//! state on every tick. The backend closes the stream once a track ends, so a
//! dropped stream is dialed again when the next track starts.

use crossbeam_channel::{Receiver, Sender, unbounded};

use media_remote_types::{Metadata, PlayerId, PositionUpdate};

use crate::api::Endpoints;
use crate::multiplexer::StreamMultiplexer;
use crate::query::{QueryClient, QueryData, QueryKey};
use crate::store::PlayerStore;
use crate::sync::{Push, Subscription};

pub const POSITION_EVENT: &str = "position";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionMode {
    /// No current player.
    Idle,
    /// Following the position stream.
    Push,
    /// Reading the position query.
    Pull,
}

pub struct PositionTracker {
    endpoints: Endpoints,
    tx: Sender<Push>,
    rx: Receiver<Push>,
    subscription: Option<Subscription>,
    /// Track the last subscribe attempt was made for.
    subscribed_meta: Option<Metadata>,
    player: Option<PlayerId>,
    mode: PositionMode,
    position_us: i64,
}

impl PositionTracker {
    pub fn new(endpoints: Endpoints) -> Self {
        let (tx, rx) = unbounded();
        Self {
            endpoints,
            tx,
            rx,
            subscription: None,
            subscribed_meta: None,
            player: None,
            mode: PositionMode::Idle,
            position_us: 0,
        }
    }

    pub fn position(&self) -> i64 {
        self.position_us
    }

    pub fn mode(&self) -> PositionMode {
        self.mode
    }

    pub fn tick(&mut self, store: &PlayerStore, queries: &mut QueryClient, mux: &mut StreamMultiplexer) {
        let current = store
            .current()
            .and_then(|id| store.get_player(id).map(|p| (id.to_string(), p.is_playing(), p.meta.clone())));

        let Some((id, playing, meta)) = current else {
            self.close(mux);
            self.player = None;
            self.mode = PositionMode::Idle;
            return;
        };

        let switched = self.player.as_deref() != Some(id.as_str());
        if switched {
            self.close(mux);
            self.player = Some(id.clone());
            self.position_us = 0;
            self.mode = PositionMode::Idle;
        }

        if playing {
            if self.mode == PositionMode::Push && self.stream_lost(&meta, mux) {
                tracing::debug!(player = id.as_str(), "new track, redialing position stream");
                self.close(mux);
                self.mode = PositionMode::Idle;
            }
            if self.mode != PositionMode::Push {
                self.subscribed_meta = Some(meta);
                self.subscribe(&id, mux);
                self.mode = PositionMode::Push;
            }
        } else {
            let key = QueryKey::Position(id.clone());
            if self.mode != PositionMode::Pull {
                self.close(mux);
                queries.fetch(&key);
                self.mode = PositionMode::Pull;
            }
            if let Some(us) = queries.data(&key).and_then(QueryData::as_position) {
                self.position_us = us;
            }
        }

        self.drain(&id);
    }

    /// The stream is gone and the track moved on since it was dialed.
    fn stream_lost(&self, meta: &Metadata, mux: &StreamMultiplexer) -> bool {
        let connected = self
            .subscription
            .as_ref()
            .is_some_and(|sub| mux.is_connected(sub.url()));
        !connected && self.subscribed_meta.as_ref() != Some(meta)
    }

    fn subscribe(&mut self, id: &str, mux: &mut StreamMultiplexer) {
        let url = self.endpoints.position_events(id);
        match Subscription::open(mux, id, url, &[POSITION_EVENT], false, &self.tx) {
            Ok(sub) => {
                tracing::debug!(player = id, url = sub.url(), "position stream subscribed");
                self.subscription = Some(sub);
            }
            Err(e) => {
                tracing::warn!(player = id, error = %format!("{e:#}"), "position stream subscribe failed");
            }
        }
    }

    fn drain(&mut self, current: &str) {
        while let Ok(push) = self.rx.try_recv() {
            if push.player != current || self.mode != PositionMode::Push {
                continue;
            }
            match push.data.parse::<PositionUpdate>() {
                Ok(PositionUpdate::Micros(us)) => self.position_us = us,
                Ok(PositionUpdate::EndOfStream) => {
                    tracing::info!(player = current, "reached end of stream");
                }
                Err(e) => tracing::warn!(player = current, error = %e, "bad position event"),
            }
        }
    }

    pub fn close(&mut self, mux: &mut StreamMultiplexer) {
        if let Some(sub) = self.subscription.take() {
            tracing::debug!(player = sub.player.as_str(), "position stream unsubscribed");
            sub.close(mux);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use media_remote_types::{Metadata, MetadataUpdate, PlaybackStatus};

    use super::*;
    use crate::api::fake::FakeApi;
    use crate::store::Action;
    use crate::transport::fake::FakeTransport;

    const VLC_POSITION: &str = "http://hub/media/position-sse/vlc";

    struct Rig {
        transport: FakeTransport,
        store: PlayerStore,
        queries: QueryClient,
        mux: StreamMultiplexer,
        tracker: PositionTracker,
    }

    impl Rig {
        fn new(status: PlaybackStatus) -> Self {
            let api = FakeApi::default().with_player("VLC", "vlc", status);
            api.state.lock().unwrap().position.insert("vlc".into(), 7_000_000);
            let transport = FakeTransport::default();
            let mut store = PlayerStore::new();
            store.dispatch(Action::SetPlayer {
                id: "vlc".into(),
                name: "VLC".into(),
                metadata: Metadata::default(),
            });
            store.dispatch(Action::UpdateStatus {
                id: "vlc".into(),
                status,
            });
            store.dispatch(Action::SetCurrent {
                id: Some("vlc".into()),
            });
            Self {
                queries: QueryClient::inline(Arc::new(api)),
                mux: StreamMultiplexer::new(Box::new(transport.clone())),
                tracker: PositionTracker::new(Endpoints::new("http://hub", "")),
                store,
                transport,
            }
        }

        fn tick(&mut self) {
            self.mux.pump();
            self.queries.pump();
            self.tracker.tick(&self.store, &mut self.queries, &mut self.mux);
        }

        fn set_status(&mut self, status: PlaybackStatus) {
            self.store.dispatch(Action::UpdateStatus {
                id: "vlc".into(),
                status,
            });
        }
    }

    #[test]
    fn playing_player_follows_stream() {
        let mut rig = Rig::new(PlaybackStatus::Playing);
        rig.tick();
        assert_eq!(rig.tracker.mode(), PositionMode::Push);
        assert!(rig.transport.is_open(VLC_POSITION));

        rig.transport.emit(VLC_POSITION, "position", "125000000");
        rig.tick();
        assert_eq!(rig.tracker.position(), 125_000_000);
    }

    #[test]
    fn end_of_stream_keeps_last_position() {
        let mut rig = Rig::new(PlaybackStatus::Playing);
        rig.tick();
        rig.transport.emit(VLC_POSITION, "position", "42");
        rig.transport.emit(VLC_POSITION, "position", "EOS");
        rig.tick();
        assert_eq!(rig.tracker.position(), 42);
        assert!(rig.transport.is_open(VLC_POSITION));
    }

    #[test]
    fn next_track_redials_closed_stream() {
        let mut rig = Rig::new(PlaybackStatus::Playing);
        rig.tick();
        rig.transport.emit(VLC_POSITION, "position", "EOS");
        rig.transport.drop_connection(VLC_POSITION);
        rig.tick();
        assert!(!rig.mux.is_connected(VLC_POSITION));

        // Same track: nothing to redial.
        rig.tick();
        assert_eq!(rig.transport.opened().len(), 1);

        rig.store.dispatch(Action::UpdateMetadata {
            id: "vlc".into(),
            metadata: MetadataUpdate {
                title: Some("Next".into()),
                ..Default::default()
            },
        });
        rig.tick();
        assert_eq!(rig.tracker.mode(), PositionMode::Push);
        assert_eq!(rig.transport.opened().len(), 2);
        assert!(rig.transport.is_open(VLC_POSITION));

        rig.transport.emit(VLC_POSITION, "position", "1000");
        rig.tick();
        assert_eq!(rig.tracker.position(), 1000);
    }

    #[test]
    fn failed_subscribe_waits_for_next_track() {
        let mut rig = Rig::new(PlaybackStatus::Playing);
        rig.transport.fail_next_open();
        rig.tick();
        rig.tick();
        assert!(rig.transport.opened().is_empty());

        rig.store.dispatch(Action::UpdateMetadata {
            id: "vlc".into(),
            metadata: MetadataUpdate {
                track_id: Some("/track/2".into()),
                ..Default::default()
            },
        });
        rig.tick();
        assert!(rig.transport.is_open(VLC_POSITION));
    }

    #[test]
    fn paused_player_reads_position_query() {
        let mut rig = Rig::new(PlaybackStatus::Paused);
        rig.tick();
        assert_eq!(rig.tracker.mode(), PositionMode::Pull);
        assert!(rig.transport.opened().is_empty());
        rig.tick();
        assert_eq!(rig.tracker.position(), 7_000_000);
    }

    #[test]
    fn switches_mode_with_play_state() {
        let mut rig = Rig::new(PlaybackStatus::Playing);
        rig.tick();
        rig.set_status(PlaybackStatus::Paused);
        rig.tick();
        assert_eq!(rig.tracker.mode(), PositionMode::Pull);
        assert!(!rig.transport.is_open(VLC_POSITION));

        rig.set_status(PlaybackStatus::Playing);
        rig.tick();
        assert_eq!(rig.tracker.mode(), PositionMode::Push);
        assert_eq!(rig.transport.opened().len(), 2);
        assert!(rig.transport.is_open(VLC_POSITION));
    }

    #[test]
    fn no_current_player_is_idle() {
        let mut rig = Rig::new(PlaybackStatus::Playing);
        rig.tick();
        rig.store.dispatch(Action::SetCurrent { id: None });
        rig.tick();
        assert_eq!(rig.tracker.mode(), PositionMode::Idle);
        assert_eq!(rig.mux.connection_count(), 0);
    }
}

//! The remote-control engine.
//!
//! Owns every piece of client state and advances it one [`MediaRemote::tick`]
//! at a time from the UI loop. Nothing here blocks on the network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use media_remote_types::PlayerId;

use crate::api::{Endpoints, HttpMediaApi, MediaApi};
use crate::commands::{Command, CommandOutcome, Commands};
use crate::config::Settings;
use crate::multiplexer::StreamMultiplexer;
use crate::position::{PositionMode, PositionTracker};
use crate::query::{QueryClient, QueryKey, QueryState};
use crate::seek_slider::SeekSlider;
use crate::selector::CurrentPlayerSelector;
use crate::session::{FileSessionStorage, SessionStorage};
use crate::store::{Player, PlayerStore};
use crate::sync::PlayerSync;
use crate::transport::{EventTransport, HttpEventTransport};
use crate::volume::{VolumeControl, VolumeLevel};

/// How long the seek bar holds a committed value.
pub const SEEK_LOADING_WINDOW: Duration = Duration::from_millis(400);

/// What changed during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub switched_to: Option<PlayerId>,
    pub commands: Vec<CommandOutcome>,
    pub failed_streams: Vec<String>,
}

pub struct MediaRemote {
    settings: Settings,
    store: PlayerStore,
    selector: CurrentPlayerSelector,
    mux: StreamMultiplexer,
    queries: QueryClient,
    sync: PlayerSync,
    position: PositionTracker,
    commands: Commands,
    volume: VolumeControl,
    slider: SeekSlider,
}

impl MediaRemote {
    /// Engine talking HTTP/SSE to `settings.server`, remembering the selected
    /// player in a per-terminal session directory.
    pub fn connect(settings: Settings) -> Self {
        let endpoints = Endpoints::new(&settings.server, &settings.api_prefix);
        let api: Arc<dyn MediaApi> = Arc::new(HttpMediaApi::new(endpoints));
        let storage =
            FileSessionStorage::for_session(&settings.session_dir, settings.session.as_deref());
        tracing::info!(
            server = settings.server.as_str(),
            session_dir = %storage.dir().display(),
            "media remote starting"
        );
        let queries = QueryClient::new(api.clone());
        let commands = Commands::new(api, settings.settle);
        Self::from_parts(
            settings,
            queries,
            commands,
            Box::new(HttpEventTransport::default()),
            Box::new(storage),
        )
    }

    fn from_parts(
        settings: Settings,
        mut queries: QueryClient,
        commands: Commands,
        transport: Box<dyn EventTransport>,
        storage: Box<dyn SessionStorage>,
    ) -> Self {
        let endpoints = Endpoints::new(&settings.server, &settings.api_prefix);
        let sync = PlayerSync::new(endpoints.clone());
        sync.start(&mut queries, settings.poll_interval);
        Self {
            store: PlayerStore::new(),
            selector: CurrentPlayerSelector::new(storage),
            mux: StreamMultiplexer::new(transport),
            queries,
            sync,
            position: PositionTracker::new(endpoints),
            commands,
            volume: VolumeControl::new(),
            slider: SeekSlider::new(SEEK_LOADING_WINDOW),
            settings,
        }
    }

    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    pub(crate) fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        report.failed_streams = self.mux.pump().failed;
        let settled = self.queries.pump_at(now);
        self.sync.refresh_listed(&settled, &mut self.queries);
        self.sync.drain(&mut self.store, &mut self.queries);
        self.sync.discover(&mut self.store, &mut self.queries);
        report.switched_to = self.selector.sync(&mut self.store);
        self.sync.follow_current(&self.store, &mut self.mux);
        self.position
            .tick(&self.store, &mut self.queries, &mut self.mux);
        self.slider.update(self.position.position(), now);
        report.commands = self.commands.pump(&mut self.queries);
        self.volume.sync(&mut self.queries);
        report
    }

    pub fn play_pause(&mut self) {
        if let Some(player) = self.current_id() {
            self.commands.send(Command::PlayPause { player });
        }
    }

    /// Relative seek by `steps` seek steps (negative rewinds).
    pub fn seek(&mut self, steps: i64) {
        if let Some(player) = self.current_id() {
            self.commands.send(Command::Seek {
                player,
                offset_secs: steps * self.settings.seek_step_secs,
            });
        }
    }

    /// Move the seek bar thumb without seeking yet.
    pub fn scrub(&mut self, delta_secs: i64) {
        let length = self.current_player().map(|(_, p)| p.meta.length).unwrap_or(0);
        self.slider.nudge(delta_secs * 1_000_000, length);
    }

    /// Seek to the scrubbed position.
    pub fn commit_scrub(&mut self) {
        self.commit_scrub_at(Instant::now());
    }

    pub(crate) fn commit_scrub_at(&mut self, now: Instant) {
        let target = self
            .current_player()
            .map(|(id, p)| (id.to_string(), p.meta.track_id.clone()));
        let Some((player, track_id)) = target else {
            self.slider.cancel();
            return;
        };
        let command = Command::SetPosition {
            player,
            track_id,
            position_us: self.slider.value(),
        };
        if self.slider.commit(now).is_some() {
            self.commands.send(command);
        }
    }

    pub fn cancel_scrub(&mut self) {
        self.slider.cancel();
    }

    pub fn volume_step(&mut self, direction: i32) {
        let delta = direction * self.settings.volume_step as i32;
        self.volume.step(delta, &self.commands);
    }

    pub fn toggle_mute(&mut self) {
        self.volume.toggle_mute(&self.commands);
    }

    /// Manual player choice from the player sheet.
    pub fn select_player(&mut self, id: &str) {
        tracing::info!(player = id, "player chosen");
        self.selector.update(&mut self.store, id);
    }

    pub fn shutdown(&mut self) {
        self.sync.close(&mut self.mux);
        self.position.close(&mut self.mux);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &PlayerStore {
        &self.store
    }

    pub fn current_player(&self) -> Option<(&str, &Player)> {
        let id = self.store.current()?;
        self.store.current_player().map(|p| (id, p))
    }

    fn current_id(&self) -> Option<PlayerId> {
        self.current_player().map(|(id, _)| id.to_string())
    }

    pub fn players_state(&self) -> QueryState {
        self.queries.state(&QueryKey::Players)
    }

    pub fn players_error(&self) -> Option<&str> {
        self.queries.error(&QueryKey::Players)
    }

    pub fn position(&self) -> i64 {
        self.position.position()
    }

    pub fn position_mode(&self) -> PositionMode {
        self.position.mode()
    }

    pub fn slider(&self) -> &SeekSlider {
        &self.slider
    }

    pub fn volume(&self) -> u32 {
        self.volume.volume()
    }

    pub fn volume_level(&self) -> VolumeLevel {
        self.volume.level()
    }

    pub fn connection_count(&self) -> usize {
        self.mux.connection_count()
    }

    pub fn subscribed_player(&self) -> Option<&str> {
        self.sync.subscribed_player()
    }

    pub fn store_revision(&self) -> u64 {
        self.store.revision()
    }
}

impl Drop for MediaRemote {
    fn drop(&mut self) {
        self.shutdown();
    }
}

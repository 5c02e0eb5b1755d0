use crate::commands::{Command, Commands};
use crate::query::{QueryClient, QueryData, QueryKey};

pub const MAX_VOLUME: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeLevel {
    Off,
    Low,
    High,
}

/// Local volume state. Changes are shown immediately and sent without
/// waiting for the backend.
#[derive(Debug, Default)]
pub struct VolumeControl {
    volume: u32,
    previous: u32,
    initialized: bool,
    seen: Option<u32>,
}

impl VolumeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn level(&self) -> VolumeLevel {
        match self.volume {
            0 => VolumeLevel::Off,
            v if v < 50 => VolumeLevel::Low,
            _ => VolumeLevel::High,
        }
    }

    /// Adopt the backend volume. The first non-zero value also becomes the
    /// level restored by unmute.
    pub fn observe(&mut self, percent: u32) {
        if percent == 0 {
            return;
        }
        self.volume = percent.min(MAX_VOLUME);
        if !self.initialized {
            self.initialized = true;
            self.previous = self.volume;
        }
    }

    /// Adopt new results of the volume query, fetching it on first use.
    pub fn sync(&mut self, queries: &mut QueryClient) {
        queries.ensure(&QueryKey::Volume);
        let Some(percent) = queries.data(&QueryKey::Volume).and_then(QueryData::as_volume) else {
            return;
        };
        if self.seen != Some(percent) {
            self.seen = Some(percent);
            self.observe(percent);
        }
    }

    /// Slider move: set and remember as the unmute level.
    pub fn set(&mut self, percent: u32, commands: &Commands) {
        let percent = percent.min(MAX_VOLUME);
        self.apply(percent, commands);
        self.previous = percent;
    }

    pub fn step(&mut self, delta: i32, commands: &Commands) {
        let next = (self.volume as i64 + delta as i64).clamp(0, MAX_VOLUME as i64) as u32;
        self.set(next, commands);
    }

    pub fn toggle_mute(&mut self, commands: &Commands) {
        if self.volume != 0 {
            self.apply(0, commands);
        } else {
            self.apply(self.previous, commands);
        }
    }

    fn apply(&mut self, percent: u32, commands: &Commands) {
        self.volume = percent;
        commands.send(Command::SetVolume { percent });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::fake::FakeApi;
    use crate::commands::SettleDelays;

    fn rig(volume: u32) -> (VolumeControl, Commands, QueryClient, Arc<FakeApi>) {
        let api = Arc::new(FakeApi::default());
        api.state.lock().unwrap().volume = volume;
        let mut queries = QueryClient::inline(api.clone());
        let mut control = VolumeControl::new();
        control.sync(&mut queries);
        queries.pump();
        control.sync(&mut queries);
        let commands = Commands::inline(api.clone(), SettleDelays::default());
        (control, commands, queries, api)
    }

    #[test]
    fn initial_value_comes_from_backend() {
        let (control, _commands, _queries, _api) = rig(35);
        assert_eq!(control.volume(), 35);
        assert_eq!(control.level(), VolumeLevel::Low);
    }

    #[test]
    fn mute_twice_restores_volume() {
        let (mut control, commands, _queries, api) = rig(64);
        control.toggle_mute(&commands);
        assert_eq!(control.volume(), 0);
        assert_eq!(control.level(), VolumeLevel::Off);
        control.toggle_mute(&commands);
        assert_eq!(control.volume(), 64);
        assert_eq!(api.state.lock().unwrap().volume, 64);
    }

    #[test]
    fn unmute_returns_to_last_slider_value() {
        let (mut control, commands, _queries, _api) = rig(64);
        control.set(80, &commands);
        assert_eq!(control.level(), VolumeLevel::High);
        control.toggle_mute(&commands);
        control.toggle_mute(&commands);
        assert_eq!(control.volume(), 80);
    }

    #[test]
    fn steps_are_clamped() {
        let (mut control, commands, _queries, api) = rig(98);
        control.step(5, &commands);
        assert_eq!(control.volume(), 100);
        control.step(-150, &commands);
        assert_eq!(control.volume(), 0);
        assert_eq!(
            api.calls().iter().filter(|c| c.starts_with("set_volume")).count(),
            2
        );
    }
}

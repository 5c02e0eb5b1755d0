//! Player state cache.
//!
//! All mutation goes through [`Action`] and the pure [`reduce`] function.
//! [`PlayerStore`] wraps the state with a revision counter so derived state
//! can tell when something actually changed.

use media_remote_types::{Metadata, MetadataUpdate, PlaybackStatus, PlayerId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub meta: Metadata,
    /// `None` until the first status fetch resolves.
    pub status: Option<PlaybackStatus>,
}

impl Player {
    pub fn is_playing(&self) -> bool {
        self.status == Some(PlaybackStatus::Playing)
    }
}

/// Known players in insertion order plus the current selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayersState {
    players: Vec<(PlayerId, Player)>,
    current: Option<PlayerId>,
}

impl PlayersState {
    pub fn get_player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|(pid, _)| pid == id).map(|(_, p)| p)
    }

    pub fn has_player(&self, id: &str) -> bool {
        self.get_player(id).is_some()
    }

    pub fn players(&self) -> impl Iterator<Item = (&PlayerId, &Player)> {
        self.players.iter().map(|(id, p)| (id, p))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The selected player, if the selection refers to a known id.
    pub fn current_player(&self) -> Option<&Player> {
        self.current.as_deref().and_then(|id| self.get_player(id))
    }

    fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|(pid, _)| pid == id)
            .map(|(_, p)| p)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    SetPlayer {
        id: PlayerId,
        name: String,
        metadata: Metadata,
    },
    UpdateMetadata {
        id: PlayerId,
        metadata: MetadataUpdate,
    },
    UpdateStatus {
        id: PlayerId,
        status: PlaybackStatus,
    },
    SetCurrent {
        id: Option<PlayerId>,
    },
}

pub fn reduce(mut state: PlayersState, action: Action) -> PlayersState {
    match action {
        Action::SetPlayer { id, name, metadata } => {
            let player = Player {
                name,
                meta: metadata,
                status: None,
            };
            match state.player_mut(&id) {
                Some(existing) => *existing = player,
                None => state.players.push((id, player)),
            }
        }
        Action::UpdateMetadata { id, metadata } => match state.player_mut(&id) {
            Some(player) => player.meta.apply(&metadata),
            None => tracing::debug!(player = id.as_str(), "metadata update for unknown player"),
        },
        Action::UpdateStatus { id, status } => match state.player_mut(&id) {
            Some(player) => player.status = Some(status),
            None => tracing::debug!(player = id.as_str(), "status update for unknown player"),
        },
        Action::SetCurrent { id } => state.current = id,
    }
    state
}

#[derive(Debug, Default)]
pub struct PlayerStore {
    state: PlayersState,
    revision: u64,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `action`. Returns `true` when the state changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let next = reduce(self.state.clone(), action);
        if next == self.state {
            return false;
        }
        self.state = next;
        self.revision += 1;
        true
    }

    pub fn state(&self) -> &PlayersState {
        &self.state
    }

    /// Bumped on every state change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get_player(&self, id: &str) -> Option<&Player> {
        self.state.get_player(id)
    }

    pub fn has_player(&self, id: &str) -> bool {
        self.state.has_player(id)
    }

    pub fn players(&self) -> impl Iterator<Item = (&PlayerId, &Player)> {
        self.state.players()
    }

    pub fn current(&self) -> Option<&str> {
        self.state.current()
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.state.current_player()
    }
}

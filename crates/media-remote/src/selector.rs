//! Current-player selection.
//!
//! Priority: follow whichever player is playing, else restore the last choice
//! made in this session, else fall back to the first known player.

use media_remote_types::PlayerId;

use crate::session::SessionStorage;
use crate::store::{Action, PlayerStore, PlayersState};

/// Session storage key holding the last selected player id.
pub const LAST_PLAYER_KEY: &str = "mediaControls_lastPlayer";

/// Compute the selection for `state`. Returns `None` when the current
/// selection should stay as it is.
///
/// `restore` is only consulted when nothing is playing and nothing is
/// selected.
pub fn choose(state: &PlayersState, restore: impl FnOnce() -> Option<String>) -> Option<PlayerId> {
    let playing = state
        .players()
        .find(|(_, player)| player.is_playing())
        .map(|(id, _)| id);
    if let Some(id) = playing {
        return (state.current() != Some(id.as_str())).then(|| id.clone());
    }

    if state.current().is_some() {
        return None;
    }
    if let Some(id) = restore().filter(|id| !id.is_empty()) {
        return Some(id);
    }
    state.players().next().map(|(id, _)| id.clone())
}

pub struct CurrentPlayerSelector {
    storage: Box<dyn SessionStorage>,
    /// Last choice as stored when the selector was created.
    remembered: Option<String>,
    seen_revision: Option<u64>,
}

impl CurrentPlayerSelector {
    /// Reads the remembered player once; later passes never touch storage.
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        let remembered = storage.get_item(LAST_PLAYER_KEY);
        Self {
            storage,
            remembered,
            seen_revision: None,
        }
    }

    /// Re-run the policy if the store changed since the last pass.
    pub fn sync(&mut self, store: &mut PlayerStore) -> Option<PlayerId> {
        if self.seen_revision == Some(store.revision()) {
            return None;
        }
        let switched = self.run(store);
        self.seen_revision = Some(store.revision());
        switched
    }

    /// Apply the policy once. Returns the newly selected id on a switch.
    pub fn run(&mut self, store: &mut PlayerStore) -> Option<PlayerId> {
        let remembered = &self.remembered;
        let next = choose(store.state(), || remembered.clone())?;
        tracing::info!(player = next.as_str(), "current player selected");
        self.update(store, &next);
        Some(next)
    }

    /// Select `id` and remember it for the session.
    pub fn update(&mut self, store: &mut PlayerStore, id: &str) {
        store.dispatch(Action::SetCurrent {
            id: Some(id.to_string()),
        });
        self.remembered = Some(id.to_string());
        if let Err(e) = self.storage.set_item(LAST_PLAYER_KEY, id) {
            tracing::warn!(player = id, error = %format!("{e:#}"), "persist last player failed");
        }
    }

    pub fn storage(&self) -> &dyn SessionStorage {
        self.storage.as_ref()
    }
}

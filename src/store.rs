//! Player State Store
//!
//! Per-player record of quest progress, bank contents, and counters.
//! Created lazily on first contact; mutated only by dialogue option handlers.

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Progress on a single quest: a step counter plus a completion flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub step: u32,
    pub complete: bool,
}

impl QuestProgress {
    /// Apply a step delta (floored at 0). No-op once the quest is complete.
    pub fn advance(&mut self, step_delta: i32) {
        if self.complete {
            return;
        }
        self.step = self.step.saturating_add_signed(step_delta);
    }
}

/// Everything the server tracks for one player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerState {
    /// Quest id -> progress
    #[serde(default)]
    pub quests: HashMap<String, QuestProgress>,
    /// Ordered item ids stored in the bank
    #[serde(default)]
    pub bank: Vec<String>,
    #[serde(default)]
    pub gold: i64,
    /// Skill name -> accumulated experience
    #[serde(default)]
    pub xp: HashMap<String, i64>,
    /// Named counters (e.g. "idleChat")
    #[serde(default)]
    pub counters: HashMap<String, i64>,
}

/// Errors from the persistence layer. Recoverable at the request boundary:
/// a corrupt record is logged and replaced with defaults.
#[derive(Debug)]
pub enum StoreError {
    /// Persisted record could not be deserialized
    Corrupt { player_id: String, detail: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Corrupt { player_id, detail } => {
                write!(f, "corrupt state for player '{}': {}", player_id, detail)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Storage seam for player state. The dialogue engine only ever needs
/// get-or-create and a single atomic read-modify-write, so a durable backend
/// can be substituted without touching the engine.
pub trait PlayerStateStore: Send + Sync {
    /// Returns the existing state, or materializes empty defaults. Never fails.
    fn get_or_create(&self, player_id: &str) -> PlayerState;

    /// Applies a state transition atomically and persists the result.
    fn mutate(&self, player_id: &str, f: &mut dyn FnMut(&mut PlayerState));

    /// Snapshot of all known states, for persistence sweeps.
    fn snapshot(&self) -> Vec<(String, PlayerState)>;
}

/// In-memory store backing the running server. A SQLite layer hydrates it at
/// startup and sweeps snapshots back on an interval (see `db.rs`).
#[derive(Default)]
pub struct MemoryStore {
    players: DashMap<String, PlayerState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a player record loaded from persistence.
    pub fn insert(&self, player_id: &str, state: PlayerState) {
        self.players.insert(player_id.to_string(), state);
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl PlayerStateStore for MemoryStore {
    fn get_or_create(&self, player_id: &str) -> PlayerState {
        self.players
            .entry(player_id.to_string())
            .or_default()
            .clone()
    }

    fn mutate(&self, player_id: &str, f: &mut dyn FnMut(&mut PlayerState)) {
        let mut entry = self.players.entry(player_id.to_string()).or_default();
        f(entry.value_mut());
    }

    fn snapshot(&self) -> Vec<(String, PlayerState)> {
        self.players
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

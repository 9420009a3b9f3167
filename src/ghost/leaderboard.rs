//! Per-track lap leaderboard with ghost blobs
//!
//! The board itself and every ghost are stored as separate blobs so a
//! corrupt ghost only costs that one rank its ghost.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::archive::{GhostArchive, GhostArchiveError, GhostRecord};
use crate::persistence::KeyValueStore;

/// Maximum number of laps kept per track
pub const MAX_LEADERBOARD_ENTRIES: usize = 10;

/// Longest accepted player name (characters)
pub const MAX_PLAYER_NAME_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("Invalid player name: {0}")]
    InvalidName(String),

    #[error("Ghost is for track '{found}', leaderboard is '{expected}'")]
    TrackMismatch { expected: String, found: String },

    #[error(transparent)]
    Archive(#[from] GhostArchiveError),
}

/// A single leaderboard entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_name: String,
    pub lap_time_ms: u32,
    /// Unix timestamp (ms) when achieved
    pub recorded_at_ms: f64,
    /// Store key of the ghost blob
    pub ghost_key: String,
}

/// Fastest laps on one track, ascending by lap time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostLeaderboard {
    pub track_id: String,
    pub entries: Vec<LeaderboardEntry>,
    #[serde(default = "default_max_entries")]
    max_entries: usize,
    #[serde(default)]
    next_ghost_id: u64,
}

fn default_max_entries() -> usize {
    MAX_LEADERBOARD_ENTRIES
}

/// Trim and check a player-supplied name
pub fn validate_player_name(name: &str) -> Result<String, LeaderboardError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LeaderboardError::InvalidName("empty".to_string()));
    }
    if name.chars().count() > MAX_PLAYER_NAME_LEN {
        return Err(LeaderboardError::InvalidName(format!(
            "longer than {} characters",
            MAX_PLAYER_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(LeaderboardError::InvalidName(
            "contains control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

impl GhostLeaderboard {
    /// Create an empty leaderboard
    pub fn new(track_id: &str, max_entries: usize) -> Self {
        Self {
            track_id: track_id.to_string(),
            entries: Vec::new(),
            max_entries: max_entries.max(1),
            next_ghost_id: 0,
        }
    }

    fn storage_key(track_id: &str) -> String {
        format!("crash_replay_leaderboard_{}", track_id)
    }

    /// Check if a lap time makes the board
    pub fn qualifies(&self, lap_time_ms: u32) -> bool {
        if lap_time_ms == 0 {
            return false;
        }
        if self.entries.len() < self.max_entries {
            return true;
        }
        self.entries
            .last()
            .map(|e| lap_time_ms < e.lap_time_ms)
            .unwrap_or(true)
    }

    /// Rank a lap time would achieve (1-indexed, None if it doesn't qualify)
    pub fn potential_rank(&self, lap_time_ms: u32) -> Option<usize> {
        if !self.qualifies(lap_time_ms) {
            return None;
        }
        let rank = self.entries.iter().position(|e| lap_time_ms < e.lap_time_ms);
        Some(rank.unwrap_or(self.entries.len()) + 1)
    }

    /// Add a lap and its ghost; returns the rank achieved or None
    ///
    /// A failed ghost `put` is logged and the entry is kept; it simply has
    /// no ghost to race against.
    pub fn submit(
        &mut self,
        store: &mut dyn KeyValueStore,
        player_name: &str,
        ghost: &GhostRecord,
    ) -> Result<Option<usize>, LeaderboardError> {
        let player_name = validate_player_name(player_name)?;
        if ghost.track_id != self.track_id {
            return Err(LeaderboardError::TrackMismatch {
                expected: self.track_id.clone(),
                found: ghost.track_id.clone(),
            });
        }
        let Some(rank) = self.potential_rank(ghost.lap_time_ms) else {
            return Ok(None);
        };
        if rank > self.max_entries {
            return Ok(None);
        }

        let bytes = GhostArchive::serialize(ghost)?;
        let ghost_key = format!("crash_replay_ghost_{}_{}", self.track_id, self.next_ghost_id);
        self.next_ghost_id += 1;
        if let Err(err) = store.put(&ghost_key, &bytes) {
            log::warn!("Failed to store ghost {}: {}", ghost_key, err);
        }

        log::info!(
            "{} set {:.3}s on {} (rank {})",
            player_name,
            ghost.lap_time_ms as f64 / 1000.0,
            self.track_id,
            rank
        );
        self.entries.insert(
            rank - 1,
            LeaderboardEntry {
                player_name,
                lap_time_ms: ghost.lap_time_ms,
                recorded_at_ms: ghost.recorded_at_ms,
                ghost_key,
            },
        );
        self.evict_overflow(store);
        self.save(store);
        Ok(Some(rank))
    }

    /// Drop entries past `max_entries` along with their ghost blobs
    fn evict_overflow(&mut self, store: &mut dyn KeyValueStore) -> usize {
        let keep = self.max_entries.min(self.entries.len());
        let mut evicted = 0;
        for entry in self.entries.drain(keep..) {
            evicted += 1;
            if let Err(err) = store.remove(&entry.ghost_key) {
                log::warn!("Failed to remove ghost {}: {}", entry.ghost_key, err);
            }
        }
        evicted
    }

    /// Ghost for a 1-indexed rank; None if missing or unreadable
    pub fn ghost_for_rank(&self, store: &dyn KeyValueStore, rank: usize) -> Option<GhostRecord> {
        let entry = self.entries.get(rank.checked_sub(1)?)?;
        let bytes = store.get(&entry.ghost_key)?;
        match GhostArchive::deserialize(&bytes) {
            Ok(ghost) => Some(ghost),
            Err(err) => {
                log::warn!("No ghost for rank {} on {}: {}", rank, self.track_id, err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best lap time (if any)
    pub fn best_lap_ms(&self) -> Option<u32> {
        self.entries.first().map(|e| e.lap_time_ms)
    }

    /// Load a track's leaderboard, starting fresh if missing or corrupt
    ///
    /// A stored board larger than `max_entries` is trimmed and the ghosts of
    /// the dropped laps are removed.
    pub fn load(store: &mut dyn KeyValueStore, track_id: &str, max_entries: usize) -> Self {
        if let Some(bytes) = store.get(&Self::storage_key(track_id)) {
            match serde_json::from_slice::<GhostLeaderboard>(&bytes) {
                Ok(mut board) if board.track_id == track_id => {
                    log::info!("Loaded {} leaderboard entries for {}", board.entries.len(), track_id);
                    board.max_entries = max_entries.max(1);
                    let evicted = board.evict_overflow(store);
                    if evicted > 0 {
                        log::info!("Trimmed {} entries from the {} leaderboard", evicted, track_id);
                        board.save(store);
                    }
                    return board;
                }
                Ok(board) => {
                    log::warn!("Leaderboard blob for {} names track {}", track_id, board.track_id);
                }
                Err(err) => log::warn!("Corrupt leaderboard for {}: {}", track_id, err),
            }
        }

        log::info!("No leaderboard for {}, starting fresh", track_id);
        Self::new(track_id, max_entries)
    }

    /// Persist the board (failures are logged, in-memory state is kept)
    pub fn save(&self, store: &mut dyn KeyValueStore) {
        match serde_json::to_vec(self) {
            Ok(json) => match store.put(&Self::storage_key(&self.track_id), &json) {
                Ok(()) => log::debug!("Leaderboard saved ({} entries)", self.entries.len()),
                Err(err) => log::warn!("Failed to save leaderboard: {}", err),
            },
            Err(err) => log::warn!("Failed to encode leaderboard: {}", err),
        }
    }
}

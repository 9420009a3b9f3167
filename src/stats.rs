//! Crash statistics and race result summaries
//!
//! Persisted to the key-value store between sessions.

use serde::{Deserialize, Serialize};

use crate::persistence::KeyValueStore;
use crate::sim::{CrashEvent, ImpactKind, Severity};

/// Running crash counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashStatistics {
    pub total_crashes: u32,
    pub minor: u32,
    pub major: u32,
    pub catastrophic: u32,
    pub hard_landings: u32,
    pub replays_triggered: u32,
    /// Largest impact seen (N)
    pub max_impact_force_n: f64,
}

impl CrashStatistics {
    const STORAGE_KEY: &'static str = "crash_replay_stats";

    pub fn record_impact(&mut self, event: &CrashEvent, replay_triggered: bool) {
        self.total_crashes += 1;
        match event.severity {
            Severity::None => {}
            Severity::Minor => self.minor += 1,
            Severity::Major => self.major += 1,
            Severity::Catastrophic => self.catastrophic += 1,
        }
        if event.kind == ImpactKind::HardLanding {
            self.hard_landings += 1;
        }
        if replay_triggered {
            self.replays_triggered += 1;
        }
        self.max_impact_force_n = self.max_impact_force_n.max(event.impact_force_n);
    }

    /// Fold another session's counters into this one
    pub fn merge(&mut self, other: &CrashStatistics) {
        self.total_crashes += other.total_crashes;
        self.minor += other.minor;
        self.major += other.major;
        self.catastrophic += other.catastrophic;
        self.hard_landings += other.hard_landings;
        self.replays_triggered += other.replays_triggered;
        self.max_impact_force_n = self.max_impact_force_n.max(other.max_impact_force_n);
    }

    /// Load lifetime statistics, starting fresh if missing or corrupt
    pub fn load(store: &dyn KeyValueStore) -> Self {
        if let Some(bytes) = store.get(Self::STORAGE_KEY) {
            match serde_json::from_slice::<CrashStatistics>(&bytes) {
                Ok(stats) => {
                    log::info!("Loaded crash statistics ({} crashes)", stats.total_crashes);
                    return stats;
                }
                Err(err) => log::warn!("Corrupt crash statistics: {}", err),
            }
        }
        Self::default()
    }

    /// Persist the statistics; a failed write is logged and ignored
    pub fn save(&self, store: &mut dyn KeyValueStore) -> bool {
        let json = match serde_json::to_vec(self) {
            Ok(json) => json,
            Err(err) => {
                log::warn!("Failed to encode crash statistics: {}", err);
                return false;
            }
        };
        match store.put(Self::STORAGE_KEY, &json) {
            Ok(()) => {
                log::debug!("Crash statistics saved");
                true
            }
            Err(err) => {
                log::warn!("Failed to save crash statistics: {}", err);
                false
            }
        }
    }
}

/// End-of-race summary for the results screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResultSummary {
    pub best_lap_ms: Option<u32>,
    pub laps_completed: u32,
    pub crashes: u32,
    pub replays: u32,
    /// m/s
    pub top_speed: f64,
    pub final_damage: f64,
}

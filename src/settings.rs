//! Replay and crash-detection settings
//!
//! Persisted separately from ghosts in the key-value store.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::ghost::{CompressionThresholds, MAX_LEADERBOARD_ENTRIES};
use crate::persistence::KeyValueStore;
use crate::sim::ImpactConfig;

/// Replay length presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReplayLength {
    Short,
    #[default]
    Standard,
    Long,
}

impl ReplayLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayLength::Short => "Short",
            ReplayLength::Standard => "Standard",
            ReplayLength::Long => "Long",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "short" => Some(ReplayLength::Short),
            "standard" | "std" => Some(ReplayLength::Standard),
            "long" => Some(ReplayLength::Long),
            _ => None,
        }
    }

    /// Seconds of history kept in the replay ring
    pub fn seconds(&self) -> f64 {
        match self {
            ReplayLength::Short => 10.0,
            ReplayLength::Standard => 30.0,
            ReplayLength::Long => 60.0,
        }
    }
}

/// Replay/crash/ghost configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    // === Replay capture ===
    /// Samples kept in the crash replay ring
    pub replay_capacity: usize,
    /// Minimum seconds between replay triggers
    pub replay_cooldown_secs: f64,
    /// Jump into replay mode automatically on a replay trigger
    pub auto_replay: bool,

    // === Crash detection ===
    /// Master switch for impact detection
    pub crash_detection: bool,
    pub impact: ImpactConfig,

    // === Ghosts ===
    pub compression: CompressionThresholds,
    /// Cap on dense samples per lap
    pub max_lap_samples: usize,
    pub leaderboard_size: usize,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            replay_capacity: REPLAY_CAPACITY,
            replay_cooldown_secs: REPLAY_COOLDOWN_SECS,
            auto_replay: true,

            crash_detection: true,
            impact: ImpactConfig::default(),

            compression: CompressionThresholds::default(),
            max_lap_samples: MAX_LAP_SAMPLES,
            leaderboard_size: MAX_LEADERBOARD_ENTRIES,
        }
    }
}

impl ReplaySettings {
    /// Settings with the ring sized for a replay length preset
    pub fn from_length(length: ReplayLength) -> Self {
        let mut settings = Self::default();
        settings.apply_length(length);
        settings
    }

    /// Resize the replay ring for a preset at the configured tick rate
    pub fn apply_length(&mut self, length: ReplayLength) {
        let dt = if self.impact.tick_duration > 0.0 {
            self.impact.tick_duration
        } else {
            SIM_DT
        };
        self.replay_capacity = (length.seconds() / dt).round().max(1.0) as usize;
    }

    /// Replace nonsensical values with defaults
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        let positive = |x: f64| x.is_finite() && x > 0.0;

        if self.replay_capacity == 0 {
            log::warn!("replay_capacity 0 is invalid, using {}", defaults.replay_capacity);
            self.replay_capacity = defaults.replay_capacity;
        }
        if !(self.replay_cooldown_secs.is_finite() && self.replay_cooldown_secs >= 0.0) {
            self.replay_cooldown_secs = defaults.replay_cooldown_secs;
        }

        let impact = &mut self.impact;
        let d = defaults.impact;
        if !positive(impact.vehicle_mass_kg) {
            impact.vehicle_mass_kg = d.vehicle_mass_kg;
        }
        if !positive(impact.tick_duration) {
            impact.tick_duration = d.tick_duration;
        }
        if !positive(impact.minor_threshold) || !positive(impact.major_threshold) {
            impact.minor_threshold = d.minor_threshold;
            impact.major_threshold = d.major_threshold;
        }
        if impact.major_threshold < impact.minor_threshold {
            log::warn!("major_threshold below minor_threshold, swapping");
            std::mem::swap(&mut impact.major_threshold, &mut impact.minor_threshold);
        }
        if !positive(impact.hard_landing_velocity) {
            impact.hard_landing_velocity = d.hard_landing_velocity;
        }
        if !(impact.spawn_grace_secs.is_finite() && impact.spawn_grace_secs >= 0.0) {
            impact.spawn_grace_secs = d.spawn_grace_secs;
        }

        let c = &mut self.compression;
        let dc = defaults.compression;
        if !(c.position.is_finite() && c.position >= 0.0) {
            c.position = dc.position;
        }
        if !(c.rotation.is_finite() && c.rotation >= 0.0) {
            c.rotation = dc.rotation;
        }
        if !(c.speed.is_finite() && c.speed >= 0.0) {
            c.speed = dc.speed;
        }

        if self.max_lap_samples < 2 {
            self.max_lap_samples = defaults.max_lap_samples;
        }
        if self.leaderboard_size == 0 {
            self.leaderboard_size = defaults.leaderboard_size;
        }
        self
    }

    /// Storage key
    const STORAGE_KEY: &'static str = "crash_replay_settings";

    /// Load settings, falling back to defaults if missing or corrupt
    pub fn load(store: &dyn KeyValueStore) -> Self {
        if let Some(bytes) = store.get(Self::STORAGE_KEY) {
            match serde_json::from_slice::<ReplaySettings>(&bytes) {
                Ok(settings) => {
                    log::info!("Loaded replay settings");
                    return settings.validated();
                }
                Err(err) => log::warn!("Corrupt replay settings: {}", err),
            }
        }

        log::info!("Using default replay settings");
        Self::default()
    }

    /// Save settings; a failed write is logged and ignored
    pub fn save(&self, store: &mut dyn KeyValueStore) {
        match serde_json::to_vec(self) {
            Ok(json) => match store.put(Self::STORAGE_KEY, &json) {
                Ok(()) => log::info!("Replay settings saved"),
                Err(err) => log::warn!("Failed to save replay settings: {}", err),
            },
            Err(err) => log::warn!("Failed to encode replay settings: {}", err),
        }
    }
}

//! Crash Replay - crash detection, replay capture and ghost compression
//!
//! Core modules:
//! - `sim`: Per-tick logic (pose ring buffer, impact classification, crash orchestration)
//! - `ghost`: Lap recording, keyframe compression, ghost archive and leaderboard
//! - `persistence`: Opaque key-value byte store (LocalStorage on web)
//! - `settings`: Tunable replay/crash configuration
//! - `stats`: Crash statistics and race result summaries
//! - `platform`: Browser/native differences (clock, logging)

pub mod ghost;
pub mod persistence;
pub mod platform;
pub mod settings;
pub mod sim;
pub mod stats;

pub use ghost::{CompressedTrajectory, GhostArchive, GhostLeaderboard, GhostRecord, KeyframeCompressor};
pub use persistence::{KeyValueStore, MemoryStore};
pub use settings::ReplaySettings;
pub use sim::{CrashEvent, CrashOrchestrator, PoseSample, RaceSession, RingRecorder, Severity};
pub use stats::{CrashStatistics, RaceResultSummary};

use glam::DQuat;

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f64 = 1.0 / 60.0;

    /// Crash replay ring size (30 seconds at 60 Hz)
    pub const REPLAY_CAPACITY: usize = 1800;
    /// Minimum time between two replay triggers
    pub const REPLAY_COOLDOWN_SECS: f64 = 2.0;

    /// Vehicle mass used by the impact heuristic (light kart, kg)
    pub const VEHICLE_MASS_KG: f64 = 400.0;
    /// Impact force at which a collision counts as Minor (N)
    pub const MINOR_IMPACT_THRESHOLD: f64 = 5_000.0;
    /// Impact force at which a collision counts as Major (N)
    pub const MAJOR_IMPACT_THRESHOLD: f64 = 15_000.0;
    /// Catastrophic starts at this multiple of the major threshold
    pub const CATASTROPHIC_MULTIPLIER: f64 = 1.5;
    /// Downward speed on touchdown that counts as a hard landing (m/s)
    pub const HARD_LANDING_VELOCITY: f64 = 8.0;
    /// Detection is suppressed this long after (re)spawn while physics settles
    pub const SPAWN_GRACE_SECS: f64 = 1.0;

    /// Damage weight per severity tier
    pub const MINOR_DAMAGE_WEIGHT: f64 = 0.05;
    pub const MAJOR_DAMAGE_WEIGHT: f64 = 0.15;
    pub const CATASTROPHIC_DAMAGE_WEIGHT: f64 = 0.30;
    /// Number of collisions kept in the damage history
    pub const MAX_COLLISION_HISTORY: usize = 10;

    /// Ghost keyframe thresholds
    pub const GHOST_POSITION_THRESHOLD: f64 = 0.1;
    pub const GHOST_ROTATION_THRESHOLD: f64 = 0.05; // radians
    pub const GHOST_SPEED_THRESHOLD: f64 = 0.5;
    /// Hard cap on dense lap samples (10 minutes at 60 Hz)
    pub const MAX_LAP_SAMPLES: usize = 36_000;

    /// Safe respawn pose: max speed and dwell time on the ground
    pub const SAFE_POSE_MAX_SPEED: f64 = 40.0;
    pub const SAFE_POSE_DWELL_SECS: f64 = 0.5;
}

/// Angle between two orientations in radians, as `acos(|q1·q2|)`
///
/// The absolute value folds the quaternion double cover (`q` and `-q`
/// are the same rotation). The dot product is clamped before `acos` so
/// rounding never produces NaN.
#[inline]
pub fn quat_angular_distance(a: DQuat, b: DQuat) -> f64 {
    a.dot(b).abs().clamp(-1.0, 1.0).acos()
}

/// Clamp to the unit interval
#[inline]
pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

//! Lap ghosts: recording, keyframe compression, archive format, leaderboard
//!
//! Runs once per lap completion, never per tick.

pub mod archive;
pub mod compress;
pub mod lap;
pub mod leaderboard;

pub use archive::{GHOST_FORMAT_VERSION, GhostArchive, GhostArchiveError, GhostRecord};
pub use compress::{CompressedTrajectory, CompressionThresholds, DeltaReference, KeyframeCompressor};
pub use lap::{LapError, LapRecorder};
pub use leaderboard::{
    GhostLeaderboard, LeaderboardEntry, LeaderboardError, MAX_LEADERBOARD_ENTRIES,
    MAX_PLAYER_NAME_LEN, validate_player_name,
};

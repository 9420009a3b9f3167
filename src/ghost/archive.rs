//! Ghost archive: versioned byte envelope for compressed laps
//!
//! Ghosts are stored as a JSON envelope so the persistence layer only ever
//! sees opaque bytes:
//!
//! ```text
//! {
//!   "version": 1,
//!   "lap_time_ms": 83412,
//!   "track_id": "harbor_loop",
//!   "recorded_at_ms": 1.7e12,
//!   "trajectory": { "samples": [...], "source_frame_count": 5004, "compression_ratio": 6.1 }
//! }
//! ```
//!
//! The version tag is checked before the body is parsed so a ghost written
//! by a newer build is rejected cleanly instead of half-decoded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::compress::CompressedTrajectory;

/// Current ghost envelope version
pub const GHOST_FORMAT_VERSION: u32 = 1;

/// Ghost decode/encode failures (callers fall back to "no ghost")
#[derive(Debug, Error)]
pub enum GhostArchiveError {
    #[error("Malformed ghost data: {0}")]
    MalformedGhostData(String),

    #[error("Unsupported ghost version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Failed to encode ghost: {0}")]
    Encode(#[source] serde_json::Error),
}

impl From<serde_json::Error> for GhostArchiveError {
    fn from(err: serde_json::Error) -> Self {
        GhostArchiveError::MalformedGhostData(err.to_string())
    }
}

/// One recorded lap, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostRecord {
    pub lap_time_ms: u32,
    pub track_id: String,
    pub trajectory: CompressedTrajectory,
    /// Unix timestamp (ms) when the lap was recorded
    pub recorded_at_ms: f64,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    version: u32,
    #[serde(flatten)]
    record: &'a GhostRecord,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: Option<u32>,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    #[allow(dead_code)]
    version: u32,
    #[serde(flatten)]
    record: GhostRecord,
}

/// Encoder/decoder for ghost blobs
pub struct GhostArchive;

impl GhostArchive {
    /// Encode a ghost into bytes for the key-value store
    pub fn serialize(record: &GhostRecord) -> Result<Vec<u8>, GhostArchiveError> {
        Self::check(record).map_err(GhostArchiveError::MalformedGhostData)?;
        serde_json::to_vec(&EnvelopeOut {
            version: GHOST_FORMAT_VERSION,
            record,
        })
        .map_err(GhostArchiveError::Encode)
    }

    /// Decode a ghost blob, rejecting foreign versions and bad shapes
    pub fn deserialize(bytes: &[u8]) -> Result<GhostRecord, GhostArchiveError> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        match probe.version {
            Some(GHOST_FORMAT_VERSION) => {}
            Some(found) => {
                return Err(GhostArchiveError::UnsupportedVersion {
                    found,
                    expected: GHOST_FORMAT_VERSION,
                });
            }
            None => {
                return Err(GhostArchiveError::MalformedGhostData(
                    "missing version tag".to_string(),
                ));
            }
        }

        let envelope: EnvelopeIn = serde_json::from_slice(bytes)?;
        let record = envelope.record;
        Self::check(&record).map_err(GhostArchiveError::MalformedGhostData)?;
        Ok(record)
    }

    /// Shape checks shared by both directions
    fn check(record: &GhostRecord) -> Result<(), String> {
        let traj = &record.trajectory;
        if record.track_id.is_empty() {
            return Err("empty track id".to_string());
        }
        if traj.samples.is_empty() {
            return Err("trajectory has no samples".to_string());
        }
        if (traj.source_frame_count as usize) < traj.samples.len() {
            return Err(format!(
                "{} samples exceed source frame count {}",
                traj.samples.len(),
                traj.source_frame_count
            ));
        }
        if !traj.samples.iter().all(|s| s.is_valid()) {
            return Err("trajectory contains non-finite samples".to_string());
        }
        if !traj
            .samples
            .windows(2)
            .all(|w| w[0].elapsed_time <= w[1].elapsed_time)
        {
            return Err("trajectory samples out of order".to_string());
        }
        if !record.recorded_at_ms.is_finite() || !traj.compression_ratio.is_finite() {
            return Err("non-finite metadata".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::PoseSample;
    use glam::{DQuat, DVec3};

    fn record() -> GhostRecord {
        let samples = (0..5)
            .map(|i| {
                let t = i as f64 * 0.37;
                PoseSample::new(
                    t,
                    DVec3::new(t * 11.3, 0.25, -t * 7.1),
                    DQuat::from_rotation_y(t * 0.3),
                    33.0 + t,
                )
                .with_aux_angles([t, -t, 0.1, 0.0])
            })
            .collect();
        GhostRecord {
            lap_time_ms: 83_412,
            track_id: "harbor_loop".to_string(),
            trajectory: CompressedTrajectory::from_samples(samples, 5004),
            recorded_at_ms: 1_700_000_123_456.0,
        }
    }

    #[test]
    fn test_round_trip() {
        let original = record();
        let bytes = GhostArchive::serialize(&original).expect("encode");
        let decoded = GhostArchive::deserialize(&bytes).expect("decode");

        assert_eq!(decoded.lap_time_ms, original.lap_time_ms);
        assert_eq!(decoded.track_id, original.track_id);
        assert_eq!(decoded.trajectory.source_frame_count, 5004);
        assert_eq!(decoded.trajectory.len(), original.trajectory.len());
        for (a, b) in decoded.trajectory.samples.iter().zip(&original.trajectory.samples) {
            assert!((a.elapsed_time - b.elapsed_time).abs() < 1e-9);
            assert!((a.position - b.position).length() < 1e-9);
            assert!(a.orientation.abs_diff_eq(b.orientation, 1e-9));
            assert!((a.speed - b.speed).abs() < 1e-9);
        }
        assert!((decoded.recorded_at_ms - original.recorded_at_ms).abs() < 1e-9);
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            GhostArchive::deserialize(b"not json"),
            Err(GhostArchiveError::MalformedGhostData(_))
        ));
        assert!(matches!(
            GhostArchive::deserialize(br#"{"lap_time_ms": 1}"#),
            Err(GhostArchiveError::MalformedGhostData(_))
        ));
        assert!(matches!(
            GhostArchive::deserialize(br#"{"version": 1, "lap_time_ms": "fast"}"#),
            Err(GhostArchiveError::MalformedGhostData(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_version() {
        let bytes = GhostArchive::serialize(&record()).expect("encode");
        let text = String::from_utf8(bytes).expect("utf8");
        let bumped = text.replacen("\"version\":1", "\"version\":7", 1);
        assert!(matches!(
            GhostArchive::deserialize(bumped.as_bytes()),
            Err(GhostArchiveError::UnsupportedVersion { found: 7, expected: 1 })
        ));
    }

    #[test]
    fn test_rejects_empty_trajectory() {
        let mut bad = record();
        bad.trajectory = CompressedTrajectory::from_samples(Vec::new(), 0);
        assert!(GhostArchive::serialize(&bad).is_err());
    }

    #[test]
    fn test_rejects_non_finite_samples() {
        let mut bad = record();
        bad.trajectory.samples[2].speed = f64::NAN;
        assert!(matches!(
            GhostArchive::serialize(&bad),
            Err(GhostArchiveError::MalformedGhostData(_))
        ));
    }
}

//! Keyframe compression for lap trajectories
//!
//! Dense 60 Hz lap samples are reduced to the frames where something
//! actually changed: position moved, the car rotated, or speed shifted by
//! more than a threshold. The first and last frames are always kept so
//! playback covers the whole lap.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::quat_angular_distance;
use crate::sim::PoseSample;

/// Which frame an interior sample is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeltaReference {
    /// The last frame that made it into the output. Slow drift adds up
    /// until it crosses a threshold.
    #[default]
    PreviousKept,
    /// The immediately preceding raw frame. Matches legacy ghost data but
    /// never catches slow drift.
    PreviousRaw,
}

/// Per-axis change thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionThresholds {
    /// Euclidean distance (m)
    pub position: f64,
    /// Angular distance, `acos(|q1·q2|)` (radians)
    pub rotation: f64,
    /// Absolute speed difference (m/s)
    pub speed: f64,
    pub reference: DeltaReference,
}

impl Default for CompressionThresholds {
    fn default() -> Self {
        Self {
            position: GHOST_POSITION_THRESHOLD,
            rotation: GHOST_ROTATION_THRESHOLD,
            speed: GHOST_SPEED_THRESHOLD,
            reference: DeltaReference::PreviousKept,
        }
    }
}

/// A sparse, time-ordered subsequence of a lap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedTrajectory {
    pub samples: Vec<PoseSample>,
    pub source_frame_count: u32,
    pub compression_ratio: f64,
}

impl CompressedTrajectory {
    /// Wrap samples without compressing (ratio computed from counts)
    pub fn from_samples(samples: Vec<PoseSample>, source_frame_count: u32) -> Self {
        let compression_ratio = source_frame_count as f64 / samples.len().max(1) as f64;
        Self {
            samples,
            source_frame_count,
            compression_ratio,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time from the first to the last keyframe
    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.elapsed_time - first.elapsed_time,
            _ => 0.0,
        }
    }

    /// Ghost pose at time `t`, interpolated between the surrounding keyframes
    ///
    /// Clamps to the first/last keyframe outside the recorded range.
    pub fn sample_at(&self, t: f64) -> Option<PoseSample> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        if t.is_nan() || t <= first.elapsed_time {
            return Some(*first);
        }
        if t >= last.elapsed_time {
            return Some(*last);
        }

        // Index of the first keyframe strictly after t
        let next = self.samples.partition_point(|s| s.elapsed_time <= t);
        let a = &self.samples[next - 1];
        let b = &self.samples[next];
        let span = b.elapsed_time - a.elapsed_time;
        let alpha = if span > 0.0 { (t - a.elapsed_time) / span } else { 0.0 };
        let mut pose = a.interpolate(b, alpha);
        pose.elapsed_time = t;
        Some(pose)
    }
}

/// Source length as a frame count, saturating at `u32::MAX`
fn frame_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Threshold-based keyframe reducer
#[derive(Debug, Clone, Default)]
pub struct KeyframeCompressor {
    pub thresholds: CompressionThresholds,
}

impl KeyframeCompressor {
    pub fn new(thresholds: CompressionThresholds) -> Self {
        Self { thresholds }
    }

    /// Reduce `source` to its keyframes
    pub fn compress(&self, source: &[PoseSample]) -> CompressedTrajectory {
        let source_frame_count = frame_count(source.len());
        if source.len() <= 2 {
            return CompressedTrajectory::from_samples(source.to_vec(), source_frame_count);
        }

        let mut kept = Vec::with_capacity(source.len() / 4 + 2);
        kept.push(source[0]);
        let mut reference = 0;

        for i in 1..source.len() - 1 {
            if self.exceeds_threshold(&source[reference], &source[i]) {
                kept.push(source[i]);
                reference = i;
            } else if self.thresholds.reference == DeltaReference::PreviousRaw {
                reference = i;
            }
        }

        kept.push(source[source.len() - 1]);
        log::debug!(
            "Compressed {} frames to {} keyframes",
            source.len(),
            kept.len()
        );
        CompressedTrajectory::from_samples(kept, source_frame_count)
    }

    /// True if any per-axis delta between two samples exceeds its threshold
    pub fn exceeds_threshold(&self, a: &PoseSample, b: &PoseSample) -> bool {
        let t = &self.thresholds;
        a.position.distance(b.position) > t.position
            || quat_angular_distance(a.orientation, b.orientation) > t.rotation
            || (a.speed - b.speed).abs() > t.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DQuat, DVec3};
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    fn at(t: f64, x: f64) -> PoseSample {
        PoseSample::new(t, DVec3::new(x, 0.0, 0.0), DQuat::IDENTITY, 10.0)
    }

    fn compressor(reference: DeltaReference) -> KeyframeCompressor {
        KeyframeCompressor::new(CompressionThresholds {
            reference,
            ..Default::default()
        })
    }

    #[test]
    fn test_short_sequences_unchanged() {
        let c = KeyframeCompressor::default();
        assert!(c.compress(&[]).is_empty());
        assert_eq!(c.compress(&[at(0.0, 0.0)]).len(), 1);
        let two = c.compress(&[at(0.0, 0.0), at(1.0, 0.0)]);
        assert_eq!(two.len(), 2);
        assert_eq!(two.compression_ratio, 1.0);
    }

    #[test]
    fn test_frame_count_saturates() {
        assert_eq!(frame_count(0), 0);
        assert_eq!(frame_count(36_000), 36_000);
        assert_eq!(frame_count(usize::MAX), u32::MAX);
    }

    #[test]
    fn test_constant_input_keeps_endpoints() {
        let source: Vec<_> = (0..100).map(|i| at(i as f64, 3.0)).collect();
        let out = KeyframeCompressor::default().compress(&source);
        assert_eq!(out.len(), 2);
        assert_eq!(out.samples[0], source[0]);
        assert_eq!(out.samples[1], source[99]);
        assert_eq!(out.source_frame_count, 100);
        assert!((out.compression_ratio - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_near_identical_jitter_yields_two() {
        // 500 samples jittering within 5 mm of a point: every pairwise delta < 0.01
        let mut rng = Pcg32::seed_from_u64(7);
        let source: Vec<_> = (0..500)
            .map(|i| {
                let jitter = DVec3::new(
                    rng.random_range(-0.0025..0.0025),
                    rng.random_range(-0.0025..0.0025),
                    rng.random_range(-0.0025..0.0025),
                );
                PoseSample::new(i as f64 / 60.0, DVec3::splat(1.0) + jitter, DQuat::IDENTITY, 0.0)
            })
            .collect();

        for reference in [DeltaReference::PreviousKept, DeltaReference::PreviousRaw] {
            let out = compressor(reference).compress(&source);
            assert_eq!(out.len(), 2);
        }
    }

    #[test]
    fn test_slow_drift_policy_difference() {
        // 0.05 m per frame: below threshold frame-to-frame, 5 m in total
        let source: Vec<_> = (0..101).map(|i| at(i as f64, i as f64 * 0.05)).collect();

        let raw = compressor(DeltaReference::PreviousRaw).compress(&source);
        assert_eq!(raw.len(), 2);

        let kept = compressor(DeltaReference::PreviousKept).compress(&source);
        assert!(kept.len() > 2);
        // Kept frames are never more than one step past the threshold apart
        for w in kept.samples.windows(2) {
            assert!(w[0].position.distance(w[1].position) <= 0.1 + 0.05 + 1e-9);
        }
    }

    #[test]
    fn test_rotation_and_speed_thresholds() {
        let c = KeyframeCompressor::default();
        let a = at(0.0, 0.0);
        let turned = PoseSample {
            orientation: DQuat::from_rotation_y(0.2),
            ..a
        };
        let flipped = PoseSample {
            orientation: -a.orientation,
            ..a
        };
        let faster = PoseSample { speed: 11.0, ..a };

        assert!(c.exceeds_threshold(&a, &turned));
        assert!(!c.exceeds_threshold(&a, &flipped));
        assert!(c.exceeds_threshold(&a, &faster));
    }

    #[test]
    fn test_sample_at_interpolates() {
        let traj = CompressedTrajectory::from_samples(vec![at(0.0, 0.0), at(2.0, 10.0), at(4.0, 10.0)], 240);
        assert_eq!(traj.duration(), 4.0);

        let mid = traj.sample_at(1.0).expect("pose");
        assert!((mid.position.x - 5.0).abs() < 1e-12);
        assert_eq!(mid.elapsed_time, 1.0);

        assert_eq!(traj.sample_at(-1.0).map(|p| p.position.x), Some(0.0));
        assert_eq!(traj.sample_at(9.0).map(|p| p.position.x), Some(10.0));
        assert_eq!(traj.sample_at(2.0).map(|p| p.position.x), Some(10.0));

        let empty = CompressedTrajectory::from_samples(Vec::new(), 0);
        assert!(empty.sample_at(0.0).is_none());
    }

    fn arb_sample() -> impl Strategy<Value = PoseSample> {
        (-50.0f64..50.0, -50.0f64..50.0, -3.2f64..3.2, 0.0f64..80.0).prop_map(|(x, z, yaw, speed)| {
            PoseSample::new(0.0, DVec3::new(x, 0.0, z), DQuat::from_rotation_y(yaw), speed)
        })
    }

    proptest! {
        #[test]
        fn prop_compression_bounds(
            source in prop::collection::vec(arb_sample(), 1..200),
            raw in any::<bool>(),
        ) {
            let mut source = source;
            for (i, s) in source.iter_mut().enumerate() {
                s.elapsed_time = i as f64;
            }
            let reference = if raw { DeltaReference::PreviousRaw } else { DeltaReference::PreviousKept };
            let out = compressor(reference).compress(&source);

            prop_assert!(!out.is_empty());
            prop_assert!(out.len() <= source.len());
            prop_assert_eq!(out.samples.first(), source.first());
            prop_assert_eq!(out.samples.last(), source.last());
            prop_assert!(out.samples.windows(2).all(|w| w[0].elapsed_time < w[1].elapsed_time));
            prop_assert_eq!(out.source_frame_count as usize, source.len());
        }
    }
}

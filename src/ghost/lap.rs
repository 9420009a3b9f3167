//! Lap recorder: dense samples during a timed lap, compressed on completion

use thiserror::Error;

use super::archive::GhostRecord;
use super::compress::{CompressionThresholds, KeyframeCompressor};
use crate::sim::PoseSample;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LapError {
    #[error("No lap in progress")]
    NotStarted,
    #[error("Lap too short to make a ghost ({0} samples)")]
    TooShort(usize),
    #[error("Invalid track id")]
    InvalidTrackId,
}

/// Collects every tick's pose during a timed lap
#[derive(Debug, Clone)]
pub struct LapRecorder {
    samples: Vec<PoseSample>,
    start_time: Option<f64>,
    max_samples: usize,
    dropped: usize,
    compressor: KeyframeCompressor,
}

impl LapRecorder {
    pub fn new(thresholds: CompressionThresholds, max_samples: usize) -> Self {
        Self {
            samples: Vec::new(),
            start_time: None,
            max_samples,
            dropped: 0,
            compressor: KeyframeCompressor::new(thresholds),
        }
    }

    /// Begin a lap at session time `now` (discards any lap in progress)
    pub fn start(&mut self, now: f64) {
        self.samples.clear();
        self.dropped = 0;
        self.start_time = Some(now);
    }

    /// Drop the lap in progress (crash replay, reset to track)
    pub fn abort(&mut self) {
        if self.start_time.take().is_some() {
            log::debug!("Lap aborted after {} samples", self.samples.len());
        }
        self.samples.clear();
    }

    pub fn is_active(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Lap time so far, rounded to whole milliseconds
    pub fn lap_time_ms(&self, now: f64) -> Option<u32> {
        let start = self.start_time?;
        let ms = ((now - start) * 1000.0).round();
        Some(ms.clamp(0.0, u32::MAX as f64) as u32)
    }

    /// Append a sample with its time rebased to the lap start
    ///
    /// Returns false (and drops the sample) when no lap is running, the
    /// sample is invalid, or the lap hit its sample cap.
    pub fn record(&mut self, sample: PoseSample) -> bool {
        let Some(start) = self.start_time else {
            return false;
        };
        if !sample.is_valid() {
            log::warn!("Rejected invalid lap sample at t={}", sample.elapsed_time);
            return false;
        }
        if self.samples.len() >= self.max_samples {
            self.dropped += 1;
            return false;
        }
        self.samples.push(PoseSample {
            elapsed_time: sample.elapsed_time - start,
            ..sample
        });
        true
    }

    /// Finish the lap and compress it into a ghost
    pub fn finish(
        &mut self,
        track_id: &str,
        lap_time_ms: u32,
        recorded_at_ms: f64,
    ) -> Result<GhostRecord, LapError> {
        if self.start_time.is_none() {
            return Err(LapError::NotStarted);
        }
        if track_id.trim().is_empty() {
            return Err(LapError::InvalidTrackId);
        }
        if self.samples.len() < 2 {
            let count = self.samples.len();
            self.abort();
            return Err(LapError::TooShort(count));
        }
        if self.dropped > 0 {
            log::warn!("Lap exceeded sample cap, {} samples dropped", self.dropped);
        }

        let trajectory = self.compressor.compress(&self.samples);
        log::info!(
            "Lap {:.3}s on {}: {} frames -> {} keyframes ({:.1}x)",
            lap_time_ms as f64 / 1000.0,
            track_id,
            trajectory.source_frame_count,
            trajectory.len(),
            trajectory.compression_ratio
        );
        self.start_time = None;
        self.samples.clear();

        Ok(GhostRecord {
            lap_time_ms,
            track_id: track_id.to_string(),
            trajectory,
            recorded_at_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DQuat, DVec3};

    fn pose(t: f64, x: f64) -> PoseSample {
        PoseSample::new(t, DVec3::new(x, 0.0, 0.0), DQuat::IDENTITY, 12.0)
    }

    #[test]
    fn test_ignores_samples_before_start() {
        let mut lap = LapRecorder::new(CompressionThresholds::default(), 100);
        assert!(!lap.record(pose(0.0, 0.0)));
        assert!(lap.is_empty());
        assert_eq!(lap.finish("oval", 1, 0.0), Err(LapError::NotStarted));
    }

    #[test]
    fn test_rebases_time_and_compresses() {
        let mut lap = LapRecorder::new(CompressionThresholds::default(), 1000);
        lap.start(5.0);
        for i in 0..120 {
            let t = 5.0 + i as f64 / 60.0;
            // Parked for the first second, then moving
            let x = if i < 60 { 0.0 } else { (i - 60) as f64 };
            assert!(lap.record(pose(t, x)));
        }
        assert_eq!(lap.lap_time_ms(7.0), Some(2000));

        let ghost = lap.finish("oval", 2000, 1.0).expect("ghost");
        assert_eq!(ghost.trajectory.source_frame_count, 120);
        assert_eq!(ghost.trajectory.samples[0].elapsed_time, 0.0);
        assert!(ghost.trajectory.len() < 120);
        assert!(ghost.trajectory.len() > 2);
        assert!(!lap.is_active());
    }

    #[test]
    fn test_rejects_invalid_samples() {
        let mut lap = LapRecorder::new(CompressionThresholds::default(), 10);
        lap.start(0.0);
        let mut bad = pose(0.1, 0.0);
        bad.speed = -4.0;
        assert!(!lap.record(bad));
        bad.speed = f64::NAN;
        assert!(!lap.record(bad));
        assert!(lap.is_empty());
    }

    #[test]
    fn test_sample_cap() {
        let mut lap = LapRecorder::new(CompressionThresholds::default(), 3);
        lap.start(0.0);
        for i in 0..5 {
            lap.record(pose(i as f64, i as f64));
        }
        assert_eq!(lap.len(), 3);
    }

    #[test]
    fn test_too_short_and_bad_track() {
        let mut lap = LapRecorder::new(CompressionThresholds::default(), 10);
        lap.start(0.0);
        lap.record(pose(0.0, 0.0));
        lap.record(pose(1.0, 1.0));
        assert_eq!(lap.finish("  ", 1000, 0.0), Err(LapError::InvalidTrackId));
        assert!(lap.is_active());

        lap.start(0.0);
        lap.record(pose(0.0, 0.0));
        assert_eq!(lap.finish("oval", 1000, 0.0), Err(LapError::TooShort(1)));
        assert!(!lap.is_active());
    }
}

//! Fixed-capacity replay ring buffer
//!
//! Every tick the current pose is written over the oldest slot. When a crash
//! fires, the buffer is unrolled into chronological order for playback.
//!
//! ```text
//!   after wraparound (capacity 6, 8 writes):
//!   slots:   [ 6  7 | 2  3  4  5 ]
//!                   ^ write_index = 2
//!   snapshot: 2 3 4 5 6 7
//! ```

use super::pose::{PoseSample, Timestamped};

/// Circular recorder with pre-allocated storage
#[derive(Debug, Clone)]
pub struct RingRecorder<T = PoseSample> {
    samples: Box<[T]>,
    write_index: usize,
    total_written: u64,
    recording: bool,
}

impl<T: Copy + Default> RingRecorder<T> {
    /// Allocate a recorder holding `capacity` samples
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring recorder capacity must be non-zero");
        Self {
            samples: vec![T::default(); capacity].into_boxed_slice(),
            write_index: 0,
            total_written: 0,
            recording: false,
        }
    }

    /// Reset counters and begin accepting samples
    pub fn start_recording(&mut self) {
        self.write_index = 0;
        self.total_written = 0;
        self.recording = true;
    }

    /// Stop accepting samples, keeping what was recorded
    pub fn stop_recording(&mut self) {
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Write a sample over the oldest slot (no-op while not recording)
    #[inline]
    pub fn record(&mut self, sample: T) {
        if !self.recording {
            return;
        }
        self.samples[self.write_index] = sample;
        self.write_index = (self.write_index + 1) % self.samples.len();
        self.total_written += 1;
    }

    /// Recorded samples, oldest first
    pub fn chronological_snapshot(&self) -> Vec<T> {
        let capacity = self.samples.len();
        if self.total_written < capacity as u64 {
            return self.samples[..self.total_written as usize].to_vec();
        }

        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.samples[self.write_index..]);
        out.extend_from_slice(&self.samples[..self.write_index]);
        out
    }

    /// Most recently written sample
    pub fn latest(&self) -> Option<&T> {
        if self.total_written == 0 {
            return None;
        }
        let capacity = self.samples.len();
        Some(&self.samples[(self.write_index + capacity - 1) % capacity])
    }

    /// Reset counters without touching storage (next `record` overwrites)
    pub fn clear(&mut self) {
        self.write_index = 0;
        self.total_written = 0;
    }

    /// Number of samples currently available for playback
    pub fn len(&self) -> usize {
        self.total_written.min(self.samples.len() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total_written == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Samples written since the last start/clear, including overwritten ones
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }
}

impl<T: Copy + Default + Timestamped> RingRecorder<T> {
    /// Timestamp of the newest sample, or 0 when empty
    pub fn duration_seconds(&self) -> f64 {
        self.latest().map(|s| s.elapsed_time()).unwrap_or(0.0)
    }

    /// Time covered by the samples still in the buffer
    pub fn span_seconds(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let oldest = if self.total_written < self.samples.len() as u64 {
            &self.samples[0]
        } else {
            &self.samples[self.write_index]
        };
        self.duration_seconds() - oldest.elapsed_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DQuat, DVec3};
    use proptest::prelude::*;

    fn sample(t: f64) -> PoseSample {
        PoseSample::new(t, DVec3::new(t, 0.0, 0.0), DQuat::IDENTITY, 1.0)
    }

    #[test]
    fn test_record_ignored_while_inactive() {
        let mut ring = RingRecorder::<PoseSample>::new(4);
        ring.record(sample(0.0));
        assert!(ring.is_empty());
        assert!(ring.chronological_snapshot().is_empty());
        assert_eq!(ring.duration_seconds(), 0.0);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        let _ = RingRecorder::<PoseSample>::new(0);
    }

    #[test]
    fn test_partial_fill_in_order() {
        let mut ring = RingRecorder::new(8);
        ring.start_recording();
        for i in 0..5 {
            ring.record(sample(i as f64));
        }
        let snap = ring.chronological_snapshot();
        assert_eq!(snap.len(), 5);
        assert!(snap.iter().enumerate().all(|(i, s)| s.elapsed_time == i as f64));
        assert_eq!(ring.duration_seconds(), 4.0);
    }

    #[test]
    fn test_exactly_full_buffer() {
        let mut ring = RingRecorder::new(4);
        ring.start_recording();
        for i in 0..4 {
            ring.record(sample(i as f64));
        }
        assert_eq!(ring.write_index(), 0);
        let times: Vec<f64> = ring
            .chronological_snapshot()
            .iter()
            .map(|s| s.elapsed_time)
            .collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_wraparound_scenario() {
        // 2000 pushes into an 1800-slot ring keeps pushes 201..=2000
        let mut ring = RingRecorder::new(1800);
        ring.start_recording();
        for i in 0..2000 {
            ring.record(sample(i as f64 * 0.1));
        }

        let snap = ring.chronological_snapshot();
        assert_eq!(snap.len(), 1800);
        assert_eq!(snap[0].elapsed_time, 200.0 * 0.1);
        assert_eq!(snap[1799].elapsed_time, 1999.0 * 0.1);
        assert_eq!(ring.duration_seconds(), 1999.0 * 0.1);
        assert!((ring.span_seconds() - 1799.0 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_start_recording_resets() {
        let mut ring = RingRecorder::new(3);
        ring.start_recording();
        for i in 0..7 {
            ring.record(sample(i as f64));
        }
        ring.start_recording();
        ring.start_recording();
        assert!(ring.is_empty());
        assert_eq!(ring.write_index(), 0);
        ring.record(sample(42.0));
        assert_eq!(ring.chronological_snapshot().len(), 1);
    }

    #[test]
    fn test_clear_keeps_recording() {
        let mut ring = RingRecorder::new(3);
        ring.start_recording();
        ring.record(sample(1.0));
        ring.clear();
        assert!(ring.is_recording());
        assert!(ring.is_empty());
        ring.record(sample(2.0));
        assert_eq!(ring.latest().map(|s| s.elapsed_time), Some(2.0));
    }

    #[test]
    fn test_stop_freezes_contents() {
        let mut ring = RingRecorder::new(3);
        ring.start_recording();
        ring.record(sample(1.0));
        ring.stop_recording();
        ring.record(sample(2.0));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.duration_seconds(), 1.0);
    }

    proptest! {
        #[test]
        fn prop_snapshot_is_last_capacity_pushes(capacity in 1usize..64, pushes in 0usize..300) {
            let mut ring = RingRecorder::<u64>::new(capacity);
            ring.start_recording();
            for i in 0..pushes {
                ring.record(i as u64);
            }

            let snap = ring.chronological_snapshot();
            let start = pushes.saturating_sub(capacity);
            let expected: Vec<u64> = (start..pushes).map(|i| i as u64).collect();
            prop_assert_eq!(snap, expected);
            prop_assert_eq!(ring.write_index() as u64, ring.total_written() % capacity as u64);
        }
    }
}

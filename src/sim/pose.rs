//! Pose samples: timestamped snapshots of an actor's transform

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Anything stored in a replay ring that carries its own timestamp
pub trait Timestamped {
    /// Seconds since recording start
    fn elapsed_time(&self) -> f64;
}

/// A single snapshot of a vehicle or camera transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Seconds since recording start
    pub elapsed_time: f64,
    pub position: DVec3,
    /// Unit quaternion (x, y, z, w)
    pub orientation: DQuat,
    /// Auxiliary angles (wheel spin, steering), zero when unused
    #[serde(default)]
    pub aux_angles: [f64; 4],
    /// Scalar speed (m/s)
    pub speed: f64,
}

impl Default for PoseSample {
    fn default() -> Self {
        Self {
            elapsed_time: 0.0,
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            aux_angles: [0.0; 4],
            speed: 0.0,
        }
    }
}

impl PoseSample {
    pub fn new(elapsed_time: f64, position: DVec3, orientation: DQuat, speed: f64) -> Self {
        Self {
            elapsed_time,
            position,
            orientation,
            aux_angles: [0.0; 4],
            speed,
        }
    }

    pub fn with_aux_angles(mut self, aux_angles: [f64; 4]) -> Self {
        self.aux_angles = aux_angles;
        self
    }

    /// True if every field is finite and speed is non-negative
    pub fn is_valid(&self) -> bool {
        self.elapsed_time.is_finite()
            && self.position.is_finite()
            && self.orientation.is_finite()
            && self.aux_angles.iter().all(|a| a.is_finite())
            && self.speed.is_finite()
            && self.speed >= 0.0
    }

    /// Orientation renormalized, falling back to identity for a zero quaternion
    pub fn normalized_orientation(&self) -> DQuat {
        if self.orientation.length_squared() < 1e-12 {
            DQuat::IDENTITY
        } else {
            self.orientation.normalize()
        }
    }

    /// Interpolate toward `other` (`t` in [0, 1])
    ///
    /// Position, speed and aux angles are lerped, orientation is slerped.
    pub fn interpolate(&self, other: &PoseSample, t: f64) -> PoseSample {
        let t = t.clamp(0.0, 1.0);
        let mut aux_angles = [0.0; 4];
        for (i, a) in aux_angles.iter_mut().enumerate() {
            *a = self.aux_angles[i] + (other.aux_angles[i] - self.aux_angles[i]) * t;
        }
        PoseSample {
            elapsed_time: self.elapsed_time + (other.elapsed_time - self.elapsed_time) * t,
            position: self.position.lerp(other.position, t),
            orientation: self
                .normalized_orientation()
                .slerp(other.normalized_orientation(), t),
            aux_angles,
            speed: self.speed + (other.speed - self.speed) * t,
        }
    }
}

impl Timestamped for PoseSample {
    #[inline]
    fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }
}

//! Impact classification from kinematic state
//!
//! The physics integrator gives us no contact callbacks, so collisions are
//! inferred from how much the velocity changed over one tick:
//!
//! ```text
//!   F = m * |v_now - v_prev| / dt
//! ```
//!
//! A second check catches hard landings: on an airborne -> grounded
//! transition, the downward speed alone is turned into a force.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Severity tier of an impact, ordered None < Minor < Major < Catastrophic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    None,
    Minor,
    Major,
    Catastrophic,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Minor => "Minor",
            Severity::Major => "Major",
            Severity::Catastrophic => "Catastrophic",
        }
    }

    /// Damage weight applied by the crash orchestrator
    pub fn damage_weight(&self) -> f64 {
        match self {
            Severity::None => 0.0,
            Severity::Minor => MINOR_DAMAGE_WEIGHT,
            Severity::Major => MAJOR_DAMAGE_WEIGHT,
            Severity::Catastrophic => CATASTROPHIC_DAMAGE_WEIGHT,
        }
    }
}

/// What produced the impact estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactKind {
    /// Velocity changed sharply between two ticks
    Collision,
    /// Touched down from the air with a large downward speed
    HardLanding,
}

/// One detected impact, passed by value to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub timestamp_sec: f64,
    pub position: DVec3,
    pub velocity: DVec3,
    pub impact_force_n: f64,
    /// Unit direction the impulse pushed the vehicle (up for landings)
    pub collision_normal: DVec3,
    pub severity: Severity,
    pub kind: ImpactKind,
    /// Speed along the vehicle's forward axis before impact
    pub forward_velocity_component: f64,
    /// Vertical speed before impact
    pub vertical_velocity_component: f64,
    /// Force is large enough to be replay-worthy (the cooldown gates it further)
    pub should_trigger_replay: bool,
}

/// Thresholds and constants for the impact heuristic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub vehicle_mass_kg: f64,
    pub tick_duration: f64,
    pub minor_threshold: f64,
    pub major_threshold: f64,
    pub hard_landing_velocity: f64,
    pub spawn_grace_secs: f64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            vehicle_mass_kg: VEHICLE_MASS_KG,
            tick_duration: SIM_DT,
            minor_threshold: MINOR_IMPACT_THRESHOLD,
            major_threshold: MAJOR_IMPACT_THRESHOLD,
            hard_landing_velocity: HARD_LANDING_VELOCITY,
            spawn_grace_secs: SPAWN_GRACE_SECS,
        }
    }
}

impl ImpactConfig {
    pub fn catastrophic_threshold(&self) -> f64 {
        self.major_threshold * CATASTROPHIC_MULTIPLIER
    }

    /// Force normalizer used for damage (`1.5 * major * 2`)
    pub fn damage_normalizer(&self) -> f64 {
        self.catastrophic_threshold() * 2.0
    }

    /// Map a force estimate to its severity tier
    pub fn severity_for(&self, impact_force: f64) -> Severity {
        if impact_force.is_nan() || impact_force < self.minor_threshold {
            Severity::None
        } else if impact_force < self.major_threshold {
            Severity::Minor
        } else if impact_force < self.catastrophic_threshold() {
            Severity::Major
        } else {
            Severity::Catastrophic
        }
    }

    /// `m * |dv| / dt`
    #[inline]
    pub fn impact_force(&self, velocity_delta: DVec3) -> f64 {
        self.vehicle_mass_kg * velocity_delta.length() / self.tick_duration
    }
}

/// Everything the classifier needs for one tick
///
/// The caller owns the previous-tick state; the classifier keeps none.
#[derive(Debug, Clone, Copy)]
pub struct ImpactInput {
    pub now: f64,
    pub position: DVec3,
    pub orientation: DQuat,
    pub previous_velocity: DVec3,
    pub current_velocity: DVec3,
    pub was_on_ground: bool,
    pub on_ground: bool,
    /// Seconds since the vehicle was last (re)spawned
    pub time_since_spawn: f64,
}

impl ImpactInput {
    /// Airborne last tick, grounded now
    #[inline]
    pub fn is_touchdown(&self) -> bool {
        !self.was_on_ground && self.on_ground
    }
}

/// Impacts found in one tick: `[collision, hard landing]`
pub type TickImpacts = [Option<CrashEvent>; 2];

/// Stateless per-tick impact classifier
#[derive(Debug, Clone, Default)]
pub struct ImpactClassifier {
    pub config: ImpactConfig,
}

impl ImpactClassifier {
    pub fn new(config: ImpactConfig) -> Self {
        Self { config }
    }

    /// Classify this tick
    ///
    /// Returns the collision impact first and the hard-landing impact
    /// second; either or both may be absent. On a touchdown tick the
    /// collision check ignores the vertical change, which belongs to the
    /// landing check alone.
    pub fn classify(&self, input: &ImpactInput) -> TickImpacts {
        if input.time_since_spawn < self.config.spawn_grace_secs {
            return [None, None];
        }
        [self.classify_collision(input), self.classify_landing(input)]
    }

    /// Velocity-delta check
    pub fn classify_collision(&self, input: &ImpactInput) -> Option<CrashEvent> {
        let mut delta = input.current_velocity - input.previous_velocity;
        if input.is_touchdown() {
            delta.y = 0.0;
        }
        let force = self.config.impact_force(delta);
        let severity = self.config.severity_for(force);
        if severity == Severity::None {
            return None;
        }

        Some(self.build_event(
            input,
            force,
            delta.normalize_or(DVec3::Y),
            severity,
            ImpactKind::Collision,
        ))
    }

    /// Airborne -> grounded check using only the vertical component
    pub fn classify_landing(&self, input: &ImpactInput) -> Option<CrashEvent> {
        if !input.is_touchdown() {
            return None;
        }
        let vertical_speed = input.previous_velocity.y.abs();
        if vertical_speed.is_nan() || vertical_speed <= self.config.hard_landing_velocity {
            return None;
        }

        let force = self.config.impact_force(DVec3::new(0.0, vertical_speed, 0.0));
        let severity = self.config.severity_for(force);
        if severity == Severity::None {
            return None;
        }
        Some(self.build_event(input, force, DVec3::Y, severity, ImpactKind::HardLanding))
    }

    fn build_event(
        &self,
        input: &ImpactInput,
        force: f64,
        normal: DVec3,
        severity: Severity,
        kind: ImpactKind,
    ) -> CrashEvent {
        // Vehicle forward is -Z in its local frame
        let orientation = if input.orientation.length_squared() > 1e-12 {
            input.orientation.normalize()
        } else {
            DQuat::IDENTITY
        };
        let forward = orientation * DVec3::NEG_Z;
        CrashEvent {
            timestamp_sec: input.now,
            position: input.position,
            velocity: input.current_velocity,
            impact_force_n: force,
            collision_normal: normal,
            severity,
            kind,
            forward_velocity_component: input.previous_velocity.dot(forward),
            vertical_velocity_component: input.previous_velocity.y,
            should_trigger_replay: force >= self.config.minor_threshold,
        }
    }
}

//! Fixed timestep race session tick
//!
//! `RaceSession` owns one of every component (replay rings, classifier,
//! orchestrator, damage, lap recorder, stats) and is driven once per
//! simulation step by the game loop with a physics snapshot.

use glam::{DQuat, DVec3};

use super::crash::{CrashOrchestrator, DamageState, ImpactOutcome, VehicleBody};
use super::impact::{CrashEvent, ImpactClassifier, ImpactInput, TickImpacts};
use super::pose::PoseSample;
use super::ring::RingRecorder;
use crate::ghost::{GhostRecord, LapError, LapRecorder};
use crate::settings::ReplaySettings;
use crate::stats::{CrashStatistics, RaceResultSummary};

/// Physics snapshot for a single tick (pulled from the integrator)
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub position: DVec3,
    pub velocity: DVec3,
    pub orientation: DQuat,
    pub on_ground: bool,
    /// Wheel spin / steering angles
    pub aux_angles: [f64; 4],
    /// Current camera pose, if the camera layer exposes one
    pub camera: Option<(DVec3, DQuat)>,
}

impl Default for TickInput {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            on_ground: true,
            aux_angles: [0.0; 4],
            camera: None,
        }
    }
}

/// Current phase of the race session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePhase {
    /// Normal driving: recording and crash detection active
    Racing,
    /// Crash replay playing: detection off, rings frozen
    Replay,
    /// Race over
    Finished,
}

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    /// `[collision, hard landing]`
    pub impacts: TickImpacts,
    /// Orchestrator outcome for each impact slot
    pub outcomes: [Option<ImpactOutcome>; 2],
    pub entered_replay: bool,
}

impl TickReport {
    pub fn impact_count(&self) -> usize {
        self.impacts.iter().flatten().count()
    }

    /// First impact of the tick (collision before landing)
    pub fn first_impact(&self) -> Option<&CrashEvent> {
        self.impacts.iter().flatten().next()
    }
}

/// Chronological frames handed to the playback layer
#[derive(Debug, Clone)]
pub struct ReplayClip {
    pub vehicle: Vec<PoseSample>,
    /// Empty when no camera poses were supplied
    pub camera: Vec<PoseSample>,
    pub crash: CrashEvent,
    pub replay_number: u32,
    pub duration_secs: f64,
}

/// Previous-tick kinematic state owned on behalf of the classifier
#[derive(Debug, Clone, Copy)]
struct KinematicHistory {
    velocity: DVec3,
    on_ground: bool,
    spawn_time: f64,
    primed: bool,
}

/// Top-level owner of the crash/replay/ghost pipeline for one race
#[derive(Debug)]
pub struct RaceSession {
    settings: ReplaySettings,
    phase: RacePhase,
    time_ticks: u64,
    vehicle_ring: RingRecorder<PoseSample>,
    camera_ring: RingRecorder<PoseSample>,
    classifier: ImpactClassifier,
    orchestrator: CrashOrchestrator,
    damage: DamageState,
    history: KinematicHistory,
    lap: LapRecorder,
    stats: CrashStatistics,
    pending_replay: Option<ReplayClip>,
    spawn_pose: PoseSample,
    top_speed: f64,
    best_lap_ms: Option<u32>,
    laps_completed: u32,
}

impl RaceSession {
    /// Build a session; the vehicle starts at `spawn_pose`
    pub fn new(settings: ReplaySettings, spawn_pose: PoseSample) -> Self {
        let settings = settings.validated();
        let impact = settings.impact;
        let mut session = Self {
            phase: RacePhase::Racing,
            time_ticks: 0,
            vehicle_ring: RingRecorder::new(settings.replay_capacity),
            camera_ring: RingRecorder::new(settings.replay_capacity),
            classifier: ImpactClassifier::new(impact),
            orchestrator: CrashOrchestrator::new(impact, settings.replay_cooldown_secs),
            damage: DamageState::new(),
            history: KinematicHistory {
                velocity: DVec3::ZERO,
                on_ground: true,
                spawn_time: 0.0,
                primed: false,
            },
            lap: LapRecorder::new(settings.compression, settings.max_lap_samples),
            stats: CrashStatistics::default(),
            pending_replay: None,
            spawn_pose,
            top_speed: 0.0,
            best_lap_ms: None,
            laps_completed: 0,
            settings,
        };
        session.orchestrator.set_enabled(session.settings.crash_detection);
        session.vehicle_ring.start_recording();
        session.camera_ring.start_recording();
        session
    }

    /// Seconds since the session started
    pub fn now(&self) -> f64 {
        self.time_ticks as f64 * self.settings.impact.tick_duration
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn settings(&self) -> &ReplaySettings {
        &self.settings
    }

    pub fn damage(&self) -> &DamageState {
        &self.damage
    }

    pub fn stats(&self) -> &CrashStatistics {
        &self.stats
    }

    pub fn vehicle_ring(&self) -> &RingRecorder<PoseSample> {
        &self.vehicle_ring
    }

    pub fn orchestrator(&self) -> &CrashOrchestrator {
        &self.orchestrator
    }

    /// Register crash/replay subscribers (audio, HUD, particles)
    pub fn orchestrator_mut(&mut self) -> &mut CrashOrchestrator {
        &mut self.orchestrator
    }

    pub fn lap_recorder(&self) -> &LapRecorder {
        &self.lap
    }

    /// Advance the session by one fixed step
    pub fn tick(&mut self, input: &TickInput) -> TickReport {
        let mut report = TickReport::default();
        if self.phase != RacePhase::Racing {
            return report;
        }

        self.time_ticks += 1;
        let now = self.now();
        let speed = input.velocity.length();

        let pose = PoseSample {
            elapsed_time: now,
            position: input.position,
            orientation: input.orientation,
            aux_angles: input.aux_angles,
            speed,
        };
        if pose.is_valid() {
            self.vehicle_ring.record(pose);
            if let Some((position, orientation)) = input.camera {
                self.camera_ring
                    .record(PoseSample::new(now, position, orientation, speed));
            }
            self.lap.record(pose);
            self.orchestrator.observe_pose(&pose, input.on_ground);
            self.top_speed = self.top_speed.max(speed);
        } else {
            log::debug!("Skipping invalid physics snapshot at t={:.3}", now);
        }

        // First tick after (re)spawn only primes the history
        if !self.history.primed {
            self.history.velocity = input.velocity;
            self.history.on_ground = input.on_ground;
            self.history.primed = true;
            return report;
        }

        let impact_input = ImpactInput {
            now,
            position: input.position,
            orientation: input.orientation,
            previous_velocity: self.history.velocity,
            current_velocity: input.velocity,
            was_on_ground: self.history.on_ground,
            on_ground: input.on_ground,
            time_since_spawn: now - self.history.spawn_time,
        };
        self.history.velocity = input.velocity;
        self.history.on_ground = input.on_ground;

        if !self.orchestrator.is_enabled() || !input.velocity.is_finite() {
            return report;
        }

        let impacts = self.classifier.classify(&impact_input);
        report.impacts = impacts;

        // Every impact is dispatched before the session freezes for replay
        let mut replay_crash = None;
        for (slot, event) in impacts.into_iter().enumerate() {
            let Some(event) = event else {
                continue;
            };
            let Some(outcome) = self.orchestrator.on_impact(&event, &mut self.damage) else {
                continue;
            };
            report.outcomes[slot] = Some(outcome);
            self.stats.record_impact(&event, outcome.replay_triggered);
            if outcome.replay_triggered && replay_crash.is_none() {
                replay_crash = Some(event);
            }
        }

        if let Some(crash) = replay_crash {
            if self.settings.auto_replay {
                self.enter_replay(crash);
                report.entered_replay = true;
            }
        }

        report
    }

    /// Freeze the rings and hand their contents to the playback layer
    fn enter_replay(&mut self, crash: CrashEvent) {
        self.orchestrator.set_enabled(false);
        self.vehicle_ring.stop_recording();
        self.camera_ring.stop_recording();
        self.lap.abort();

        let vehicle = self.vehicle_ring.chronological_snapshot();
        let camera = self.camera_ring.chronological_snapshot();
        let duration_secs = self.vehicle_ring.span_seconds();
        let replay = self.orchestrator.replay_event(crash);
        log::info!(
            "Entering replay #{} ({} frames, {:.1}s)",
            replay.replay_number,
            vehicle.len(),
            duration_secs
        );

        self.pending_replay = Some(ReplayClip {
            vehicle,
            camera,
            crash,
            replay_number: replay.replay_number,
            duration_secs,
        });
        self.phase = RacePhase::Replay;
    }

    /// Take the replay clip for playback (once per crash)
    pub fn take_replay(&mut self) -> Option<ReplayClip> {
        self.pending_replay.take()
    }

    /// Replay finished: respawn and resume racing
    pub fn finish_replay(&mut self, body: &mut dyn VehicleBody) -> Option<PoseSample> {
        if self.phase != RacePhase::Replay {
            return None;
        }
        self.pending_replay = None;
        let pose = self.respawn(body);
        self.phase = RacePhase::Racing;
        Some(pose)
    }

    /// Move the vehicle to the last safe pose and restart recording
    ///
    /// Damage persists; call `clear_damage` for a fresh race.
    pub fn respawn(&mut self, body: &mut dyn VehicleBody) -> PoseSample {
        let pose = self.orchestrator.respawn(body, &self.spawn_pose);
        self.history = KinematicHistory {
            velocity: DVec3::ZERO,
            on_ground: true,
            spawn_time: self.now(),
            primed: false,
        };
        self.vehicle_ring.start_recording();
        self.camera_ring.start_recording();
        self.orchestrator.set_enabled(self.settings.crash_detection);
        pose
    }

    pub fn clear_damage(&mut self) {
        self.damage.clear();
    }

    /// Begin a timed lap at the current tick
    pub fn start_lap(&mut self) {
        self.lap.start(self.now());
    }

    /// Close the current lap and build its ghost
    pub fn complete_lap(&mut self, track_id: &str, recorded_at_ms: f64) -> Result<GhostRecord, LapError> {
        let now = self.now();
        let lap_time_ms = self.lap.lap_time_ms(now).ok_or(LapError::NotStarted)?;
        let record = self.lap.finish(track_id, lap_time_ms, recorded_at_ms)?;
        self.laps_completed += 1;
        self.best_lap_ms = Some(self.best_lap_ms.map_or(lap_time_ms, |b| b.min(lap_time_ms)));
        Ok(record)
    }

    /// End the race
    pub fn finish(&mut self) -> RaceResultSummary {
        self.phase = RacePhase::Finished;
        self.orchestrator.set_enabled(false);
        self.vehicle_ring.stop_recording();
        self.camera_ring.stop_recording();
        self.summary()
    }

    pub fn summary(&self) -> RaceResultSummary {
        RaceResultSummary {
            best_lap_ms: self.best_lap_ms,
            laps_completed: self.laps_completed,
            crashes: self.damage.crash_count,
            replays: self.orchestrator.replays_triggered(),
            top_speed: self.top_speed,
            final_damage: self.damage.overall_damage,
        }
    }
}

//! Crash Replay demo entry point
//!
//! Drives a scripted kart around an oval: one clean timed lap (stored as a
//! ghost), a jump with a hard landing, then a wall hit. Each replay-worthy
//! crash is unrolled from the ring buffer and the kart is respawned.

use glam::{DQuat, DVec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crash_replay::consts::SIM_DT;
use crash_replay::ghost::GhostLeaderboard;
use crash_replay::persistence::MemoryStore;
use crash_replay::platform;
use crash_replay::sim::{PoseSample, RacePhase, RaceSession, TickInput, VehicleBody};
use crash_replay::{CrashStatistics, ReplaySettings};

const TRACK_ID: &str = "demo_oval";
const TRACK_RADIUS: f64 = 120.0;
const CRUISE_SPEED: f64 = 25.0;
const GRAVITY: f64 = 9.81;

/// Stand-in for the physics integrator
struct ScriptedKart {
    angle: f64,
    height: f64,
    vertical_speed: f64,
    speed: f64,
    rng: Pcg32,
}

impl ScriptedKart {
    fn new(seed: u64) -> Self {
        Self {
            angle: 0.0,
            height: 0.0,
            vertical_speed: 0.0,
            speed: CRUISE_SPEED,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    fn position(&self) -> DVec3 {
        DVec3::new(
            TRACK_RADIUS * self.angle.cos(),
            self.height,
            TRACK_RADIUS * self.angle.sin(),
        )
    }

    /// Advance along the oval, with a little suspension noise
    fn step(&mut self, dt: f64, ramp_lift: f64) -> TickInput {
        self.angle += self.speed / TRACK_RADIUS * dt;

        if ramp_lift > 0.0 {
            self.vertical_speed += ramp_lift * dt;
        } else if self.height > 0.0 || self.vertical_speed > 0.0 {
            self.vertical_speed -= GRAVITY * dt;
        }
        self.height += self.vertical_speed * dt;
        if self.height <= 0.0 {
            self.height = 0.0;
            self.vertical_speed = 0.0;
        }

        let noise = self.rng.random_range(-0.01..0.01);
        let tangent = DVec3::new(-self.angle.sin(), 0.0, self.angle.cos());
        let velocity = tangent * (self.speed + noise) + DVec3::Y * self.vertical_speed;
        // Kart forward is -Z
        let orientation = DQuat::from_rotation_arc(DVec3::NEG_Z, tangent);

        TickInput {
            position: self.position(),
            velocity,
            orientation,
            on_ground: self.height <= 0.0 && ramp_lift <= 0.0,
            aux_angles: [self.angle * 12.0, self.angle * 12.0, 0.0, 0.0],
            camera: Some((self.position() + DVec3::new(0.0, 3.0, 0.0) - tangent * 8.0, orientation)),
        }
    }
}

impl VehicleBody for ScriptedKart {
    fn teleport(&mut self, position: DVec3, _orientation: DQuat) {
        self.angle = position.z.atan2(position.x);
        self.height = position.y.max(0.0);
        self.vertical_speed = 0.0;
        self.speed = CRUISE_SPEED;
    }
}

fn drive(session: &mut RaceSession, kart: &mut ScriptedKart, ticks: usize, ramp_lift: f64) {
    for _ in 0..ticks {
        let input = kart.step(SIM_DT, ramp_lift);
        let report = session.tick(&input);
        if report.entered_replay {
            play_replay(session, kart);
        }
    }
}

/// Hand the clip to "playback" and respawn
fn play_replay(session: &mut RaceSession, kart: &mut ScriptedKart) {
    let Some(clip) = session.take_replay() else {
        return;
    };
    log::info!(
        "Replay #{}: {} vehicle frames, {} camera frames, {:.1}s, {:?} {} impact",
        clip.replay_number,
        clip.vehicle.len(),
        clip.camera.len(),
        clip.duration_secs,
        clip.crash.kind,
        clip.crash.severity.as_str()
    );
    if let Some(pose) = session.finish_replay(kart) {
        log::info!("Back on track at t={:.2}s", pose.elapsed_time);
    }
}

fn main() {
    platform::init_logging();
    log::info!("Crash Replay demo starting...");

    let mut store = MemoryStore::new();
    let mut settings = ReplaySettings::load(&store);
    // Coarser ghost keyframes for a constant-speed oval
    settings.compression.position = 2.0;
    let mut kart = ScriptedKart::new(2024);
    let spawn = PoseSample::new(0.0, kart.position(), DQuat::IDENTITY, 0.0);
    let mut session = RaceSession::new(settings, spawn);

    session.orchestrator_mut().subscribe_crash(|event| {
        log::info!(
            "[audio] {} crash, {:.0} N",
            event.severity.as_str(),
            event.impact_force_n
        );
        Ok(())
    });

    // One clean lap
    let lap_ticks = (std::f64::consts::TAU * TRACK_RADIUS / CRUISE_SPEED / SIM_DT).ceil() as usize;
    session.start_lap();
    drive(&mut session, &mut kart, lap_ticks, 0.0);
    let mut board = GhostLeaderboard::load(&mut store, TRACK_ID, session.settings().leaderboard_size);
    match session.complete_lap(TRACK_ID, platform::now_ms()) {
        Ok(ghost) => match board.submit(&mut store, "demo", &ghost) {
            Ok(Some(rank)) => log::info!("Ghost stored at rank {}", rank),
            Ok(None) => log::info!("Lap did not make the leaderboard"),
            Err(err) => log::warn!("Leaderboard rejected lap: {}", err),
        },
        Err(err) => log::warn!("No ghost this lap: {}", err),
    }

    // Ramp, flight, hard landing
    drive(&mut session, &mut kart, 45, 8.0);
    drive(&mut session, &mut kart, 180, 0.0);

    // Cruise, then straight into a wall
    drive(&mut session, &mut kart, 300, 0.0);
    kart.speed = 0.0;
    drive(&mut session, &mut kart, 1, 0.0);
    drive(&mut session, &mut kart, 60, 0.0);

    if session.phase() == RacePhase::Replay {
        play_replay(&mut session, &mut kart);
    }

    let mut stats = CrashStatistics::load(&store);
    stats.merge(session.stats());
    stats.save(&mut store);

    let summary = session.finish();
    log::info!("Race summary: {:?}", summary);
    if let Some(ghost) = board.ghost_for_rank(&store, 1) {
        log::info!(
            "Best ghost: {:.3}s, {} keyframes from {} frames",
            ghost.lap_time_ms as f64 / 1000.0,
            ghost.trajectory.len(),
            ghost.trajectory.source_frame_count
        );
    }
}

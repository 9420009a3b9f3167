//! Crash orchestration: event dispatch, damage accrual, replay cooldown, respawn
//!
//! Every classified impact reaches the crash subscribers (sound, particles,
//! HUD). Only impacts outside the replay cooldown reach the replay-trigger
//! subscribers, which is what pulls the race into replay mode.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::impact::{CrashEvent, ImpactConfig, Severity};
use super::pose::PoseSample;
use crate::clamp01;
use crate::consts::*;

/// Handler invoked for crash or replay-trigger events
pub type CrashHandler = Box<dyn FnMut(&CrashEvent) -> anyhow::Result<()>>;

/// Handle returned by `subscribe_*`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

/// Physics-side body the orchestrator can teleport on respawn
pub trait VehicleBody {
    /// Place the body at a pose and zero its velocity
    fn teleport(&mut self, position: DVec3, orientation: DQuat);
}

/// One collision kept in the damage history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionRecord {
    pub timestamp_sec: f64,
    pub severity: Severity,
    pub impact_force_n: f64,
    pub damage_applied: f64,
}

/// Accumulated vehicle damage for the current race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageState {
    /// Overall damage in [0, 1], only goes down on `clear`
    pub overall_damage: f64,
    pub crash_count: u32,
    /// Most recent collisions (oldest first, bounded)
    pub history: VecDeque<CollisionRecord>,
}

impl Default for DamageState {
    fn default() -> Self {
        Self {
            overall_damage: 0.0,
            crash_count: 0,
            history: VecDeque::with_capacity(MAX_COLLISION_HISTORY),
        }
    }
}

impl DamageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate damage from an impact, returning the amount actually added
    pub fn apply(&mut self, amount: f64, event: &CrashEvent) -> f64 {
        let before = self.overall_damage;
        self.overall_damage = clamp01(before + amount.max(0.0));
        let applied = self.overall_damage - before;
        self.crash_count += 1;

        if self.history.len() == MAX_COLLISION_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(CollisionRecord {
            timestamp_sec: event.timestamp_sec,
            severity: event.severity,
            impact_force_n: event.impact_force_n,
            damage_applied: applied,
        });
        applied
    }

    /// Explicit reset (new race)
    pub fn clear(&mut self) {
        self.overall_damage = 0.0;
        self.crash_count = 0;
        self.history.clear();
    }

    pub fn is_wrecked(&self) -> bool {
        self.overall_damage >= 1.0
    }
}

/// Payload handed to replay-trigger subscribers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayTriggerEvent {
    pub crash: CrashEvent,
    /// 1-based count of replays triggered this session
    pub replay_number: u32,
}

/// Result of feeding one impact through the orchestrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactOutcome {
    pub damage_applied: f64,
    pub replay_triggered: bool,
    /// Handlers that returned an error or panicked
    pub failed_handlers: usize,
}

/// Remembers the last pose where the vehicle sat calmly on the ground
#[derive(Debug, Clone)]
pub struct SafePoseTracker {
    safe_pose: Option<PoseSample>,
    grounded_since: Option<f64>,
    max_speed: f64,
    dwell_secs: f64,
}

impl Default for SafePoseTracker {
    fn default() -> Self {
        Self::new(SAFE_POSE_MAX_SPEED, SAFE_POSE_DWELL_SECS)
    }
}

impl SafePoseTracker {
    pub fn new(max_speed: f64, dwell_secs: f64) -> Self {
        Self {
            safe_pose: None,
            grounded_since: None,
            max_speed,
            dwell_secs,
        }
    }

    /// Feed the current pose; promotes it to safe after a calm dwell
    pub fn observe(&mut self, pose: &PoseSample, on_ground: bool) {
        if !on_ground || pose.speed > self.max_speed || !pose.is_valid() {
            self.grounded_since = None;
            return;
        }
        let since = *self.grounded_since.get_or_insert(pose.elapsed_time);
        if pose.elapsed_time - since >= self.dwell_secs {
            self.safe_pose = Some(*pose);
        }
    }

    pub fn safe_pose(&self) -> Option<&PoseSample> {
        self.safe_pose.as_ref()
    }

    pub fn reset(&mut self) {
        self.safe_pose = None;
        self.grounded_since = None;
    }
}

/// Cooldown-gated crash event dispatcher
pub struct CrashOrchestrator {
    config: ImpactConfig,
    cooldown_secs: f64,
    last_replay_trigger_time: f64,
    enabled: bool,
    replays_triggered: u32,
    next_subscription: u32,
    crash_handlers: Vec<(SubscriptionId, CrashHandler)>,
    replay_handlers: Vec<(SubscriptionId, CrashHandler)>,
    safe_poses: SafePoseTracker,
}

impl std::fmt::Debug for CrashOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashOrchestrator")
            .field("cooldown_secs", &self.cooldown_secs)
            .field("last_replay_trigger_time", &self.last_replay_trigger_time)
            .field("enabled", &self.enabled)
            .field("replays_triggered", &self.replays_triggered)
            .field("crash_handlers", &self.crash_handlers.len())
            .field("replay_handlers", &self.replay_handlers.len())
            .finish()
    }
}

impl Default for CrashOrchestrator {
    fn default() -> Self {
        Self::new(ImpactConfig::default(), REPLAY_COOLDOWN_SECS)
    }
}

impl CrashOrchestrator {
    pub fn new(config: ImpactConfig, cooldown_secs: f64) -> Self {
        Self {
            config,
            cooldown_secs,
            last_replay_trigger_time: f64::NEG_INFINITY,
            enabled: true,
            replays_triggered: 0,
            next_subscription: 1,
            crash_handlers: Vec::new(),
            replay_handlers: Vec::new(),
            safe_poses: SafePoseTracker::default(),
        }
    }

    /// Called for every impact regardless of cooldown
    pub fn subscribe_crash(
        &mut self,
        handler: impl FnMut(&CrashEvent) -> anyhow::Result<()> + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_subscription();
        self.crash_handlers.push((id, Box::new(handler)));
        id
    }

    /// Called only for impacts that pass the replay cooldown
    pub fn subscribe_replay_trigger(
        &mut self,
        handler: impl FnMut(&CrashEvent) -> anyhow::Result<()> + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_subscription();
        self.replay_handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler from whichever list holds it
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.crash_handlers.len() + self.replay_handlers.len();
        self.crash_handlers.retain(|(sub, _)| *sub != id);
        self.replay_handlers.retain(|(sub, _)| *sub != id);
        before != self.crash_handlers.len() + self.replay_handlers.len()
    }

    fn allocate_subscription(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        id
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            log::debug!("Crash detection {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cooldown_secs(&self) -> f64 {
        self.cooldown_secs
    }

    pub fn replays_triggered(&self) -> u32 {
        self.replays_triggered
    }

    /// Forget the last trigger so the next impact may replay immediately
    pub fn reset_cooldown(&mut self) {
        self.last_replay_trigger_time = f64::NEG_INFINITY;
    }

    /// True if a replay could fire at `now`
    pub fn cooldown_elapsed(&self, now: f64) -> bool {
        now - self.last_replay_trigger_time >= self.cooldown_secs
    }

    /// Run the crash protocol for one impact
    ///
    /// Returns `None` when detection is disabled.
    pub fn on_impact(&mut self, event: &CrashEvent, damage: &mut DamageState) -> Option<ImpactOutcome> {
        if !self.enabled {
            return None;
        }

        let mut failed_handlers = dispatch(&mut self.crash_handlers, event, "crash");

        let amount = clamp01(event.impact_force_n / self.config.damage_normalizer())
            * event.severity.damage_weight();
        let damage_applied = damage.apply(amount, event);

        let now = event.timestamp_sec;
        let replay_triggered = event.should_trigger_replay && self.cooldown_elapsed(now);
        if replay_triggered {
            self.last_replay_trigger_time = now;
            self.replays_triggered += 1;
            log::info!(
                "Replay triggered #{} ({} impact, {:.0} N at t={:.2}s)",
                self.replays_triggered,
                event.severity.as_str(),
                event.impact_force_n,
                now
            );
            failed_handlers += dispatch(&mut self.replay_handlers, event, "replay-trigger");
        } else {
            log::debug!(
                "{} impact {:.0} N at t={:.2}s (no replay)",
                event.severity.as_str(),
                event.impact_force_n,
                now
            );
        }

        Some(ImpactOutcome {
            damage_applied,
            replay_triggered,
            failed_handlers,
        })
    }

    /// Wrap a triggering crash with the current replay number
    pub fn replay_event(&self, crash: CrashEvent) -> ReplayTriggerEvent {
        ReplayTriggerEvent {
            crash,
            replay_number: self.replays_triggered,
        }
    }

    /// Feed the current pose to the safe-pose tracker
    pub fn observe_pose(&mut self, pose: &PoseSample, on_ground: bool) {
        self.safe_poses.observe(pose, on_ground);
    }

    pub fn safe_pose(&self) -> Option<&PoseSample> {
        self.safe_poses.safe_pose()
    }

    /// Put the vehicle back at the last safe pose (or `fallback`)
    ///
    /// Damage is left untouched; only `DamageState::clear` resets it.
    pub fn respawn(&mut self, body: &mut dyn VehicleBody, fallback: &PoseSample) -> PoseSample {
        let pose = self.safe_poses.safe_pose().copied().unwrap_or(*fallback);
        body.teleport(pose.position, pose.normalized_orientation());
        log::info!(
            "Respawned at ({:.1}, {:.1}, {:.1})",
            pose.position.x,
            pose.position.y,
            pose.position.z
        );
        pose
    }
}

/// Invoke every handler, isolating failures so one bad handler cannot
/// starve the rest. Returns the number of failures.
fn dispatch(handlers: &mut [(SubscriptionId, CrashHandler)], event: &CrashEvent, list: &str) -> usize {
    let mut failures = 0;
    for (id, handler) in handlers.iter_mut() {
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                failures += 1;
                log::warn!("{} handler {:?} failed: {:#}", list, id, err);
            }
            Err(_) => {
                failures += 1;
                log::warn!("{} handler {:?} panicked", list, id);
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::impact::ImpactKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn event(t: f64, force: f64) -> CrashEvent {
        let config = ImpactConfig::default();
        CrashEvent {
            timestamp_sec: t,
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            impact_force_n: force,
            collision_normal: DVec3::Z,
            severity: config.severity_for(force),
            kind: ImpactKind::Collision,
            forward_velocity_component: 0.0,
            vertical_velocity_component: 0.0,
            should_trigger_replay: force >= config.minor_threshold,
        }
    }

    #[derive(Default)]
    struct Body {
        position: DVec3,
        teleports: u32,
    }

    impl VehicleBody for Body {
        fn teleport(&mut self, position: DVec3, _orientation: DQuat) {
            self.position = position;
            self.teleports += 1;
        }
    }

    #[test]
    fn test_cooldown_gating() {
        let mut orchestrator = CrashOrchestrator::default();
        let mut damage = DamageState::new();
        let triggers = Rc::new(RefCell::new(Vec::new()));
        let crashes = Rc::new(RefCell::new(0));

        {
            let triggers = triggers.clone();
            orchestrator.subscribe_replay_trigger(move |e| {
                triggers.borrow_mut().push(e.timestamp_sec);
                Ok(())
            });
            let crashes = crashes.clone();
            orchestrator.subscribe_crash(move |_| {
                *crashes.borrow_mut() += 1;
                Ok(())
            });
        }

        for t in [0.0, 1.0, 2.5] {
            orchestrator.on_impact(&event(t, 8_000.0), &mut damage);
        }

        assert_eq!(*triggers.borrow(), vec![0.0, 2.5]);
        assert_eq!(*crashes.borrow(), 3);
        assert_eq!(orchestrator.replays_triggered(), 2);
    }

    #[test]
    fn test_minor_damage_scenario() {
        let mut orchestrator = CrashOrchestrator::default();
        let mut damage = DamageState::new();

        let outcome = orchestrator
            .on_impact(&event(0.0, 6_000.0), &mut damage)
            .expect("enabled");

        let normalized = 6_000.0 / (1.5 * MAJOR_IMPACT_THRESHOLD * 2.0);
        assert!((outcome.damage_applied - MINOR_DAMAGE_WEIGHT * normalized).abs() < 1e-12);
        assert!(outcome.replay_triggered);
        assert_eq!(damage.crash_count, 1);
        assert_eq!(damage.history.len(), 1);
    }

    #[test]
    fn test_damage_clamps_and_persists() {
        let mut orchestrator = CrashOrchestrator::default();
        let mut damage = DamageState::new();
        let mut last = 0.0;
        for i in 0..20 {
            orchestrator.on_impact(&event(i as f64 * 3.0, 100_000.0), &mut damage);
            assert!(damage.overall_damage >= last);
            last = damage.overall_damage;
        }
        assert!(damage.overall_damage <= 1.0);
        assert_eq!(damage.history.len(), MAX_COLLISION_HISTORY);
        assert_eq!(damage.crash_count, 20);

        let mut body = Body::default();
        orchestrator.respawn(&mut body, &PoseSample::default());
        assert_eq!(damage.crash_count, 20);
        assert!(damage.overall_damage > 0.0);

        damage.clear();
        assert_eq!(damage.overall_damage, 0.0);
        assert!(damage.history.is_empty());
    }

    #[test]
    fn test_disabled_suppresses_everything() {
        let mut orchestrator = CrashOrchestrator::default();
        let mut damage = DamageState::new();
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        orchestrator.subscribe_crash(move |_| {
            *c.borrow_mut() += 1;
            Ok(())
        });

        orchestrator.set_enabled(false);
        assert!(orchestrator.on_impact(&event(0.0, 20_000.0), &mut damage).is_none());
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(damage.crash_count, 0);

        orchestrator.set_enabled(true);
        assert!(orchestrator.on_impact(&event(0.0, 20_000.0), &mut damage).is_some());
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let mut orchestrator = CrashOrchestrator::default();
        let mut damage = DamageState::new();
        let reached = Rc::new(RefCell::new(false));

        orchestrator.subscribe_crash(|_| anyhow::bail!("speaker unplugged"));
        orchestrator.subscribe_crash(|_| panic!("particle pool exhausted"));
        let r = reached.clone();
        orchestrator.subscribe_crash(move |_| {
            *r.borrow_mut() = true;
            Ok(())
        });

        let outcome = orchestrator
            .on_impact(&event(0.0, 7_000.0), &mut damage)
            .expect("enabled");
        assert!(*reached.borrow());
        assert_eq!(outcome.failed_handlers, 2);
    }

    #[test]
    fn test_unsubscribe() {
        let mut orchestrator = CrashOrchestrator::default();
        let mut damage = DamageState::new();
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        let id = orchestrator.subscribe_replay_trigger(move |_| {
            *c.borrow_mut() += 1;
            Ok(())
        });

        assert!(orchestrator.unsubscribe(id));
        assert!(!orchestrator.unsubscribe(id));
        orchestrator.on_impact(&event(0.0, 7_000.0), &mut damage);
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_respawn_uses_safe_pose() {
        let mut orchestrator = CrashOrchestrator::default();
        let mut body = Body::default();
        let fallback = PoseSample::new(0.0, DVec3::new(-5.0, 0.0, 0.0), DQuat::IDENTITY, 0.0);

        // No safe pose yet: fallback
        let pose = orchestrator.respawn(&mut body, &fallback);
        assert_eq!(pose.position, fallback.position);

        // Calm on the ground long enough
        for i in 0..60 {
            let t = i as f64 / 60.0;
            let p = PoseSample::new(t, DVec3::new(t, 0.0, 0.0), DQuat::IDENTITY, 5.0);
            orchestrator.observe_pose(&p, true);
        }
        let safe = *orchestrator.safe_pose().expect("safe pose");
        assert!(safe.elapsed_time >= SAFE_POSE_DWELL_SECS);

        // Airborne poses never become safe
        let air = PoseSample::new(2.0, DVec3::new(0.0, 30.0, 0.0), DQuat::IDENTITY, 5.0);
        orchestrator.observe_pose(&air, false);
        assert_eq!(orchestrator.safe_pose().map(|p| p.elapsed_time), Some(safe.elapsed_time));

        let pose = orchestrator.respawn(&mut body, &fallback);
        assert_eq!(pose.position, safe.position);
        assert_eq!(body.position, safe.position);
        assert_eq!(body.teleports, 2);
    }
}

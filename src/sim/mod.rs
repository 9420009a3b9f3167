//! Per-tick simulation side of the crash/replay pipeline
//!
//! Everything here runs synchronously once per fixed step:
//! - No allocation in `record`/`classify`
//! - No internal threads or global state
//! - Previous-tick state is owned by `RaceSession`, not the classifier

pub mod crash;
pub mod impact;
pub mod pose;
pub mod ring;
pub mod tick;

pub use crash::{
    CollisionRecord, CrashHandler, CrashOrchestrator, DamageState, ImpactOutcome,
    ReplayTriggerEvent, SafePoseTracker, SubscriptionId, VehicleBody,
};
pub use impact::{
    CrashEvent, ImpactClassifier, ImpactConfig, ImpactInput, ImpactKind, Severity, TickImpacts,
};
pub use pose::{PoseSample, Timestamped};
pub use ring::RingRecorder;
pub use tick::{RacePhase, RaceSession, ReplayClip, TickInput, TickReport};

//! Stack lifecycle orchestration modules.
//!
//! Covers launch/resume decisions and status reconciliation, the dead
//! man's switch that suspends idle stacks, its recovery on startup, and
//! task result normalization.

pub mod dead_mans_switch;
pub mod lifecycle;
pub mod normalizer;
pub mod recovery;

pub use dead_mans_switch::DeadMansSwitch;
pub use lifecycle::{LifecycleOrchestrator, TerminalUrl};
pub use normalizer::normalize;
pub use recovery::rearm_pending_suspends;

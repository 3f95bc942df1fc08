//! Core building blocks for redress.
//!
//! - **Data model**: typed records for observed and goal BIOS/RAID state
//!   ([`types`]).
//! - **Error taxonomy**: one closed enum for every way a run can fail
//!   ([`error`]).
//! - **Convergence state machine**: the shared per-resource state machine
//!   the diff engines wrap ([`machine`]).
//!
//! This crate performs no I/O; the diff engines and the orchestrator live in
//! `redress-reconciler`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod machine;
pub mod types;

pub use error::{Error, Result};
pub use machine::{Action, Convergible, ConvergenceState, Observation, StateMachine};
pub use types::{
    BiosSetting, Goal, GoalVirtualDisk, Job, PendingOperation, PhysicalDisk, PowerState,
    RaidLevel, RaidStatus, VirtualDisk, VirtualDiskSpec,
};

//! Reconciliation of a managed server's BIOS and RAID configuration.
//!
//! Builds on [`redress_core`]'s convergence state machine: the BIOS and
//! RAID diff engines compute change-sets from observed state and a goal,
//! and the [`orchestrator`] drives them to completion over a
//! [`transport::ManagementClient`], rebooting the node where required.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod bios;
pub mod mapper;
pub mod orchestrator;
pub mod raid;
pub mod report;
pub mod snapshot;
pub mod transport;

pub use bios::BiosResource;
pub use mapper::{ControllerGoals, group_by_controller};
pub use orchestrator::{Orchestrator, RunOptions};
pub use raid::RaidResource;
pub use report::{ConvertedDisk, CreatedDisk, DeletedDisk, RunReport};
pub use snapshot::{BmcSnapshot, RecordedCall, SnapshotClient};
pub use transport::{ManagementClient, PowerAction};

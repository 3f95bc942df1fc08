//! The transport collaborator contract.
//!
//! The reconciliation core never speaks the wire protocol itself; it drives
//! an implementation of [`ManagementClient`]. Implementations are expected
//! to be synchronous and blocking, to surface remote failures as
//! [`Error::Transport`](redress_core::Error::Transport) naming the failed
//! operation, and to keep any client-side timeout or retry policy on their
//! side of this seam.

use std::collections::BTreeMap;

use redress_core::{BiosSetting, Job, PhysicalDisk, PowerState, Result, VirtualDisk, VirtualDiskSpec};

/// Power transition requested of the managed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    PowerOn,
    PowerOff,
    Reboot,
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PowerOn => "power-on",
            Self::PowerOff => "power-off",
            Self::Reboot => "reboot",
        };
        f.write_str(name)
    }
}

/// Synchronous client for a remote out-of-band management controller.
///
/// Listing operations return immutable snapshots of remote state; mutating
/// operations stage changes on the controller's pending/job queue. If the
/// underlying client's virtual disk model omits constituent physical disk
/// ids, the implementation must recover them itself (for example from a
/// disk enumeration document) and report
/// [`Error::VirtualDiskLost`](redress_core::Error::VirtualDiskLost) when a
/// previously listed disk cannot be re-located; the reconciliation core
/// never special-cases old and new shapes of observed data.
pub trait ManagementClient {
    /// List all BIOS settings by attribute name.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn list_bios_settings(&mut self) -> Result<BTreeMap<String, BiosSetting>>;

    /// List jobs on the configuration queue that have not finished.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn list_unfinished_jobs(&mut self) -> Result<Vec<Job>>;

    /// List all physical disks across all RAID controllers.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn list_physical_disks(&mut self) -> Result<Vec<PhysicalDisk>>;

    /// List the ids of all RAID controllers.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn list_raid_controllers(&mut self) -> Result<Vec<String>>;

    /// List all virtual disks, including their constituent physical disks.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails;
    /// `Error::VirtualDiskLost` if a listed disk vanishes before its
    /// constituent disks can be resolved.
    fn list_virtual_disks(&mut self) -> Result<Vec<VirtualDisk>>;

    /// Stage BIOS setting changes on the pending set.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn set_bios_settings(&mut self, settings: &BTreeMap<String, String>) -> Result<()>;

    /// Commit pending BIOS changes so the next reboot applies them.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn commit_bios_changes(&mut self) -> Result<()>;

    /// Discard uncommitted pending BIOS changes.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn abandon_bios_changes(&mut self) -> Result<()>;

    /// Convert physical disks on a controller to RAID mode.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn convert_physical_disks(&mut self, controller_id: &str, disk_ids: &[String]) -> Result<()>;

    /// Stage creation of a virtual disk on a controller.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn create_virtual_disk(&mut self, controller_id: &str, spec: &VirtualDiskSpec) -> Result<()>;

    /// Stage deletion of a virtual disk by id.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn delete_virtual_disk(&mut self, disk_id: &str) -> Result<()>;

    /// Commit pending RAID changes for a controller.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn commit_raid_changes(&mut self, controller_id: &str) -> Result<()>;

    /// Discard uncommitted pending RAID changes for a controller.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn abandon_raid_changes(&mut self, controller_id: &str) -> Result<()>;

    /// Read the node's power state.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn power_state(&mut self) -> Result<PowerState>;

    /// Request a power transition.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the remote call fails.
    fn set_power_state(&mut self, action: PowerAction) -> Result<()>;
}

//! Run report returned to the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use redress_core::{RaidLevel, VirtualDiskSpec};

/// A physical disk converted (or to be converted) to RAID mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedDisk {
    pub controller: String,
    pub id: String,
}

/// A virtual disk created (or to be created), with its full geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDisk {
    pub controller: String,
    pub name: String,
    pub raid_level: RaidLevel,
    pub span_length: u32,
    pub span_depth: u32,
    pub physical_disks: Vec<String>,
}

impl CreatedDisk {
    pub(crate) fn from_spec(controller: &str, spec: &VirtualDiskSpec) -> Self {
        Self {
            controller: controller.to_owned(),
            name: spec.name.clone(),
            raid_level: spec.raid_level.clone(),
            span_length: spec.span_length,
            span_depth: spec.span_depth,
            physical_disks: spec.physical_disk_ids.clone(),
        }
    }
}

/// A virtual disk deleted (or to be deleted), by controller id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedDisk {
    pub controller: String,
    pub id: String,
}

/// The outcome of one reconciliation run.
///
/// In check mode this describes what *would* change; otherwise it describes
/// what was changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Whether any resource required (or requires) action.
    pub changed: bool,
    /// BIOS settings that were/are to be changed, mapped to their new values.
    pub changed_bios_settings: BTreeMap<String, String>,
    /// Physical disks converted to RAID mode, per controller.
    pub converted_physical_disks: Vec<ConvertedDisk>,
    /// Virtual disks created, per controller, with full geometry.
    pub created_virtual_disks: Vec<CreatedDisk>,
    /// Virtual disks deleted, per controller, by id.
    pub deleted_virtual_disks: Vec<DeletedDisk>,
    /// Whether a reboot is still outstanding after this run.
    pub reboot_required: bool,
}

//! Snapshot-backed management client.
//!
//! [`BmcSnapshot`] is a serde-loadable capture of everything the transport
//! collaborator can observe on a controller. [`SnapshotClient`] serves
//! queries from such a capture and records mutations instead of executing
//! them, which makes it the client used for check-mode planning from a file
//! and for exercising the orchestrator in tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use redress_core::{
    BiosSetting, Job, PhysicalDisk, PowerState, Result, VirtualDisk, VirtualDiskSpec,
};

use crate::transport::{ManagementClient, PowerAction};

/// Observed controller state, as a loadable document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BmcSnapshot {
    #[serde(default)]
    pub bios_settings: BTreeMap<String, BiosSetting>,
    #[serde(default)]
    pub unfinished_jobs: Vec<Job>,
    #[serde(default)]
    pub physical_disks: Vec<PhysicalDisk>,
    #[serde(default)]
    pub raid_controllers: Vec<String>,
    #[serde(default)]
    pub virtual_disks: Vec<VirtualDisk>,
    #[serde(default)]
    pub power: PowerState,
}

/// A mutation the client was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    SetBiosSettings(BTreeMap<String, String>),
    CommitBiosChanges,
    AbandonBiosChanges,
    ConvertPhysicalDisks {
        controller: String,
        disk_ids: Vec<String>,
    },
    CreateVirtualDisk {
        controller: String,
        spec: VirtualDiskSpec,
    },
    DeleteVirtualDisk {
        id: String,
    },
    CommitRaidChanges {
        controller: String,
    },
    AbandonRaidChanges {
        controller: String,
    },
    SetPowerState(PowerAction),
}

/// [`ManagementClient`] that answers from a snapshot and records mutations.
///
/// A power transition empties the unfinished job queue, the way a real
/// reboot flushes committed jobs; everything else leaves the snapshot
/// untouched.
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    snapshot: BmcSnapshot,
    recorded: Vec<RecordedCall>,
}

impl SnapshotClient {
    pub fn new(snapshot: BmcSnapshot) -> Self {
        Self {
            snapshot,
            recorded: Vec::new(),
        }
    }

    /// The mutations requested so far, in order.
    pub fn recorded(&self) -> &[RecordedCall] {
        &self.recorded
    }

    fn record(&mut self, call: RecordedCall) {
        self.recorded.push(call);
    }
}

impl ManagementClient for SnapshotClient {
    fn list_bios_settings(&mut self) -> Result<BTreeMap<String, BiosSetting>> {
        Ok(self.snapshot.bios_settings.clone())
    }

    fn list_unfinished_jobs(&mut self) -> Result<Vec<Job>> {
        Ok(self.snapshot.unfinished_jobs.clone())
    }

    fn list_physical_disks(&mut self) -> Result<Vec<PhysicalDisk>> {
        Ok(self.snapshot.physical_disks.clone())
    }

    fn list_raid_controllers(&mut self) -> Result<Vec<String>> {
        Ok(self.snapshot.raid_controllers.clone())
    }

    fn list_virtual_disks(&mut self) -> Result<Vec<VirtualDisk>> {
        Ok(self.snapshot.virtual_disks.clone())
    }

    fn set_bios_settings(&mut self, settings: &BTreeMap<String, String>) -> Result<()> {
        self.record(RecordedCall::SetBiosSettings(settings.clone()));
        Ok(())
    }

    fn commit_bios_changes(&mut self) -> Result<()> {
        self.record(RecordedCall::CommitBiosChanges);
        Ok(())
    }

    fn abandon_bios_changes(&mut self) -> Result<()> {
        self.record(RecordedCall::AbandonBiosChanges);
        Ok(())
    }

    fn convert_physical_disks(&mut self, controller_id: &str, disk_ids: &[String]) -> Result<()> {
        self.record(RecordedCall::ConvertPhysicalDisks {
            controller: controller_id.to_owned(),
            disk_ids: disk_ids.to_vec(),
        });
        Ok(())
    }

    fn create_virtual_disk(&mut self, controller_id: &str, spec: &VirtualDiskSpec) -> Result<()> {
        self.record(RecordedCall::CreateVirtualDisk {
            controller: controller_id.to_owned(),
            spec: spec.clone(),
        });
        Ok(())
    }

    fn delete_virtual_disk(&mut self, disk_id: &str) -> Result<()> {
        self.record(RecordedCall::DeleteVirtualDisk {
            id: disk_id.to_owned(),
        });
        Ok(())
    }

    fn commit_raid_changes(&mut self, controller_id: &str) -> Result<()> {
        self.record(RecordedCall::CommitRaidChanges {
            controller: controller_id.to_owned(),
        });
        Ok(())
    }

    fn abandon_raid_changes(&mut self, controller_id: &str) -> Result<()> {
        self.record(RecordedCall::AbandonRaidChanges {
            controller: controller_id.to_owned(),
        });
        Ok(())
    }

    fn power_state(&mut self) -> Result<PowerState> {
        Ok(self.snapshot.power)
    }

    fn set_power_state(&mut self, action: PowerAction) -> Result<()> {
        self.record(RecordedCall::SetPowerState(action));
        // A reboot or power-on flushes the committed job queue.
        if matches!(action, PowerAction::Reboot | PowerAction::PowerOn) {
            self.snapshot.unfinished_jobs.clear();
        }
        match action {
            PowerAction::PowerOn | PowerAction::Reboot => self.snapshot.power = PowerState::On,
            PowerAction::PowerOff => self.snapshot.power = PowerState::Off,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    #[test]
    fn snapshot_parses_from_yaml() {
        let snapshot: BmcSnapshot = serde_yaml::from_str(
            r"
bios_settings:
  NumLock:
    current_value: 'Off'
    pending_value: 'On'
physical_disks:
  - id: Disk.Bay.0
    controller_id: RAID.Integrated.1-1
    size_mb: 571776
    raid_status: raid
raid_controllers:
  - RAID.Integrated.1-1
unfinished_jobs:
  - name: 'ConfigBIOS:BIOS.Setup.1-1'
power: 'on'
",
        )
        .unwrap();
        assert_eq!(snapshot.physical_disks.len(), 1);
        assert!(snapshot.unfinished_jobs[0].is_bios_config());
        assert_eq!(snapshot.power, PowerState::On);
    }

    #[test]
    fn power_transition_flushes_the_job_queue() {
        let mut client = SnapshotClient::new(BmcSnapshot {
            unfinished_jobs: vec![Job::new("ConfigBIOS:BIOS.Setup.1-1")],
            ..BmcSnapshot::default()
        });
        assert_eq!(client.list_unfinished_jobs().unwrap().len(), 1);
        client.set_power_state(PowerAction::Reboot).unwrap();
        assert!(client.list_unfinished_jobs().unwrap().is_empty());
    }
}

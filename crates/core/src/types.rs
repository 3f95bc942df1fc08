//! Observed and goal data model for BMC configuration.
//!
//! Everything here is a plain value type: observed records are immutable
//! snapshots taken once per run, goal records are the caller's declared
//! target. Behaviour lives in the state machine and the diff engines.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A single BIOS attribute as reported by the management controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiosSetting {
    /// Value currently in effect.
    pub current_value: String,
    /// Value queued to take effect, if a change is pending.
    #[serde(default)]
    pub pending_value: Option<String>,
}

impl BiosSetting {
    /// Create a setting with no pending change.
    pub fn new(current_value: impl Into<String>) -> Self {
        Self {
            current_value: current_value.into(),
            pending_value: None,
        }
    }

    /// Create a setting with a pending change queued.
    pub fn with_pending(current_value: impl Into<String>, pending_value: impl Into<String>) -> Self {
        Self {
            current_value: current_value.into(),
            pending_value: Some(pending_value.into()),
        }
    }
}

/// RAID-mode status of a physical disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RaidStatus {
    /// The disk is usable as a virtual disk member.
    Raid,
    /// The disk must be converted before it can join a virtual disk.
    NonRaid,
}

/// A physical disk, scoped to exactly one RAID controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalDisk {
    pub id: String,
    pub controller_id: String,
    pub size_mb: u64,
    pub raid_status: RaidStatus,
}

/// Operation queued against a virtual disk in the controller's pending set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingOperation {
    #[default]
    None,
    Create,
    Delete,
}

impl PendingOperation {
    /// Whether any operation is queued.
    pub fn is_some(self) -> bool {
        self != Self::None
    }
}

/// RAID level as declared by the user or reported by the controller.
///
/// Kept as a string: levels such as `1+0` and `5+0` have no numeric form,
/// and equivalence between goal and observed disks is string equality.
/// Deserialization accepts either a string or an integer, since goal files
/// commonly write `raid_level: 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RaidLevel(String);

impl RaidLevel {
    pub fn new(level: impl Into<String>) -> Self {
        Self(level.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of parity disks consumed per span at this level.
    pub fn parity_disks_per_span(&self) -> u64 {
        match self.0.as_str() {
            "6" | "6+0" => 2,
            "5" | "5+0" => 1,
            _ => 0,
        }
    }

    /// Whether this level mirrors user data across the span rather than
    /// striping it, so span length does not multiply capacity.
    pub fn is_mirrored(&self) -> bool {
        matches!(self.0.as_str(), "1" | "1+0")
    }
}

impl fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RaidLevel {
    fn from(level: &str) -> Self {
        Self(level.to_owned())
    }
}

impl From<String> for RaidLevel {
    fn from(level: String) -> Self {
        Self(level)
    }
}

impl<'de> Deserialize<'de> for RaidLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RaidLevelVisitor;

        impl Visitor<'_> for RaidLevelVisitor {
            type Value = RaidLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a RAID level as a string or integer")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(RaidLevel::new(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(RaidLevel::new(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(RaidLevel::new(value.to_string()))
            }
        }

        deserializer.deserialize_any(RaidLevelVisitor)
    }
}

/// A virtual disk as reported by the management controller.
///
/// `name` is the user-facing identifier used for goal matching. `id` is the
/// controller's own identifier and is what delete operations take; it is
/// derived from the name by the controller but must be treated as distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDisk {
    pub id: String,
    pub name: String,
    pub controller_id: String,
    pub raid_level: RaidLevel,
    pub span_length: u32,
    pub span_depth: u32,
    pub size_mb: u64,
    pub physical_disk_ids: Vec<String>,
    #[serde(default)]
    pub pending_operation: PendingOperation,
}

/// A virtual disk as declared in the goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalVirtualDisk {
    pub name: String,
    pub raid_level: RaidLevel,
    pub span_length: u32,
    pub span_depth: u32,
    pub physical_disk_ids: Vec<String>,
}

/// A creation record sent to the transport collaborator.
///
/// Geometry is copied from the goal; `size_mb` is computed by the RAID diff
/// engine's capacity formula (or copied verbatim when reapplying an
/// abandoned pending create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDiskSpec {
    pub name: String,
    pub raid_level: RaidLevel,
    pub span_length: u32,
    pub span_depth: u32,
    pub size_mb: u64,
    pub physical_disk_ids: Vec<String>,
}

/// A job on the controller's configuration queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Whether this is a committed BIOS configuration job.
    pub fn is_bios_config(&self) -> bool {
        self.name.starts_with("ConfigBIOS")
    }

    /// Whether this is a committed RAID configuration job for the given
    /// controller.
    pub fn is_raid_config(&self, controller_id: &str) -> bool {
        self.name
            .strip_prefix("Config:RAID:")
            .is_some_and(|rest| rest == controller_id)
    }
}

/// Power state of the managed node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    On,
    Off,
}

/// The caller-declared goal state for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// BIOS attribute names mapped to their desired values.
    #[serde(default)]
    pub bios_settings: BTreeMap<String, String>,
    /// Desired virtual disk layout.
    #[serde(default)]
    pub virtual_disks: Vec<GoalVirtualDisk>,
}

impl Goal {
    /// Whether the goal declares nothing at all.
    pub fn is_empty(&self) -> bool {
        self.bios_settings.is_empty() && self.virtual_disks.is_empty()
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
    fn raid_level_accepts_integer_and_string() {
        let from_int: RaidLevel = serde_json::from_str("10").unwrap();
        let from_str: RaidLevel = serde_json::from_str("\"1+0\"").unwrap();
        assert_eq!(from_int.as_str(), "10");
        assert_eq!(from_str.as_str(), "1+0");
        assert_ne!(from_int, from_str);
    }

    #[test]
    fn raid_level_parity_classification() {
        assert_eq!(RaidLevel::from("6").parity_disks_per_span(), 2);
        assert_eq!(RaidLevel::from("6+0").parity_disks_per_span(), 2);
        assert_eq!(RaidLevel::from("5").parity_disks_per_span(), 1);
        assert_eq!(RaidLevel::from("5+0").parity_disks_per_span(), 1);
        assert_eq!(RaidLevel::from("0").parity_disks_per_span(), 0);
        assert!(RaidLevel::from("1").is_mirrored());
        assert!(RaidLevel::from("1+0").is_mirrored());
        assert!(!RaidLevel::from("10").is_mirrored());
    }

    #[test]
    fn job_predicates_match_queue_names() {
        assert!(Job::new("ConfigBIOS:BIOS.Setup.1-1").is_bios_config());
        assert!(!Job::new("Config:RAID:RAID.Integrated.1-1").is_bios_config());

        let raid = Job::new("Config:RAID:RAID.Integrated.1-1");
        assert!(raid.is_raid_config("RAID.Integrated.1-1"));
        assert!(!raid.is_raid_config("RAID.Slot.2-1"));
    }

    #[test]
    fn goal_parses_from_yaml() {
        let goal: Goal = serde_yaml::from_str(
            r"
bios_settings:
  NumLock: 'On'
virtual_disks:
  - name: vol1
    raid_level: 1
    span_length: 2
    span_depth: 1
    physical_disk_ids:
      - Disk.Bay.0
      - Disk.Bay.1
",
        )
        .unwrap();
        assert_eq!(goal.bios_settings.get("NumLock").map(String::as_str), Some("On"));
        assert_eq!(goal.virtual_disks.len(), 1);
        assert_eq!(goal.virtual_disks[0].raid_level.as_str(), "1");
    }
}

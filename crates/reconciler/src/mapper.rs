//! Controller mapper.
//!
//! Groups goal virtual disks by the physical RAID controller that owns
//! their member disks, validating membership and the single-controller
//! constraint before any diffing happens.

use std::collections::BTreeMap;

use itertools::Itertools;

use redress_core::{Error, GoalVirtualDisk, PhysicalDisk, Result};

/// The goal virtual disks owned by one controller, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerGoals {
    pub controller_id: String,
    pub goals: Vec<GoalVirtualDisk>,
}

/// Group goal virtual disks by their owning controller.
///
/// Groups (and the goals inside them) preserve the order in which the
/// caller declared the virtual disks; this affects diagnostic ordering
/// only. A goal re-declaring an existing name replaces the earlier entry.
///
/// # Errors
///
/// - [`Error::InvalidGoal`] if a goal virtual disk has no member disks.
/// - [`Error::UnknownPhysicalDisks`] if a goal references disks the
///   controller does not report, listing every offending disk.
/// - [`Error::DiskSpansControllers`] if a goal's members live on more than
///   one controller.
pub fn group_by_controller(
    goals: &[GoalVirtualDisk],
    physical_disks: &[PhysicalDisk],
) -> Result<Vec<ControllerGoals>> {
    let disk_to_controller: BTreeMap<&str, &str> = physical_disks
        .iter()
        .map(|disk| (disk.id.as_str(), disk.controller_id.as_str()))
        .collect();

    let mut grouped: Vec<ControllerGoals> = Vec::new();
    for goal in goals {
        if goal.physical_disk_ids.is_empty() {
            return Err(Error::invalid_goal(format!(
                "virtual disk '{}' declares no member physical disks",
                goal.name
            )));
        }

        let unknown: Vec<String> = goal
            .physical_disk_ids
            .iter()
            .filter(|id| !disk_to_controller.contains_key(id.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(Error::UnknownPhysicalDisks {
                virtual_disk: goal.name.clone(),
                disk_ids: unknown,
            });
        }

        let controllers: Vec<&str> = goal
            .physical_disk_ids
            .iter()
            .filter_map(|id| disk_to_controller.get(id.as_str()).copied())
            .unique()
            .collect();
        let [controller_id] = controllers.as_slice() else {
            return Err(Error::DiskSpansControllers {
                virtual_disk: goal.name.clone(),
                controllers: goal
                    .physical_disk_ids
                    .iter()
                    .filter_map(|id| {
                        disk_to_controller
                            .get(id.as_str())
                            .map(|controller| (id.clone(), (*controller).to_owned()))
                    })
                    .collect(),
            });
        };

        match grouped
            .iter_mut()
            .find(|group| group.controller_id == *controller_id)
        {
            Some(group) => {
                // A re-declared name replaces the earlier goal entry.
                match group.goals.iter_mut().find(|g| g.name == goal.name) {
                    Some(existing) => *existing = goal.clone(),
                    None => group.goals.push(goal.clone()),
                }
            }
            None => grouped.push(ControllerGoals {
                controller_id: (*controller_id).to_owned(),
                goals: vec![goal.clone()],
            }),
        }
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]

    use redress_core::RaidStatus;

    use super::*;

    fn pdisk(id: &str, controller_id: &str) -> PhysicalDisk {
        PhysicalDisk {
            id: id.to_owned(),
            controller_id: controller_id.to_owned(),
            size_mb: 42,
            raid_status: RaidStatus::Raid,
        }
    }

    fn goal(name: &str, disk_ids: &[&str]) -> GoalVirtualDisk {
        GoalVirtualDisk {
            name: name.to_owned(),
            raid_level: "1".into(),
            span_length: 2,
            span_depth: 1,
            physical_disk_ids: disk_ids.iter().map(|id| (*id).to_owned()).collect(),
        }
    }

    #[test]
    fn groups_preserve_declaration_order() {
        let disks = [
            pdisk("d0", "ctl-a"),
            pdisk("d1", "ctl-a"),
            pdisk("d2", "ctl-b"),
            pdisk("d3", "ctl-b"),
        ];
        let goals = [
            goal("vol1", &["d2", "d3"]),
            goal("vol2", &["d0", "d1"]),
            goal("vol3", &["d2"]),
        ];

        let grouped = group_by_controller(&goals, &disks).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].controller_id, "ctl-b");
        assert_eq!(grouped[0].goals.len(), 2);
        assert_eq!(grouped[0].goals[0].name, "vol1");
        assert_eq!(grouped[0].goals[1].name, "vol3");
        assert_eq!(grouped[1].controller_id, "ctl-a");
        assert_eq!(grouped[1].goals[0].name, "vol2");
    }

    #[test]
    fn unknown_disks_are_all_listed() {
        let disks = [pdisk("d0", "ctl-a")];
        let goals = [goal("vol1", &["d0", "ghost1", "ghost2"])];

        let err = group_by_controller(&goals, &disks).unwrap_err();
        match err {
            Error::UnknownPhysicalDisks {
                virtual_disk,
                disk_ids,
            } => {
                assert_eq!(virtual_disk, "vol1");
                assert_eq!(disk_ids, vec!["ghost1".to_owned(), "ghost2".to_owned()]);
            }
            other => panic!("expected UnknownPhysicalDisks, got {other}"),
        }
    }

    #[test]
    fn spanning_controllers_is_rejected_with_mapping() {
        let disks = [pdisk("d0", "ctl-a"), pdisk("d1", "ctl-b")];
        let goals = [goal("vol1", &["d0", "d1"])];

        let err = group_by_controller(&goals, &disks).unwrap_err();
        match err {
            Error::DiskSpansControllers {
                virtual_disk,
                controllers,
            } => {
                assert_eq!(virtual_disk, "vol1");
                assert_eq!(controllers.get("d0").map(String::as_str), Some("ctl-a"));
                assert_eq!(controllers.get("d1").map(String::as_str), Some("ctl-b"));
            }
            other => panic!("expected DiskSpansControllers, got {other}"),
        }
    }

    #[test]
    fn redeclared_name_replaces_earlier_goal() {
        let disks = [pdisk("d0", "ctl-a"), pdisk("d1", "ctl-a")];
        let goals = [goal("vol1", &["d0"]), goal("vol1", &["d1"])];

        let grouped = group_by_controller(&goals, &disks).unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].goals.len(), 1);
        assert_eq!(grouped[0].goals[0].physical_disk_ids, vec!["d1".to_owned()]);
    }

    #[test]
    fn empty_member_list_is_invalid() {
        let err = group_by_controller(&[goal("vol1", &[])], &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidGoal { .. }));
    }
}

//! End-to-end reconciliation of one controller against one goal.
//!
//! The orchestrator observes remote state once, builds the BIOS resource
//! and one RAID resource per controller with goal disks, plans the reboots
//! the run needs, then drives every resource's state machine by invoking
//! the matching remote operation followed by the matching transition. Up to
//! four reboots may happen in one run; BIOS and RAID changes are applied in
//! separate reboot cycles deliberately (combining them has wedged
//! controller firmware in the field - a fixed policy, not an optimisation
//! target).

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use redress_core::{Convergible, Error, Goal, Job, PowerState, Result};

use crate::bios::BiosResource;
use crate::mapper::group_by_controller;
use crate::raid::RaidResource;
use crate::report::{ConvertedDisk, CreatedDisk, DeletedDisk, RunReport};
use crate::transport::{ManagementClient, PowerAction};

/// Caller knobs for one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Whether the orchestrator may reboot the node to make progress.
    pub allow_reboot: bool,
    /// Compute and report the required changes without mutating anything.
    pub check_mode: bool,
    /// Budget for the job queue to drain after a reboot; zero waits forever.
    pub timeout: Duration,
    /// Delay between job queue polls.
    pub interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            allow_reboot: false,
            check_mode: false,
            timeout: Duration::ZERO,
            interval: Duration::from_secs(5),
        }
    }
}

/// Drives one reconciliation run over a transport client.
#[derive(Debug)]
pub struct Orchestrator<'client, C: ManagementClient> {
    client: &'client mut C,
    options: RunOptions,
}

impl<'client, C: ManagementClient> Orchestrator<'client, C> {
    pub fn new(client: &'client mut C, options: RunOptions) -> Self {
        Self { client, options }
    }

    /// Reconcile the controller towards `goal`.
    ///
    /// # Errors
    ///
    /// Any variant of [`Error`]: validation failures and
    /// [`Error::RebootDisallowed`] are reported before any mutation;
    /// transport failures and timeouts abort mid-run; logic violations
    /// indicate a defect in the reconciliation itself.
    pub fn run(&mut self, goal: &Goal) -> Result<RunReport> {
        let mut bios = self.observe_bios(goal)?;
        let mut raids = self.observe_raids(goal)?;

        let allow_reboot = self.options.allow_reboot;
        let any_incomplete = !bios.machine().is_complete(allow_reboot)
            || raids.iter().any(|raid| !raid.machine().is_complete(allow_reboot));
        let any_converting = raids.iter().any(RaidResource::is_convert_required);
        let any_flushing_and_converting = raids
            .iter()
            .any(|raid| raid.machine().is_flush_required() || raid.is_convert_required());
        let pre_flush_required = (bios.machine().is_flush_required() && !any_converting)
            || any_flushing_and_converting;

        if !allow_reboot && (pre_flush_required || any_converting) {
            return Err(Error::RebootDisallowed);
        }

        // Will the node still need a reboot after we exit?
        let reboot_required = !allow_reboot && any_incomplete;
        let report = build_report(&bios, &raids, any_incomplete, reboot_required);

        if self.options.check_mode {
            info!("check mode: reporting required changes without mutating");
            return Ok(report);
        }
        if !report.changed {
            info!("no BIOS or RAID configuration changes required");
            return Ok(report);
        }

        // Abandon conflicting pending changes first; nothing else can
        // proceed past them.
        if bios.machine().is_abandon_required() {
            info!("abandoning pending BIOS configuration changes");
            self.client.abandon_bios_changes()?;
            bios.handle_abandon()?;
        }
        for raid in &mut raids {
            if raid.machine().is_abandon_required() {
                info!(controller = %raid.controller_id(), "abandoning pending RAID configuration changes");
                self.client.abandon_raid_changes(raid.controller_id())?;
                raid.handle_abandon()?;
            }
        }

        // Reboot #1: flush previously committed configuration.
        if pre_flush_required {
            self.flush()?;
            handle_reboot_all(&mut bios, &mut raids);
        }

        // Convert physical disks to RAID mode, with a controller-level
        // commit. No apply/commit transitions here: conversion alone does
        // not reach the goal state.
        for raid in &raids {
            if raid.is_convert_required() {
                info!(
                    controller = %raid.controller_id(),
                    disks = ?raid.converting(),
                    "converting physical disks to RAID mode"
                );
                self.client
                    .convert_physical_disks(raid.controller_id(), raid.converting())?;
                self.client.commit_raid_changes(raid.controller_id())?;
            }
        }

        // Reboot #2: flush the conversions.
        if any_converting {
            self.flush()?;
            handle_reboot_all(&mut bios, &mut raids);
        }

        if bios.machine().is_apply_required() {
            info!(settings = ?bios.changes().keys().collect::<Vec<_>>(), "applying BIOS settings");
            self.client.set_bios_settings(bios.changes())?;
            bios.machine_mut().handle_apply()?;
        }
        if bios.machine().is_commit_required() {
            info!("committing pending BIOS settings");
            self.client.commit_bios_changes()?;
            bios.machine_mut().handle_commit()?;
        }

        // Reboot #3: apply BIOS changes.
        if allow_reboot && bios.machine().is_reboot_required() {
            self.flush()?;
            handle_reboot_all(&mut bios, &mut raids);
        }

        for raid in &mut raids {
            if raid.machine().is_apply_required() {
                for disk_id in raid.deleting() {
                    info!(controller = %raid.controller_id(), id = %disk_id, "deleting virtual disk");
                    self.client.delete_virtual_disk(disk_id)?;
                }
                for spec in raid.creating() {
                    info!(controller = %raid.controller_id(), name = %spec.name, "creating virtual disk");
                    self.client.create_virtual_disk(raid.controller_id(), spec)?;
                }
                raid.machine_mut().handle_apply()?;
            }
        }
        for raid in &mut raids {
            if raid.machine().is_commit_required() {
                info!(controller = %raid.controller_id(), "committing pending RAID settings");
                self.client.commit_raid_changes(raid.controller_id())?;
                raid.machine_mut().handle_commit()?;
            }
        }

        // Reboot #4: apply RAID changes.
        if allow_reboot && raids.iter().any(|raid| raid.machine().is_reboot_required()) {
            self.flush()?;
            handle_reboot_all(&mut bios, &mut raids);
        }

        // Every resource must now be converged; anything else means an
        // unmodeled pending/committed combination slipped through.
        let still_incomplete = !bios.machine().is_complete(allow_reboot)
            || raids.iter().any(|raid| !raid.machine().is_complete(allow_reboot));
        if still_incomplete {
            let resource_states = std::iter::once(bios.machine())
                .chain(raids.iter().map(Convergible::machine))
                .map(|machine| (machine.name().to_owned(), machine.state()))
                .collect();
            return Err(Error::ConvergenceIncomplete { resource_states });
        }

        Ok(report)
    }

    fn observe_bios(&mut self, goal: &Goal) -> Result<BiosResource> {
        if goal.bios_settings.is_empty() {
            debug!("no BIOS settings requested");
            let mut resource = BiosResource::new(BTreeMap::new(), false);
            resource.process(&BTreeMap::new())?;
            return Ok(resource);
        }

        debug!("checking BIOS settings");
        let settings = self.client.list_bios_settings()?;
        let jobs = self.client.list_unfinished_jobs()?;
        debug!(settings = settings.len(), jobs = jobs.len(), "observed BIOS state");

        let committed_job = jobs.iter().any(Job::is_bios_config);
        let mut resource = BiosResource::new(settings, committed_job);
        resource.process(&goal.bios_settings)?;
        Ok(resource)
    }

    fn observe_raids(&mut self, goal: &Goal) -> Result<Vec<RaidResource>> {
        if goal.virtual_disks.is_empty() {
            debug!("no RAID configuration requested");
            return Ok(Vec::new());
        }

        debug!("checking RAID configuration");
        let pdisks = self.client.list_physical_disks()?;
        let controllers = self.client.list_raid_controllers()?;
        let vdisks = self.client.list_virtual_disks()?;
        let jobs = self.client.list_unfinished_jobs()?;
        debug!(
            physical_disks = pdisks.len(),
            controllers = ?controllers,
            virtual_disks = vdisks.len(),
            "observed RAID inventory"
        );

        let mut resources = Vec::new();
        for group in group_by_controller(&goal.virtual_disks, &pdisks)? {
            let committed_job = jobs.iter().any(|job| job.is_raid_config(&group.controller_id));
            let mut resource = RaidResource::new(
                group.controller_id.clone(),
                pdisks
                    .iter()
                    .filter(|disk| disk.controller_id == group.controller_id)
                    .cloned(),
                vdisks
                    .iter()
                    .filter(|disk| disk.controller_id == group.controller_id)
                    .cloned(),
                committed_job,
            );
            resource.process(&group.goals)?;
            resources.push(resource);
        }
        Ok(resources)
    }

    /// Flush committed pending changes by rebooting, restoring the prior
    /// power state afterwards, and wait for the job queue to drain.
    fn flush(&mut self) -> Result<()> {
        info!("flushing committed configuration by rebooting");
        let previous = self.client.power_state()?;
        let action = if previous == PowerState::Off {
            PowerAction::PowerOn
        } else {
            PowerAction::Reboot
        };
        self.client.set_power_state(action)?;
        self.wait_for_jobs()?;
        if previous == PowerState::Off {
            self.client.set_power_state(PowerAction::PowerOff)?;
        }
        Ok(())
    }

    fn wait_for_jobs(&mut self) -> Result<()> {
        let deadline = if self.options.timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(self.options.timeout)
        };
        loop {
            let jobs = self.client.list_unfinished_jobs()?;
            if jobs.is_empty() {
                debug!("no unfinished jobs");
                return Ok(());
            }
            let names: Vec<String> = jobs.into_iter().map(|job| job.name).collect();
            if deadline.is_some_and(|end| Instant::now() > end) {
                return Err(Error::Timeout {
                    waited: self.options.timeout,
                    unfinished: names,
                });
            }
            debug!(jobs = ?names, "waiting for unfinished jobs to complete");
            thread::sleep(self.options.interval);
        }
    }
}

fn handle_reboot_all(bios: &mut BiosResource, raids: &mut [RaidResource]) {
    bios.machine_mut().handle_reboot();
    for raid in raids.iter_mut() {
        raid.machine_mut().handle_reboot();
    }
}

fn build_report(
    bios: &BiosResource,
    raids: &[RaidResource],
    changed: bool,
    reboot_required: bool,
) -> RunReport {
    RunReport {
        changed,
        changed_bios_settings: bios.changes().clone(),
        converted_physical_disks: raids
            .iter()
            .flat_map(|raid| {
                raid.converting().iter().map(|id| ConvertedDisk {
                    controller: raid.controller_id().to_owned(),
                    id: id.clone(),
                })
            })
            .collect(),
        created_virtual_disks: raids
            .iter()
            .flat_map(|raid| {
                raid.creating()
                    .iter()
                    .map(|spec| CreatedDisk::from_spec(raid.controller_id(), spec))
            })
            .collect(),
        deleted_virtual_disks: raids
            .iter()
            .flat_map(|raid| {
                raid.deleting().iter().map(|id| DeletedDisk {
                    controller: raid.controller_id().to_owned(),
                    id: id.clone(),
                })
            })
            .collect(),
        reboot_required,
    }
}

//! BIOS diff engine.
//!
//! Wraps the convergence state machine around the observed BIOS settings and
//! computes the change-set to send to the transport collaborator.

use std::collections::BTreeMap;

use tracing::debug;

use redress_core::{BiosSetting, Convergible, Error, Observation, Result, StateMachine};

/// Convergible resource covering the BIOS as a whole.
#[derive(Debug, Clone)]
pub struct BiosResource {
    /// Observed settings by attribute name; immutable snapshot for the run.
    settings: BTreeMap<String, BiosSetting>,
    machine: StateMachine,
    /// Names of settings we need to change, mapped to their new values.
    changes: BTreeMap<String, String>,
}

impl BiosResource {
    /// Create the resource from freshly observed settings.
    pub fn new(settings: BTreeMap<String, BiosSetting>, committed_job: bool) -> Self {
        Self {
            settings,
            machine: StateMachine::new("BIOS", committed_job),
            changes: BTreeMap::new(),
        }
    }

    /// Validate the goal and derive the machine state and change-set.
    ///
    /// Validation happens before anything touches the hardware: every goal
    /// name must exist in the observed settings.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSettings`] listing every goal name the controller
    /// does not report.
    pub fn process(&mut self, goal: &BTreeMap<String, String>) -> Result<()> {
        self.validate(goal)?;
        self.machine.observe(self.derive_observation(goal));
        self.compute_changes(goal);
        debug!(
            state = %self.machine.state(),
            changes = self.changes.len(),
            "processed BIOS goal"
        );
        Ok(())
    }

    fn validate(&self, goal: &BTreeMap<String, String>) -> Result<()> {
        let unknown: Vec<String> = goal
            .keys()
            .filter(|name| !self.settings.contains_key(*name))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::UnknownSettings { names: unknown })
        }
    }

    fn derive_observation(&self, goal: &BTreeMap<String, String>) -> Observation {
        let mut observation = Observation::default();
        for (name, goal_value) in goal {
            let Some(setting) = self.settings.get(name) else {
                continue;
            };
            // A pending change that is already correct needs no further
            // action for this name.
            if let Some(pending) = &setting.pending_value {
                if pending == goal_value {
                    observation.pending = true;
                    continue;
                }
                observation.conflicting = true;
            }
            if setting.current_value != *goal_value || setting.pending_value.is_some() {
                observation.changing = true;
            }
        }
        observation
    }

    fn compute_changes(&mut self, goal: &BTreeMap<String, String>) {
        if self.machine.is_abandon_required() {
            // Abandoning discards every pending value, so seed the
            // change-set with all of them and overlay the goal on top:
            // pending work on settings outside the goal is not lost.
            self.changes = self
                .settings
                .iter()
                .filter_map(|(name, setting)| {
                    setting
                        .pending_value
                        .as_ref()
                        .map(|pending| (name.clone(), pending.clone()))
                })
                .collect();
            self.changes
                .extend(goal.iter().map(|(name, value)| (name.clone(), value.clone())));
        } else {
            self.changes = goal
                .iter()
                .filter(|(name, goal_value)| {
                    let Some(setting) = self.settings.get(*name) else {
                        return false;
                    };
                    if setting.pending_value.as_ref() == Some(goal_value) {
                        return false;
                    }
                    setting.current_value != **goal_value || setting.pending_value.is_some()
                })
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
        }
    }

    /// The settings to send to the transport collaborator, possibly empty.
    pub fn changes(&self) -> &BTreeMap<String, String> {
        &self.changes
    }
}

impl Convergible for BiosResource {
    fn is_change_required(&self) -> bool {
        !self.changes.is_empty()
    }

    fn machine(&self) -> &StateMachine {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut StateMachine {
        &mut self.machine
    }
}

//! Convergence state machine shared by every convergible resource.
//!
//! One machine exists per resource per run: one for the BIOS as a whole and
//! one per RAID controller with goal disks. The machine is created from
//! freshly observed state, mutated only through the transition methods here,
//! and discarded at end of run. It tracks which of
//! abandon/apply/commit/reboot is needed next to reach the goal.

use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};

/// Phase of convergence a resource is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvergenceState {
    /// Constructed but not yet derived from observed state.
    Unknown,
    /// Existing uncommitted changes conflict with the goal.
    Conflicting,
    /// Conflicting changes have been abandoned; the goal still needs applying.
    Abandoned,
    /// A committed job exists and further changes are needed; the job must
    /// flush through a reboot before anything else can proceed.
    PreCommitted,
    /// Required changes are neither applied nor committed.
    Uncommitted,
    /// Required changes are applied but not committed.
    Applied,
    /// Required changes are committed, awaiting a reboot to take effect.
    Committed,
    /// Nothing further is required.
    Complete,
}

impl fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Conflicting => "conflicting",
            Self::Abandoned => "abandoned",
            Self::PreCommitted => "pre-committed",
            Self::Uncommitted => "uncommitted",
            Self::Applied => "applied",
            Self::Committed => "committed",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Action that progresses a resource towards its goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Discard existing uncommitted pending changes.
    Abandon,
    /// Send the required changes to the controller's pending set.
    Apply,
    /// Commit applied changes so the next reboot makes them permanent.
    Commit,
    /// Reboot the node, flushing committed pending changes.
    Reboot,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Abandon => "abandon",
            Self::Apply => "apply",
            Self::Commit => "commit",
            Self::Reboot => "reboot",
        };
        f.write_str(name)
    }
}

/// The three booleans a diff engine derives from goal vs. observed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    /// The goal differs from the effective current/pending state.
    pub changing: bool,
    /// A correct change is already pending, uncommitted or committed.
    pub pending: bool,
    /// An existing pending change contradicts the goal.
    pub conflicting: bool,
}

/// Convergence state machine for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    /// Diagnostic label, e.g. `BIOS` or `RAID:RAID.Integrated.1-1`.
    name: String,
    /// Whether a committed-but-unapplied job already existed when the run
    /// started. Fixed at construction.
    committed_job: bool,
    state: ConvergenceState,
}

impl StateMachine {
    /// Create a machine in the [`ConvergenceState::Unknown`] state. The
    /// owning diff engine must call [`observe`](Self::observe) before the
    /// machine is queried.
    pub fn new(name: impl Into<String>, committed_job: bool) -> Self {
        Self {
            name: name.into(),
            committed_job,
            state: ConvergenceState::Unknown,
        }
    }

    /// Diagnostic label for this resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    /// Whether a committed job existed when the run started.
    pub fn committed_job(&self) -> bool {
        self.committed_job
    }

    /// Derive the initial state from the diff engine's observation.
    ///
    /// A committed job can only be cleared by a reboot, so any unresolved
    /// requirement under a committed job waits for one (pre-committed).
    /// Without a committed job, a conflicting uncommitted change must be
    /// abandoned before anything else proceeds.
    pub fn observe(&mut self, observation: Observation) {
        let Observation {
            changing,
            pending,
            conflicting,
        } = observation;
        self.state = if self.committed_job {
            if changing || conflicting {
                ConvergenceState::PreCommitted
            } else if pending {
                ConvergenceState::Committed
            } else {
                ConvergenceState::Complete
            }
        } else if conflicting {
            ConvergenceState::Conflicting
        } else if changing {
            ConvergenceState::Uncommitted
        } else if pending {
            ConvergenceState::Applied
        } else {
            ConvergenceState::Complete
        };
        debug!(
            resource = %self.name,
            state = %self.state,
            changing,
            pending,
            conflicting,
            "derived initial convergence state"
        );
    }

    /// The action required to progress from the current state, or `None`
    /// when the resource is complete (or not yet observed).
    pub fn required_action(&self) -> Option<Action> {
        match self.state {
            ConvergenceState::Uncommitted | ConvergenceState::Abandoned => Some(Action::Apply),
            ConvergenceState::Conflicting => Some(Action::Abandon),
            ConvergenceState::PreCommitted | ConvergenceState::Committed => Some(Action::Reboot),
            ConvergenceState::Applied => Some(Action::Commit),
            ConvergenceState::Complete | ConvergenceState::Unknown => None,
        }
    }

    pub fn is_abandon_required(&self) -> bool {
        self.required_action() == Some(Action::Abandon)
    }

    pub fn is_apply_required(&self) -> bool {
        self.required_action() == Some(Action::Apply)
    }

    pub fn is_commit_required(&self) -> bool {
        self.required_action() == Some(Action::Commit)
    }

    pub fn is_reboot_required(&self) -> bool {
        self.required_action() == Some(Action::Reboot)
    }

    /// Whether a reboot is needed to make progress, as opposed to merely
    /// flushing an already-committed job that completes on its own at end
    /// of run.
    pub fn is_flush_required(&self) -> bool {
        self.is_reboot_required() && self.state != ConvergenceState::Committed
    }

    /// Whether configuration is complete. When the caller has opted out of
    /// rebooting, a committed resource counts as done for this run even
    /// though a reboot will eventually be needed.
    pub fn is_complete(&self, include_reboot: bool) -> bool {
        match self.state {
            ConvergenceState::Complete => true,
            ConvergenceState::Committed => !include_reboot,
            _ => false,
        }
    }

    /// Handle an abandon action. Valid only from the conflicting state.
    ///
    /// `change_required` is the owning resource's answer to "is any change
    /// still required now that pending work is discarded"; it decides
    /// whether we land in abandoned or straight in complete.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] if invoked from any other state; the
    /// state is left unchanged.
    pub fn handle_abandon(&mut self, change_required: bool) -> Result<()> {
        self.check_transition(Action::Abandon, &[ConvergenceState::Conflicting])?;
        self.enter(if change_required {
            ConvergenceState::Abandoned
        } else {
            ConvergenceState::Complete
        });
        Ok(())
    }

    /// Handle an apply action. Valid from uncommitted or abandoned.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] if invoked from any other state; the
    /// state is left unchanged.
    pub fn handle_apply(&mut self) -> Result<()> {
        self.check_transition(
            Action::Apply,
            &[ConvergenceState::Uncommitted, ConvergenceState::Abandoned],
        )?;
        self.enter(ConvergenceState::Applied);
        Ok(())
    }

    /// Handle a commit action. Valid only from applied.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] if invoked from any other state; the
    /// state is left unchanged.
    pub fn handle_commit(&mut self) -> Result<()> {
        self.check_transition(Action::Commit, &[ConvergenceState::Applied])?;
        self.enter(ConvergenceState::Committed);
        Ok(())
    }

    /// Handle a reboot. Valid in every state: committed changes flush to
    /// complete, a pre-committed resource becomes plain uncommitted, and
    /// everything else is untouched.
    pub fn handle_reboot(&mut self) {
        match self.state {
            ConvergenceState::Committed => self.enter(ConvergenceState::Complete),
            ConvergenceState::PreCommitted => self.enter(ConvergenceState::Uncommitted),
            _ => {}
        }
    }

    fn enter(&mut self, state: ConvergenceState) {
        debug!(resource = %self.name, from = %self.state, to = %state, "state transition");
        self.state = state;
    }

    fn check_transition(&self, action: Action, allowed: &[ConvergenceState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                resource: self.name.clone(),
                action,
                state: self.state,
                allowed: allowed.to_vec(),
            })
        }
    }
}

/// A resource the orchestrator can converge.
///
/// Both concrete resource kinds hold a [`StateMachine`] value and answer
/// whether any change is still required; the machine consults that answer
/// when an abandon lands.
pub trait Convergible {
    /// Whether any changes still need to be applied to reach the goal.
    fn is_change_required(&self) -> bool;

    fn machine(&self) -> &StateMachine;

    fn machine_mut(&mut self) -> &mut StateMachine;

    /// Abandon conflicting pending changes, consulting
    /// [`is_change_required`](Self::is_change_required) for the landing
    /// state.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] if the resource is not in the
    /// conflicting state.
    fn handle_abandon(&mut self) -> Result<()> {
        let change_required = self.is_change_required();
        self.machine_mut().handle_abandon(change_required)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    fn machine_in(state: ConvergenceState, committed_job: bool) -> StateMachine {
        let mut machine = StateMachine::new("test", committed_job);
        // Drive the machine into the requested state through observe, since
        // tests have no other way to set it.
        let observation = match state {
            ConvergenceState::Unknown => return machine,
            ConvergenceState::Conflicting | ConvergenceState::PreCommitted => Observation {
                changing: true,
                pending: false,
                conflicting: true,
            },
            ConvergenceState::Uncommitted => Observation {
                changing: true,
                ..Observation::default()
            },
            ConvergenceState::Applied | ConvergenceState::Committed => Observation {
                pending: true,
                ..Observation::default()
            },
            ConvergenceState::Complete => Observation::default(),
            ConvergenceState::Abandoned => {
                machine.observe(Observation {
                    changing: true,
                    pending: false,
                    conflicting: true,
                });
                machine.handle_abandon(true).unwrap();
                return machine;
            }
        };
        machine.observe(observation);
        assert_eq!(machine.state(), state);
        machine
    }

    #[test]
    fn no_observation_yields_complete_regardless_of_committed_job() {
        for committed_job in [false, true] {
            let mut machine = StateMachine::new("test", committed_job);
            machine.observe(Observation::default());
            assert_eq!(machine.state(), ConvergenceState::Complete);
            assert_eq!(machine.required_action(), None);
        }
    }

    #[test]
    fn initial_state_derivation_without_committed_job() {
        let cases = [
            ((true, false, false), ConvergenceState::Uncommitted),
            ((false, true, false), ConvergenceState::Applied),
            ((true, false, true), ConvergenceState::Conflicting),
            ((false, false, true), ConvergenceState::Conflicting),
            ((true, true, false), ConvergenceState::Uncommitted),
        ];
        for ((changing, pending, conflicting), expected) in cases {
            let mut machine = StateMachine::new("test", false);
            machine.observe(Observation {
                changing,
                pending,
                conflicting,
            });
            assert_eq!(machine.state(), expected, "changing={changing} pending={pending} conflicting={conflicting}");
        }
    }

    #[test]
    fn initial_state_derivation_with_committed_job() {
        let cases = [
            ((true, false, false), ConvergenceState::PreCommitted),
            ((false, false, true), ConvergenceState::PreCommitted),
            ((false, true, false), ConvergenceState::Committed),
        ];
        for ((changing, pending, conflicting), expected) in cases {
            let mut machine = StateMachine::new("test", true);
            machine.observe(Observation {
                changing,
                pending,
                conflicting,
            });
            assert_eq!(machine.state(), expected, "changing={changing} pending={pending} conflicting={conflicting}");
        }
    }

    #[test]
    fn required_actions_follow_the_table() {
        let cases = [
            (ConvergenceState::Uncommitted, Some(Action::Apply)),
            (ConvergenceState::Conflicting, Some(Action::Abandon)),
            (ConvergenceState::Abandoned, Some(Action::Apply)),
            (ConvergenceState::PreCommitted, Some(Action::Reboot)),
            (ConvergenceState::Applied, Some(Action::Commit)),
            (ConvergenceState::Committed, Some(Action::Reboot)),
            (ConvergenceState::Complete, None),
        ];
        for (state, expected) in cases {
            let committed_job = matches!(
                state,
                ConvergenceState::PreCommitted | ConvergenceState::Committed
            );
            let machine = machine_in(state, committed_job);
            assert_eq!(machine.required_action(), expected, "state={state}");
        }
    }

    #[test]
    fn abandon_lands_in_abandoned_or_complete() {
        let mut machine = machine_in(ConvergenceState::Conflicting, false);
        machine.handle_abandon(true).unwrap();
        assert_eq!(machine.state(), ConvergenceState::Abandoned);

        let mut machine = machine_in(ConvergenceState::Conflicting, false);
        machine.handle_abandon(false).unwrap();
        assert_eq!(machine.state(), ConvergenceState::Complete);
    }

    #[test]
    fn apply_then_commit_then_reboot_completes() {
        let mut machine = machine_in(ConvergenceState::Uncommitted, false);
        machine.handle_apply().unwrap();
        assert_eq!(machine.state(), ConvergenceState::Applied);
        machine.handle_commit().unwrap();
        assert_eq!(machine.state(), ConvergenceState::Committed);
        machine.handle_reboot();
        assert_eq!(machine.state(), ConvergenceState::Complete);
    }

    #[test]
    fn reboot_resolves_pre_committed_to_uncommitted() {
        let mut machine = machine_in(ConvergenceState::PreCommitted, true);
        machine.handle_reboot();
        assert_eq!(machine.state(), ConvergenceState::Uncommitted);
    }

    #[test]
    fn reboot_elsewhere_is_a_no_op() {
        for state in [
            ConvergenceState::Unknown,
            ConvergenceState::Conflicting,
            ConvergenceState::Uncommitted,
            ConvergenceState::Applied,
            ConvergenceState::Complete,
        ] {
            let mut machine = machine_in(state, false);
            machine.handle_reboot();
            assert_eq!(machine.state(), state, "state={state}");
        }
    }

    #[test]
    fn invalid_transition_is_a_logic_error_and_preserves_state() {
        let mut machine = machine_in(ConvergenceState::Complete, false);
        let err = machine.handle_apply().unwrap_err();
        assert!(err.is_logic_error());
        assert_eq!(machine.state(), ConvergenceState::Complete);

        let mut machine = machine_in(ConvergenceState::Uncommitted, false);
        let err = machine.handle_commit().unwrap_err();
        assert!(err.is_logic_error());
        assert_eq!(machine.state(), ConvergenceState::Uncommitted);

        let mut machine = machine_in(ConvergenceState::Applied, false);
        let err = machine.handle_abandon(true).unwrap_err();
        assert!(err.is_logic_error());
        assert_eq!(machine.state(), ConvergenceState::Applied);
    }

    #[test]
    fn flush_required_excludes_committed() {
        let machine = machine_in(ConvergenceState::Committed, true);
        assert!(machine.is_reboot_required());
        assert!(!machine.is_flush_required());

        let machine = machine_in(ConvergenceState::PreCommitted, true);
        assert!(machine.is_reboot_required());
        assert!(machine.is_flush_required());
    }

    #[test]
    fn committed_counts_as_complete_without_reboot() {
        let machine = machine_in(ConvergenceState::Committed, true);
        assert!(machine.is_complete(false));
        assert!(!machine.is_complete(true));

        let machine = machine_in(ConvergenceState::Complete, false);
        assert!(machine.is_complete(true));
        assert!(machine.is_complete(false));
    }
}

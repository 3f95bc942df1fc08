//! Closed error taxonomy for a reconciliation run.
//!
//! Every failure aborts the whole run; nothing is retried here. The
//! variants map one-to-one onto the failure classes the caller must tell
//! apart: bad input, remote failure, timeout, an external actor interfering,
//! a goal unreachable under the caller's constraints, and logic violations
//! that indicate a defect in the reconciliation itself.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::machine::{Action, ConvergenceState};

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciliation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Goal names one or more BIOS settings the controller does not report.
    #[error("BIOS settings do not exist: {}", names.join(", "))]
    UnknownSettings { names: Vec<String> },

    /// A goal entry is structurally invalid.
    #[error("invalid goal: {reason}")]
    InvalidGoal { reason: String },

    /// A goal virtual disk references physical disks the controller does
    /// not report.
    #[error(
        "goal virtual disk '{virtual_disk}' references unreported physical disks: {}",
        disk_ids.join(", ")
    )]
    UnknownPhysicalDisks {
        virtual_disk: String,
        disk_ids: Vec<String>,
    },

    /// A goal virtual disk's members live on more than one controller.
    #[error(
        "goal virtual disk '{virtual_disk}' spans multiple controllers: {}",
        format_disk_controllers(controllers)
    )]
    DiskSpansControllers {
        virtual_disk: String,
        /// Member disk id mapped to the controller that owns it.
        controllers: BTreeMap<String, String>,
    },

    /// A remote call failed. Retries, if any, belong to the transport
    /// collaborator; this layer reports and aborts.
    #[error("transport operation '{operation}' failed: {reason}")]
    Transport { operation: String, reason: String },

    /// The job queue did not drain within the caller's budget.
    #[error(
        "timed out after {}s waiting for jobs to complete: {}",
        waited.as_secs(),
        unfinished.join(", ")
    )]
    Timeout {
        waited: Duration,
        unfinished: Vec<String>,
    },

    /// A previously reported virtual disk is no longer reported; an
    /// external actor (for example an unexpected reboot) interfered.
    #[error("virtual disk '{id}' is no longer reported by the controller")]
    VirtualDiskLost { id: String },

    /// The goal cannot be reached without a reboot, and the caller
    /// disallowed rebooting. Reported before any mutation.
    #[error(
        "the requested configuration requires a reboot to apply, \
         but rebooting was disallowed"
    )]
    RebootDisallowed,

    /// A state machine transition was invoked from a disallowed state.
    /// This is a defect in the reconciliation logic, never expected in
    /// correct operation.
    #[error(
        "logic error: resource '{resource}' cannot handle action {action} \
         in state {state} (allowed: {})",
        format_states(allowed)
    )]
    InvalidTransition {
        resource: String,
        action: Action,
        state: ConvergenceState,
        allowed: Vec<ConvergenceState>,
    },

    /// Resources were not fully converged at end of run despite no reported
    /// failure. Indicates an unmodeled pending/committed combination.
    #[error(
        "logic error: configuration incomplete at end of run: {}",
        resource_states.iter().map(|(name, state)| format!("{name}={state}")).collect::<Vec<_>>().join(", ")
    )]
    ConvergenceIncomplete {
        resource_states: Vec<(String, ConvergenceState)>,
    },
}

impl Error {
    /// Wrap a transport collaborator failure, naming the failed operation.
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-goal error.
    pub fn invalid_goal(reason: impl Into<String>) -> Self {
        Self::InvalidGoal {
            reason: reason.into(),
        }
    }

    /// Whether this error is a logic violation rather than a runtime
    /// failure. Logic violations are defects; a test suite should treat any
    /// occurrence as a bug.
    pub fn is_logic_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::ConvergenceIncomplete { .. }
        )
    }
}

fn format_states(states: &[ConvergenceState]) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_disk_controllers(controllers: &BTreeMap<String, String>) -> String {
    controllers
        .iter()
        .map(|(disk, controller)| format!("{disk} -> {controller}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn unknown_settings_lists_all_names() {
        let err = Error::UnknownSettings {
            names: vec!["ProcTurbo".into(), "NumLock".into()],
        };
        let message = err.to_string();
        assert!(message.contains("ProcTurbo"));
        assert!(message.contains("NumLock"));
    }

    #[test]
    fn logic_errors_are_classified() {
        let err = Error::ConvergenceIncomplete {
            resource_states: vec![("BIOS".into(), ConvergenceState::Applied)],
        };
        assert!(err.is_logic_error());
        assert!(!Error::RebootDisallowed.is_logic_error());
        assert!(!Error::transport("list_jobs", "connection refused").is_logic_error());
    }

    #[test]
    fn timeout_names_unfinished_jobs() {
        let err = Error::Timeout {
            waited: Duration::from_secs(600),
            unfinished: vec!["ConfigBIOS:BIOS.Setup.1-1".into()],
        };
        let message = err.to_string();
        assert!(message.contains("600"));
        assert!(message.contains("ConfigBIOS:BIOS.Setup.1-1"));
    }
}

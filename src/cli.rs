//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Redress - BIOS and RAID reconciliation for managed servers
#[derive(Parser, Debug)]
#[command(name = "redress")]
#[command(version)]
#[command(about = "Reconcile a server's BIOS and RAID configuration against a goal")]
#[command(
    long_about = "Redress diffs a goal document against a capture of a management \
controller's observed state and reports the BIOS changes, disk conversions, and \
virtual disk operations required to converge, including the reboots the run would need."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan the changes a goal requires against a controller snapshot
    Plan {
        /// Goal document (YAML or JSON)
        #[arg(short, long)]
        goal: PathBuf,

        /// Controller state snapshot (YAML or JSON)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Plan as if the run may reboot the node
        #[arg(long, default_value_t = false)]
        allow_reboot: bool,
    },

    /// Validate a goal document without planning anything
    Validate {
        /// Goal document (YAML or JSON)
        #[arg(short, long)]
        goal: PathBuf,
    },
}

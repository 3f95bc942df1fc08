//! Entry point for the redress CLI.
//!
//! The binary works offline: both subcommands read documents from disk and
//! never talk to a management controller directly. `plan` runs the
//! orchestrator in check mode against a snapshot-backed client and prints
//! the resulting report as JSON.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use redress_core::Goal;
use redress_reconciler::{BmcSnapshot, Orchestrator, RunOptions, SnapshotClient};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Plan {
            goal,
            snapshot,
            allow_reboot,
        } => plan(&goal, &snapshot, allow_reboot),
        Commands::Validate { goal } => validate(&goal),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn plan(goal_path: &Path, snapshot_path: &Path, allow_reboot: bool) -> Result<()> {
    let goal: Goal = load_document(goal_path).context("failed to load goal document")?;
    let snapshot: BmcSnapshot =
        load_document(snapshot_path).context("failed to load controller snapshot")?;

    let options = RunOptions {
        allow_reboot,
        check_mode: true,
        ..RunOptions::default()
    };
    let mut client = SnapshotClient::new(snapshot);
    let report = Orchestrator::new(&mut client, options)
        .run(&goal)
        .context("planning failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn validate(goal_path: &Path) -> Result<()> {
    let goal: Goal = load_document(goal_path).context("failed to load goal document")?;
    info!(
        bios_settings = goal.bios_settings.len(),
        virtual_disks = goal.virtual_disks.len(),
        "goal document is valid"
    );
    println!(
        "ok: {} BIOS settings, {} virtual disks",
        goal.bios_settings.len(),
        goal.virtual_disks.len()
    );
    Ok(())
}

/// Load a YAML or JSON document, picking the parser by file extension.
fn load_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {} as JSON", path.display()))
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse {} as YAML", path.display()))
    }
}

//! `corral pause` / `corral unpause` — Freezer-based suspension.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `pause` command.
#[derive(Args, Debug)]
pub struct PauseArgs {
    /// Container id.
    pub id: String,
}

/// Arguments for the `unpause` command.
#[derive(Args, Debug)]
pub struct UnpauseArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `pause` command.
///
/// # Errors
///
/// Returns an error if the container is not running or the freezer
/// rejects the write.
pub fn execute_pause(supervisor: &Supervisor, args: PauseArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    supervisor.pause(&id)?;
    println!("Container paused: {id}");
    Ok(())
}

/// Executes the `unpause` command.
///
/// # Errors
///
/// Returns an error if the container is not paused.
pub fn execute_unpause(supervisor: &Supervisor, args: UnpauseArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    supervisor.unpause(&id)?;
    println!("Container unpaused: {id}");
    Ok(())
}

//! `corral restart` — Stop (if needed) and start a container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::{RunOutcome, Supervisor};

/// Arguments for the `restart` command.
#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `restart` command.
///
/// # Errors
///
/// Returns an error if the container was never started or a phase fails.
pub fn execute(supervisor: &Supervisor, args: RestartArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    match supervisor.restart(&id)? {
        RunOutcome::Detached { pid } => {
            println!("Container restarted: {id} (pid {pid})");
        }
        RunOutcome::Exited { code } => {
            println!("Container {id} exited with code {code}");
        }
    }
    Ok(())
}

//! `corral start` — Start an existing container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::{RunOutcome, Supervisor};

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if the container is missing, not startable, or the
/// launch fails.
pub fn execute(supervisor: &Supervisor, args: StartArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    match supervisor.start(&id)? {
        RunOutcome::Detached { pid } => {
            println!("Container started: {id} (pid {pid})");
        }
        RunOutcome::Exited { code } => {
            println!("Container {id} exited with code {code}");
        }
    }
    Ok(())
}

//! `corral run` — Create and start a container in one step.

use clap::Args;
use corral_runtime::supervisor::{RunOutcome, Supervisor};

use crate::commands::create::ContainerArgs;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Container configuration.
    #[command(flatten)]
    pub config: ContainerArgs,
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if validation, persistence, or the launch fails.
pub fn execute(supervisor: &Supervisor, args: RunArgs) -> anyhow::Result<()> {
    let record = args.config.into_record()?;
    let id = record.id.clone();

    match supervisor.run(record)? {
        RunOutcome::Detached { pid } => {
            println!("Container started: {id} (pid {pid})");
        }
        RunOutcome::Exited { code } => {
            println!("Container {id} exited with code {code}");
        }
    }
    Ok(())
}

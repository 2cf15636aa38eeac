//! `corral init` — Hidden re-exec entry point for the container init
//! process.
//!
//! Invoked only by the launcher via `/proc/self/exe`, inside the fresh
//! namespaces. Loads the record from the state store and runs the
//! isolation pipeline; on success this process becomes the payload.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the hidden `init` subcommand.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Container id whose record drives the pipeline.
    #[arg(long)]
    pub id: String,
}

/// Executes the isolation pipeline. Does not return on success.
///
/// # Errors
///
/// Returns the pipeline failure; the process exits non-zero and the
/// supervisor records the container as exited.
pub fn execute(supervisor: &Supervisor, args: InitArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    let never = corral_runtime::init::run(supervisor.store(), &id)?;
    match never {}
}

//! `corral stop` — Stop a running container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container id.
    pub id: String,

    /// Send SIGKILL immediately instead of SIGTERM first.
    #[arg(long)]
    pub force: bool,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container is not running or the process
/// outlives the kill deadline.
pub fn execute(supervisor: &Supervisor, args: StopArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    supervisor.stop(&id, args.force)?;
    println!("Container stopped: {id}");
    Ok(())
}

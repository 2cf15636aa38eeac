//! `corral rm` — Remove a container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `rm` command.
///
/// # Errors
///
/// Returns an error if the container is running or paused.
pub fn execute(supervisor: &Supervisor, args: RmArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    supervisor.remove(&id)?;
    println!("Container removed: {id}");
    Ok(())
}

//! `corral update` — Update a container's resource limits.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `update` command.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Container id.
    pub id: String,

    /// New memory limit in cgroup units.
    #[arg(long)]
    pub memory: Option<String>,

    /// New CPU shares.
    #[arg(long)]
    pub cpu: Option<String>,

    /// New process limit.
    #[arg(long)]
    pub pids: Option<u32>,
}

/// Executes the `update` command.
///
/// # Errors
///
/// Returns an error if the container is missing or a cgroup write fails.
pub fn execute(supervisor: &Supervisor, args: UpdateArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    supervisor.update(&id, args.memory, args.cpu, args.pids)?;
    println!("Container {id} resources updated");
    Ok(())
}

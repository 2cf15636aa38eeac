//! `corral logs` — View a container's captured output.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container has no captured logs.
pub fn execute(supervisor: &Supervisor, args: LogsArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    let (stdout, stderr) = supervisor.logs(&id)?;

    println!("=== STDOUT ===");
    println!("{stdout}");
    println!("=== STDERR ===");
    println!("{stderr}");
    Ok(())
}

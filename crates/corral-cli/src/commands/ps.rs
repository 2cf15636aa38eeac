//! `corral ps` — List containers.

use clap::Args;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (default shows only running).
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read. Corrupt
/// record files are skipped with a warning, never fatal.
pub fn execute(supervisor: &Supervisor, args: PsArgs) -> anyhow::Result<()> {
    let records = supervisor.list()?;
    let filtered: Vec<_> = records
        .into_iter()
        .filter(|r| args.all || r.status == corral_common::types::ContainerStatus::Running)
        .collect();

    if filtered.is_empty() {
        println!("No containers found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<8} {:<26} {:<30}",
        "CONTAINER ID", "STATUS", "PID", "CREATED", "COMMAND"
    );
    for record in &filtered {
        let mut command = record.command.join(" ");
        if command.len() > 30 {
            command.truncate(27);
            command.push_str("...");
        }
        println!(
            "{:<38} {:<10} {:<8} {:<26} {:<30}",
            record.id, record.status, record.pid, record.created_at, command
        );
    }
    Ok(())
}

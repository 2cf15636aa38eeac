//! `corral exec` / `corral shell` — Run commands inside a container.

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container id.
    pub id: String,

    /// Command to execute inside the container.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments for the `shell` command.
#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Container id.
    pub id: String,
}

/// Executes the `exec` command, propagating the inner exit code.
///
/// # Errors
///
/// Returns an error if the container is not running or the namespace
/// entry fails.
pub fn execute_exec(supervisor: &Supervisor, args: ExecArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    let code = supervisor.exec(&id, &args.command)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Executes the `shell` command (`/bin/bash`, falling back to `/bin/sh`).
///
/// # Errors
///
/// Returns an error if the container is not running or no shell can be
/// started.
pub fn execute_shell(supervisor: &Supervisor, args: ShellArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    let code = supervisor.shell(&id)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

//! CLI command definitions and dispatch.

pub mod commit;
pub mod create;
pub mod exec;
pub mod init;
pub mod logs;
pub mod pause;
pub mod ps;
pub mod restart;
pub mod rm;
pub mod run;
pub mod start;
pub mod stop;
pub mod update;
pub mod volume;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use corral_runtime::state::StateStore;
use corral_runtime::supervisor::Supervisor;

/// Corral — daemon-less Linux container runtime.
#[derive(Parser, Debug)]
#[command(name = "corral", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the state directory.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a container without starting it.
    Create(create::CreateArgs),
    /// Create and start a container in one step.
    Run(run::RunArgs),
    /// Start an existing container.
    Start(start::StartArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Stop (if needed) and start a container.
    Restart(restart::RestartArgs),
    /// Freeze a running container.
    Pause(pause::PauseArgs),
    /// Thaw a paused container.
    Unpause(pause::UnpauseArgs),
    /// Execute a command inside a running container.
    Exec(exec::ExecArgs),
    /// Start an interactive shell inside a running container.
    Shell(exec::ShellArgs),
    /// View a container's captured stdout/stderr.
    Logs(logs::LogsArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Remove a stopped container.
    Rm(rm::RmArgs),
    /// Commit a container's filesystem to a named image.
    Commit(commit::CommitArgs),
    /// Update a container's resource limits.
    Update(update::UpdateArgs),
    /// Bind-mount a host path into a running container.
    VolumeAdd(volume::VolumeAddArgs),
    /// Unmount a volume from a running container.
    VolumeRemove(volume::VolumeRemoveArgs),
    /// Container init entry point (used by the re-exec launcher).
    #[command(hide = true)]
    Init(init::InitArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let store = match cli.state_dir {
        Some(dir) => StateStore::open(dir)?,
        None => StateStore::open_default(),
    };
    let supervisor = Supervisor::new(store);

    match cli.command {
        Command::Create(args) => create::execute(&supervisor, args),
        Command::Run(args) => run::execute(&supervisor, args),
        Command::Start(args) => start::execute(&supervisor, args),
        Command::Stop(args) => stop::execute(&supervisor, args),
        Command::Restart(args) => restart::execute(&supervisor, args),
        Command::Pause(args) => pause::execute_pause(&supervisor, args),
        Command::Unpause(args) => pause::execute_unpause(&supervisor, args),
        Command::Exec(args) => exec::execute_exec(&supervisor, args),
        Command::Shell(args) => exec::execute_shell(&supervisor, args),
        Command::Logs(args) => logs::execute(&supervisor, args),
        Command::Ps(args) => ps::execute(&supervisor, args),
        Command::Rm(args) => rm::execute(&supervisor, args),
        Command::Commit(args) => commit::execute(&supervisor, args),
        Command::Update(args) => update::execute(&supervisor, args),
        Command::VolumeAdd(args) => volume::execute_add(&supervisor, args),
        Command::VolumeRemove(args) => volume::execute_remove(&supervisor, args),
        Command::Init(args) => init::execute(&supervisor, args),
    }
}

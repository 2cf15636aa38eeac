//! `corral volume-add` / `corral volume-remove` — Live volume changes.

use std::path::PathBuf;

use clap::Args;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `volume-add` command.
#[derive(Args, Debug)]
pub struct VolumeAddArgs {
    /// Container id.
    pub id: String,

    /// Host path to bind from.
    pub host_path: PathBuf,

    /// Destination path inside the container.
    pub container_path: PathBuf,

    /// Mount read-only.
    #[arg(long)]
    pub ro: bool,
}

/// Arguments for the `volume-remove` command.
#[derive(Args, Debug)]
pub struct VolumeRemoveArgs {
    /// Container id.
    pub id: String,

    /// Mounted path inside the container.
    pub container_path: PathBuf,
}

/// Executes the `volume-add` command.
///
/// # Errors
///
/// Returns an error if the container is not running or the mount fails.
pub fn execute_add(supervisor: &Supervisor, args: VolumeAddArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    supervisor.volume_add(&id, &args.host_path, &args.container_path, args.ro)?;
    println!(
        "Volume added to container {id}: {} -> {}",
        args.host_path.display(),
        args.container_path.display()
    );
    Ok(())
}

/// Executes the `volume-remove` command.
///
/// # Errors
///
/// Returns an error if no volume is mounted at the path.
pub fn execute_remove(supervisor: &Supervisor, args: VolumeRemoveArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    supervisor.volume_remove(&id, &args.container_path)?;
    println!(
        "Volume removed from container {id}: {}",
        args.container_path.display()
    );
    Ok(())
}

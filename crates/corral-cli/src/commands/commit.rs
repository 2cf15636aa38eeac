//! `corral commit` — Snapshot a container's filesystem as an image.

use std::path::PathBuf;

use clap::Args;
use corral_common::constants::IMAGE_DIR;
use corral_common::types::ContainerId;
use corral_runtime::supervisor::Supervisor;

/// Arguments for the `commit` command.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Container id.
    pub id: String,

    /// Name of the image to create.
    pub image: String,

    /// Image store directory.
    #[arg(long, default_value = IMAGE_DIR)]
    pub image_root: PathBuf,
}

/// Executes the `commit` command.
///
/// # Errors
///
/// Returns an error if the tarball or metadata cannot be written.
pub fn execute(supervisor: &Supervisor, args: CommitArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    let image_dir = supervisor.commit(&id, &args.image, &args.image_root)?;
    println!(
        "Container {id} committed to image: {} ({})",
        args.image,
        image_dir.display()
    );
    Ok(())
}

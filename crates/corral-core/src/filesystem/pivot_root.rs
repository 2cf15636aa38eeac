//! Rootfs switching for the init process.
//!
//! Makes the container rootfs the real root mount of the new mount
//! namespace: the host's `/` is first made private so nothing propagates
//! back, the rootfs is turned into its own mount point, `pivot_root(2)`
//! swaps the two, and the old root is lazily detached before a fresh
//! `proc` goes in. `chroot` is not involved at any point: the old tree
//! must become unreachable, not merely hidden.

use std::path::Path;

use corral_common::error::{CorralError, Result};
use nix::mount::{mount, umount2, MntFlags, MsFlags};

/// Directory inside the new root that briefly holds the old root.
const PUT_OLD: &str = ".old_root";

/// Switches the process root to `new_root` and mounts `/proc` there.
///
/// Performs the full pivot sequence:
/// 1. Recursively remount `/` as private so the pivot cannot propagate
///    back to the host.
/// 2. Bind-mount `new_root` onto itself (`pivot_root` requires the new
///    root to be a mount point distinct from the old one).
/// 3. Create the `put_old` directory inside `new_root`.
/// 4. Call `pivot_root(2)` and chdir to the new `/`.
/// 5. Lazily detach and remove the old root.
/// 6. Mount `proc` at `/proc`.
///
/// Must only run inside a fresh mount namespace.
///
/// # Errors
///
/// Returns an error if any mount, pivot, or cleanup step fails.
pub fn setup_rootfs(new_root: &Path) -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| CorralError::Kernel {
        op: "remount / private",
        source: e,
    })?;

    mount(
        Some(new_root),
        new_root,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| CorralError::Kernel {
        op: "bind rootfs",
        source: e,
    })?;

    let put_old = new_root.join(PUT_OLD);
    std::fs::create_dir_all(&put_old).map_err(|e| CorralError::Io {
        path: put_old.clone(),
        source: e,
    })?;

    nix::unistd::pivot_root(new_root, &put_old).map_err(|e| CorralError::Kernel {
        op: "pivot_root",
        source: e,
    })?;

    std::env::set_current_dir("/").map_err(|e| CorralError::Io {
        path: "/".into(),
        source: e,
    })?;

    let old_root = Path::new("/").join(PUT_OLD);
    umount2(&old_root, MntFlags::MNT_DETACH).map_err(|e| CorralError::Kernel {
        op: "detach old root",
        source: e,
    })?;
    let _ = std::fs::remove_dir(&old_root);

    mount_proc()?;

    tracing::info!(root = %new_root.display(), "rootfs pivot complete");
    Ok(())
}

/// Mounts a fresh `proc` instance at `/proc` of the current root.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the mount fails.
pub fn mount_proc() -> Result<()> {
    let proc_dir = Path::new("/proc");
    std::fs::create_dir_all(proc_dir).map_err(|e| CorralError::Io {
        path: proc_dir.into(),
        source: e,
    })?;
    mount(
        Some("proc"),
        proc_dir,
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| CorralError::Kernel {
        op: "mount proc",
        source: e,
    })?;
    Ok(())
}

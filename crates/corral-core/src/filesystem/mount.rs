//! Ordered bind mounts into the container root.

use corral_common::error::{CorralError, Result};
use corral_common::types::Mount;
use nix::mount::{mount, umount2, MntFlags, MsFlags};

/// Applies the user-provided bind mounts in order.
///
/// For each mount the destination directory is created inside the current
/// (already pivoted) root, the source is bind-mounted onto it, and
/// read-only entries get the extra `MS_REMOUNT | MS_RDONLY` pass — a bind
/// mount ignores `MS_RDONLY` on the initial call.
///
/// # Errors
///
/// Returns an error on the first mount that fails; the caller aborts the
/// pipeline and lets teardown unwind whatever was already mounted.
pub fn apply_bind_mounts(mounts: &[Mount]) -> Result<()> {
    for entry in mounts {
        std::fs::create_dir_all(&entry.destination).map_err(|e| CorralError::Io {
            path: entry.destination.clone(),
            source: e,
        })?;

        mount(
            Some(&entry.source),
            &entry.destination,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|e| CorralError::Kernel {
            op: "bind mount",
            source: e,
        })?;

        if entry.read_only {
            mount(
                None::<&str>,
                &entry.destination,
                None::<&str>,
                MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                None::<&str>,
            )
            .map_err(|e| CorralError::Kernel {
                op: "remount read-only",
                source: e,
            })?;
        }

        tracing::debug!(
            source = %entry.source.display(),
            destination = %entry.destination.display(),
            read_only = entry.read_only,
            "bind mount applied"
        );
    }
    Ok(())
}

/// Unmounts the user bind mounts in reverse order.
///
/// The destinations are container-internal paths, so the caller must
/// already be inside the container's mount namespace (the supervisor
/// dispatches this through a forked child that joins it). Failures are
/// logged and skipped; teardown never fails the outer operation.
pub fn release_bind_mounts(mounts: &[Mount]) {
    for entry in mounts.iter().rev() {
        if let Err(e) = umount2(&entry.destination, MntFlags::empty()) {
            tracing::warn!(
                destination = %entry.destination.display(),
                error = %e,
                "bind unmount failed, skipping"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn apply_creates_destinations_and_release_unwinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("source");
        std::fs::create_dir_all(&source).expect("mkdir source");
        std::fs::write(source.join("marker"), "here").expect("write marker");

        let destination = dir.path().join("destination");
        let mounts = [Mount {
            source,
            destination: destination.clone(),
            read_only: false,
        }];

        // Unprivileged callers get a kernel refusal on the mount itself,
        // but only after the destination directory has been created.
        let applied = apply_bind_mounts(&mounts);
        assert!(destination.is_dir(), "destination created before mounting");
        if applied.is_ok() {
            assert!(destination.join("marker").exists());
        }

        release_bind_mounts(&mounts);
        if applied.is_ok() {
            assert!(
                !destination.join("marker").exists(),
                "bind released in teardown"
            );
        }
    }

    #[test]
    fn release_skips_targets_that_are_not_mounted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mounts = [
            Mount {
                source: PathBuf::from("/nonexistent/source"),
                destination: dir.path().join("never-mounted"),
                read_only: true,
            },
            Mount {
                source: PathBuf::from("/another/source"),
                destination: PathBuf::from("/no/such/destination"),
                read_only: false,
            },
        ];
        // Nothing was ever mounted; every unmount fails and is skipped.
        release_bind_mounts(&mounts);
    }

    #[test]
    fn release_of_empty_mount_list_is_a_no_op() {
        release_bind_mounts(&[]);
    }
}

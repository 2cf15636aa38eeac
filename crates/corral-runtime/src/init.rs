//! The isolation pipeline, run inside the cloned init process.
//!
//! Fixed order; any failure aborts the container and the supervisor
//! records it as exited. Everything here mutates process-wide state
//! (hostname, mounts, capabilities, identity, environment), which is why
//! none of it may ever run in the supervisor.

use std::convert::Infallible;
use std::ffi::CString;

use corral_common::constants::CONTAINER_HOSTNAME;
use corral_common::error::{CorralError, Result};
use corral_common::types::ContainerId;
use corral_core::cgroup::CgroupManager;
use corral_core::filesystem::{mount, overlayfs, pivot_root};
use corral_core::{capability, namespace, user};

use crate::state::{ContainerRecord, StateStore};

/// Runs the pipeline and execs the payload. Never returns on success:
/// after the final step this process *is* the payload.
///
/// 1. Hostname.
/// 2. Rootfs (bind-pivot, or overlay when layers are configured).
/// 3. Capability policy.
/// 4. User bind mounts.
/// 5. Cgroup setup and self-attach.
/// 6. User/group switch.
/// 7. Environment.
/// 8. Optional stdio redirect into log files.
/// 9. Optional resource-stats task.
/// 10. Exec.
///
/// # Errors
///
/// Returns the first pipeline failure; the caller exits non-zero.
pub fn run(store: &StateStore, id: &ContainerId) -> Result<Infallible> {
    let record = store.load(id)?;
    tracing::info!(id = %record.id, "isolation pipeline starting");

    namespace::set_hostname(CONTAINER_HOSTNAME)?;

    if record.layers.is_empty() {
        pivot_root::setup_rootfs(&record.root_dir)?;
    } else {
        let overlay = overlayfs::rootfs_overlay(
            record.layers.clone(),
            &record.root_dir,
            &std::env::temp_dir(),
        );
        overlayfs::mount_overlay(&overlay)?;
        pivot_root::setup_rootfs(&overlay.merged_dir)?;
    }

    capability::apply_policy(&record.capabilities)?;

    mount::apply_bind_mounts(&record.mounts)?;

    let cgroups = CgroupManager::new(&record.id);
    cgroups.setup(&record.limits)?;
    cgroups.attach_all(std::process::id())?;

    if let Some(spec) = user::parse(&record.user)? {
        user::switch(&spec)?;
    }

    for (key, value) in &record.env {
        std::env::set_var(key, value);
    }

    if let Some(log_dir) = &record.log.dir {
        crate::logs::redirect_stdio(log_dir)?;
    }

    if record.monitor.enabled {
        // The handle is deliberately not stopped: exec replaces the whole
        // process image, thread included.
        let _ = crate::monitor::spawn(
            &record.monitor,
            cgroups.slug().to_string(),
            record.log.dir.as_deref(),
        )?;
    }

    exec_payload(&record)
}

/// Replaces this process with the payload (or a shell in interactive
/// mode).
///
/// # Errors
///
/// Returns an error if the command is empty or no exec succeeds.
fn exec_payload(record: &ContainerRecord) -> Result<Infallible> {
    if record.interactive {
        for shell in ["/bin/bash", "/bin/sh"] {
            let argv = [c_string(shell)?];
            let _ = nix::unistd::execv(&argv[0], &argv);
        }
        return Err(CorralError::NotFound {
            kind: "shell",
            id: "/bin/bash, /bin/sh".into(),
        });
    }

    if record.command.is_empty() {
        return Err(CorralError::InvalidArgument {
            message: "container has no command to execute".into(),
        });
    }

    let argv: Vec<CString> = record
        .command
        .iter()
        .map(|a| c_string(a))
        .collect::<Result<_>>()?;

    tracing::info!(cmd = ?record.command, "exec'ing payload");
    match nix::unistd::execvp(&argv[0], &argv) {
        Ok(infallible) => match infallible {},
        Err(e) => Err(CorralError::Kernel {
            op: "execvp",
            source: e,
        }),
    }
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| CorralError::InvalidArgument {
        message: format!("argument contains NUL byte: {s}"),
    })
}

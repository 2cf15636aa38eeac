//! Spawning the container init process.
//!
//! The child is created with `clone(2)` carrying all six namespace flags
//! and immediately blocks on a pipe. The supervisor then writes the
//! UID/GID maps and performs the network hand-off by PID, and only after
//! that releases the child, which re-execs this binary in `init` mode.
//! The config does not travel over the pipe: the record was persisted
//! before launch and init loads it from the state store by id.

use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::path::Path;

use corral_common::error::{CorralError, Result};
use corral_core::namespace::{self, NamespaceConfig};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::network;
use crate::state::ContainerRecord;

/// Stack size for the cloned child. It only reads one byte and execs.
const STACK_SIZE: usize = 1024 * 1024;

/// Builds the re-exec argv for init mode.
#[must_use]
pub fn init_argv(id: &str, state_dir: &Path) -> Vec<String> {
    vec![
        "/proc/self/exe".to_string(),
        "init".to_string(),
        "--id".to_string(),
        id.to_string(),
        "--state-dir".to_string(),
        state_dir.display().to_string(),
    ]
}

/// Clones the init process for a container and returns its PID.
///
/// On return the child has been released past its sync barrier with its
/// UID/GID maps written and (when configured) its network namespace
/// wired. If any setup step fails the child is killed and reaped before
/// the error propagates.
///
/// # Errors
///
/// Returns an error if the pipe, clone, map write, or network wiring
/// fails.
pub fn spawn(record: &ContainerRecord, state_dir: &Path) -> Result<u32> {
    let argv: Vec<CString> = init_argv(record.id.as_str(), state_dir)
        .into_iter()
        .map(|a| {
            CString::new(a.clone()).map_err(|_| CorralError::InvalidArgument {
                message: format!("argument contains NUL byte: {a}"),
            })
        })
        .collect::<Result<_>>()?;
    let exe = argv[0].clone();

    let (sync_rx, sync_tx) = nix::unistd::pipe().map_err(|e| CorralError::Kernel {
        op: "pipe",
        source: e,
    })?;
    let rx_fd = sync_rx.as_raw_fd();

    let mut stack = vec![0u8; STACK_SIZE];
    let flags = NamespaceConfig::default().clone_flags();

    let cb = Box::new(move || -> isize {
        // Block until the supervisor has written the id maps and wired
        // the network; proceeding earlier would run init unmapped.
        let mut buf = [0u8; 1];
        loop {
            // SAFETY: rx_fd is a valid inherited pipe read end.
            let rc = unsafe { libc::read(rx_fd, buf.as_mut_ptr().cast(), 1) };
            // Retry on EINTR; EOF means the supervisor is gone and the
            // pending SIGKILL will land either way.
            if rc >= 0 {
                break;
            }
        }
        let _ = nix::unistd::execv(&exe, &argv);
        127
    });

    // SAFETY: the child callback only reads from an inherited fd and
    // execs; it does not touch parent-owned locks or destructors.
    let pid = unsafe { nix::sched::clone(cb, &mut stack, flags, Some(libc::SIGCHLD)) }.map_err(
        |e| CorralError::Kernel {
            op: "clone",
            source: e,
        },
    )?;
    let child = pid.as_raw() as u32;
    tracing::info!(id = %record.id, pid = child, "init process cloned");

    let setup = || -> Result<()> {
        namespace::write_id_maps(
            child,
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
        )?;
        network::setup(child, &record.network)?;
        nix::unistd::write(&sync_tx, &[1u8]).map_err(|e| CorralError::Kernel {
            op: "sync write",
            source: e,
        })?;
        Ok(())
    };

    if let Err(e) = setup() {
        // The child is still parked on the pipe; do not leave it behind.
        let _ = kill(pid, Signal::SIGKILL);
        let _ = waitpid(pid, None);
        return Err(e);
    }

    Ok(child)
}

/// Waits for a direct child init process and returns its exit code
/// (128 + signal for a signalled child).
///
/// # Errors
///
/// Returns an error if `waitpid` fails.
pub fn wait(pid: u32) -> Result<i32> {
    match waitpid(Pid::from_raw(pid as i32), None).map_err(|e| CorralError::Kernel {
        op: "waitpid",
        source: e,
    })? {
        WaitStatus::Exited(_, code) => Ok(code),
        WaitStatus::Signaled(_, signal, _) => Ok(128 + signal as i32),
        other => {
            tracing::warn!(status = ?other, "unexpected wait status");
            Ok(-1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_argv_reexecs_self_in_init_mode() {
        let argv = init_argv("c1", Path::new("/var/run/corral"));
        assert_eq!(
            argv,
            vec![
                "/proc/self/exe",
                "init",
                "--id",
                "c1",
                "--state-dir",
                "/var/run/corral",
            ]
        );
    }
}

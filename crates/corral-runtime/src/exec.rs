//! Running commands inside a live container's namespaces.
//!
//! The nsenter-equivalent: open the target's namespace fds, `setns` into
//! them from a forked child, and exec there. Forking first keeps the
//! supervisor process pristine — `setns` mutates the whole process and
//! cannot be undone — and is required for the PID namespace anyway,
//! which only applies to children created after the join.

use std::ffi::CString;

use corral_common::error::{CorralError, Result};
use corral_core::namespace::{self, NsKind, EXEC_NAMESPACES};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::state::ContainerRecord;

/// Executes `command` inside all five joinable namespaces of a running
/// container, wiring the caller's stdio through. Returns the command's
/// exit code.
///
/// # Errors
///
/// Returns `InvalidArgument` for an empty command, `InvalidState` if the
/// container is not running, or the underlying namespace/fork error.
pub fn run_in_container(record: &ContainerRecord, command: &[String]) -> Result<i32> {
    if command.is_empty() {
        return Err(CorralError::InvalidArgument {
            message: "exec command is empty".into(),
        });
    }
    record.ensure_status(&[corral_common::types::ContainerStatus::Running], "exec")?;

    tracing::info!(id = %record.id, pid = record.pid, cmd = ?command, "exec into container");
    run_command_in(record.pid, EXEC_NAMESPACES, command)
}

/// Forks, joins the given namespaces of `pid` in the child, and execs
/// `argv` there. The parent waits and returns the child's exit code
/// (128 + signal for a signalled child).
///
/// # Errors
///
/// Returns an error if the argv cannot be converted, or fork/waitpid
/// fails. Exec and setns failures inside the child surface as exit code
/// 126.
pub fn run_command_in(pid: u32, kinds: &[NsKind], argv: &[String]) -> Result<i32> {
    let c_argv: Vec<CString> = argv
        .iter()
        .map(|a| {
            CString::new(a.as_str()).map_err(|_| CorralError::InvalidArgument {
                message: format!("argument contains NUL byte: {a}"),
            })
        })
        .collect::<Result<_>>()?;

    run_task_in(pid, kinds, move || {
        match nix::unistd::execvp(&c_argv[0], &c_argv) {
            Ok(infallible) => match infallible {},
            Err(_) => 126,
        }
    })
}

/// Forks, joins the given namespaces of `pid` in the child, and runs
/// `task` there. The parent waits and returns the child's exit code.
///
/// Used when the work is Rust code rather than an external binary, e.g.
/// unwinding a container's bind mounts from inside its mount namespace.
///
/// # Errors
///
/// Returns an error if fork or waitpid fails. Namespace-entry failures
/// inside the child surface as exit code 126.
pub fn run_task_in(pid: u32, kinds: &[NsKind], task: impl FnOnce() -> i32) -> Result<i32> {
    // SAFETY: the child only calls setns, the task, and _exit.
    match unsafe { fork() }.map_err(|e| CorralError::Kernel {
        op: "fork",
        source: e,
    })? {
        ForkResult::Child => {
            let code = match namespace::enter(pid, kinds) {
                Ok(()) => task(),
                Err(_) => 126,
            };
            // SAFETY: _exit never returns and skips parent-owned atexit state.
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => wait_exit_code(child),
    }
}

fn wait_exit_code(child: Pid) -> Result<i32> {
    match waitpid(child, None).map_err(|e| CorralError::Kernel {
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
    use corral_common::types::{ContainerId, ContainerStatus};
    use std::path::PathBuf;

    fn running_record() -> ContainerRecord {
        let mut rec = ContainerRecord::new(
            ContainerId::new("c1"),
            vec!["/bin/true".into()],
            PathBuf::from("/srv/rootfs"),
        );
        rec.mark_running(std::process::id());
        rec
    }

    #[test]
    fn empty_command_rejected() {
        let rec = running_record();
        let err = run_in_container(&rec, &[]).unwrap_err();
        assert!(matches!(err, CorralError::InvalidArgument { .. }));
    }

    #[test]
    fn exec_requires_running_status() {
        let mut rec = running_record();
        rec.mark_down(ContainerStatus::Stopped);
        let err = run_in_container(&rec, &["/bin/true".into()]).unwrap_err();
        assert!(matches!(err, CorralError::InvalidState { .. }));
    }

    #[test]
    fn nul_byte_in_argv_rejected() {
        let err = run_command_in(1, &[], &["bad\0arg".into()]).unwrap_err();
        assert!(matches!(err, CorralError::InvalidArgument { .. }));
    }
}

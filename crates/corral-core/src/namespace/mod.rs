//! Linux namespace management for container isolation.
//!
//! Covers the three namespace interactions the runtime needs: assembling
//! `clone(2)` flags for a new container, writing UID/GID map files for a
//! freshly cloned child, and joining a running container's namespaces via
//! `setns(2)`.

use std::fs::File;
use std::path::PathBuf;

use corral_common::error::{CorralError, Result};
use nix::sched::{setns, CloneFlags};

/// Configuration for which namespaces a new container gets.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
    /// Isolate user namespace.
    pub user: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            network: true,
            user: true,
            ipc: true,
            uts: true,
        }
    }
}

impl NamespaceConfig {
    /// Assembles the `clone(2)` flag set for this configuration.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.ipc {
            flags |= CloneFlags::CLONE_NEWIPC;
        }
        if self.user {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        flags
    }
}

/// One joinable namespace of a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsKind {
    /// Hostname and domain name.
    Uts,
    /// System V IPC objects.
    Ipc,
    /// Network interfaces, routes, and firewall rules.
    Net,
    /// Process IDs (joined by the next child, not the caller).
    Pid,
    /// Mount table.
    Mnt,
}

impl NsKind {
    /// File name under `/proc/<pid>/ns/`.
    #[must_use]
    pub fn proc_name(self) -> &'static str {
        match self {
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Net => "net",
            Self::Pid => "pid",
            Self::Mnt => "mnt",
        }
    }

    fn setns_flag(self) -> CloneFlags {
        match self {
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Net => CloneFlags::CLONE_NEWNET,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Mnt => CloneFlags::CLONE_NEWNS,
        }
    }

    /// Namespace fd path for a target process.
    #[must_use]
    pub fn proc_path(self, pid: u32) -> PathBuf {
        PathBuf::from(format!("/proc/{pid}/ns/{}", self.proc_name()))
    }
}

/// The namespaces `exec` joins, in join order.
///
/// The mount namespace comes last: once the caller's mount table changes,
/// `/proc/<pid>/ns/*` paths from the old root may no longer resolve, so
/// every fd is opened before the first `setns` call regardless.
pub const EXEC_NAMESPACES: &[NsKind] = &[
    NsKind::Uts,
    NsKind::Ipc,
    NsKind::Net,
    NsKind::Pid,
    NsKind::Mnt,
];

/// Joins the given namespaces of a running process.
///
/// All namespace fds are opened before the first join. Joining the PID
/// namespace does not move the caller itself; only children forked
/// afterwards land in it.
///
/// # Errors
///
/// Returns `NotFound` if the target process (or one of its namespace
/// files) is gone, or a kernel error if a `setns` call is rejected.
pub fn enter(pid: u32, kinds: &[NsKind]) -> Result<()> {
    let mut handles = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let path = kind.proc_path(pid);
        let file = File::open(&path).map_err(|_| CorralError::NotFound {
            kind: "namespace",
            id: path.display().to_string(),
        })?;
        handles.push((*kind, file));
    }

    for (kind, file) in handles {
        setns(&file, kind.setns_flag()).map_err(|e| CorralError::Kernel {
            op: "setns",
            source: e,
        })?;
        tracing::debug!(pid, ns = kind.proc_name(), "namespace joined");
    }
    Ok(())
}

/// Sets the hostname inside the UTS namespace.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| CorralError::Kernel {
        op: "sethostname",
        source: e,
    })?;
    tracing::debug!(hostname, "hostname set");
    Ok(())
}

/// Writes the UID/GID map files of a freshly cloned child.
///
/// Maps container id 0 to the caller's ids with a range of one, so the
/// container "root" is the unprivileged caller on the host. `setgroups`
/// must be denied before an unprivileged writer may touch `gid_map`.
///
/// # Errors
///
/// Returns an error if any of the `/proc/<pid>/` map files cannot be
/// written.
pub fn write_id_maps(pid: u32, host_uid: u32, host_gid: u32) -> Result<()> {
    let write = |file: &str, content: String| -> Result<()> {
        let path = PathBuf::from(format!("/proc/{pid}/{file}"));
        std::fs::write(&path, content).map_err(|e| CorralError::Io { path, source: e })
    };

    write("uid_map", format!("0 {host_uid} 1"))?;
    write("setgroups", "deny".to_string())?;
    write("gid_map", format!("0 {host_gid} 1"))?;

    tracing::debug!(pid, host_uid, host_gid, "uid/gid maps written");
    Ok(())
}

//! The lifecycle state machine.
//!
//! Every CLI command maps to one method here. The supervisor composes
//! the state store, launcher, network wirer, and exec helper; it never
//! mutates process-wide state itself, so a failed command leaves the
//! invoking process pristine.
//!
//! Legal transitions: `created → running ⇄ paused`, `running → stopped`,
//! `stopped/exited → running`, any non-running status → removed.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use corral_common::constants::STOP_TIMEOUT_SECS;
use corral_common::error::{CorralError, Result};
use corral_common::types::{ContainerId, ContainerStatus, Mount};
use corral_core::cgroup::CgroupManager;
use corral_core::filesystem::mount;
use corral_core::namespace::NsKind;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

use crate::state::{ContainerRecord, StateStore};
use crate::{exec, image, launcher, logs, network};

/// Result of a start or run command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Container left running in the background.
    Detached {
        /// PID of the init process.
        pid: u32,
    },
    /// Foreground container ran to completion.
    Exited {
        /// Exit code of the payload.
        code: i32,
    },
}

/// Orchestrates lifecycle commands against one state store.
#[derive(Debug)]
pub struct Supervisor {
    store: StateStore,
}

impl Supervisor {
    /// Creates a supervisor over the given store.
    #[must_use]
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// The underlying state store.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// `create` — persists a new record without starting it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the id is already taken.
    pub fn create(&self, record: ContainerRecord) -> Result<ContainerId> {
        if self.store.exists(&record.id) {
            return Err(CorralError::InvalidArgument {
                message: format!("container {} already exists", record.id),
            });
        }
        self.store.save(&record)?;
        tracing::info!(id = %record.id, "container created");
        Ok(record.id)
    }

    /// `run` — create and start in one step.
    ///
    /// # Errors
    ///
    /// Propagates create and start errors.
    pub fn run(&self, record: ContainerRecord) -> Result<RunOutcome> {
        let id = self.create(record)?;
        self.start(&id)
    }

    /// `start` — launches the init process for an existing record.
    ///
    /// For a detached record this returns as soon as the PID is recorded;
    /// otherwise it waits for the payload to exit, tears down, and marks
    /// the record exited.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the status is created, stopped, or
    /// exited, `InvalidArgument` for an empty command, or launch errors.
    pub fn start(&self, id: &ContainerId) -> Result<RunOutcome> {
        let detached = {
            let _lock = self.store.lock(id)?;
            let mut record = self.store.load(id)?;
            record.ensure_status(
                &[
                    ContainerStatus::Created,
                    ContainerStatus::Stopped,
                    ContainerStatus::Exited,
                ],
                "start",
            )?;
            if record.command.is_empty() && !record.interactive {
                return Err(CorralError::InvalidArgument {
                    message: format!("container {id} has no command to start"),
                });
            }

            let pid = launcher::spawn(&record, self.store.dir())?;
            record.mark_running(pid);
            self.store.save(&record)?;
            tracing::info!(id = %id, pid, "container started");
            record.detached
        };

        let record = self.store.load(id)?;
        if detached {
            return Ok(RunOutcome::Detached { pid: record.pid });
        }

        let code = launcher::wait(record.pid)?;
        self.teardown_runtime(record.pid, &record);
        self.store.update_locked(id, |r| {
            r.mark_down(ContainerStatus::Exited);
            Ok(())
        })?;
        tracing::info!(id = %id, code, "container exited");
        Ok(RunOutcome::Exited { code })
    }

    /// `stop` — signals the init process and waits for it to vanish.
    ///
    /// Sends SIGTERM (SIGKILL with `force`), polls process existence via
    /// `kill(pid, 0)` against a 10-second deadline, escalates to SIGKILL
    /// once if not forced, then cleans up network and cgroups and marks
    /// the record stopped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless running, or `Timeout` if the process
    /// survives the escalation deadline.
    pub fn stop(&self, id: &ContainerId, force: bool) -> Result<()> {
        let _lock = self.store.lock(id)?;
        let mut record = self.store.load(id)?;
        record.ensure_status(&[ContainerStatus::Running], "stop")?;

        let pid = record.pid;
        let first = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        signal_process(pid, first)?;

        if !wait_for_exit(pid, STOP_TIMEOUT_SECS) {
            if force {
                return Err(CorralError::Timeout {
                    op: "stop",
                    secs: STOP_TIMEOUT_SECS,
                });
            }
            tracing::warn!(id = %id, pid, "no exit after SIGTERM, escalating to SIGKILL");
            signal_process(pid, Signal::SIGKILL)?;
            if !wait_for_exit(pid, STOP_TIMEOUT_SECS) {
                return Err(CorralError::Timeout {
                    op: "stop",
                    secs: STOP_TIMEOUT_SECS,
                });
            }
        }

        self.teardown_runtime(pid, &record);
        record.mark_down(ContainerStatus::Stopped);
        self.store.save(&record)?;
        tracing::info!(id = %id, "container stopped");
        Ok(())
    }

    /// `pause` — freezes the container via the freezer cgroup.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless running.
    pub fn pause(&self, id: &ContainerId) -> Result<()> {
        self.store.update_locked(id, |record| {
            record.ensure_status(&[ContainerStatus::Running], "pause")?;
            CgroupManager::new(&record.id).freeze(record.pid)?;
            record.status = ContainerStatus::Paused;
            Ok(())
        })?;
        tracing::info!(id = %id, "container paused");
        Ok(())
    }

    /// `unpause` — thaws a paused container. PID is preserved.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless paused.
    pub fn unpause(&self, id: &ContainerId) -> Result<()> {
        self.store.update_locked(id, |record| {
            record.ensure_status(&[ContainerStatus::Paused], "unpause")?;
            CgroupManager::new(&record.id).thaw()?;
            record.status = ContainerStatus::Running;
            Ok(())
        })?;
        tracing::info!(id = %id, "container unpaused");
        Ok(())
    }

    /// `restart` — stop (after unpausing if needed) then start.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for created or exited containers.
    pub fn restart(&self, id: &ContainerId) -> Result<RunOutcome> {
        let record = self.store.load(id)?;
        match record.status {
            ContainerStatus::Running => self.stop(id, false)?,
            ContainerStatus::Paused => {
                self.unpause(id)?;
                self.stop(id, false)?;
            }
            ContainerStatus::Stopped => {}
            ContainerStatus::Created | ContainerStatus::Exited => {
                return Err(CorralError::InvalidState {
                    id: id.to_string(),
                    status: record.status.to_string(),
                    op: "restart",
                })
            }
        }
        self.start(id)
    }

    /// `exec` — runs a command inside the container's namespaces.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless running.
    pub fn exec(&self, id: &ContainerId, command: &[String]) -> Result<i32> {
        let record = self.store.load(id)?;
        exec::run_in_container(&record, command)
    }

    /// `shell` — interactive shell via exec, bash falling back to sh.
    ///
    /// # Errors
    ///
    /// Propagates exec errors.
    pub fn shell(&self, id: &ContainerId) -> Result<i32> {
        let code = self.exec(id, &["/bin/bash".to_string()])?;
        if code == 126 {
            // bash missing from the rootfs; exit 126 marks an exec failure.
            return self.exec(id, &["/bin/sh".to_string()]);
        }
        Ok(code)
    }

    /// `logs` — returns the captured stdout and stderr streams.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when logging was never configured or captured.
    pub fn logs(&self, id: &ContainerId) -> Result<(String, String)> {
        let record = self.store.load(id)?;
        let dir = record.log.dir.ok_or_else(|| CorralError::NotFound {
            kind: "log",
            id: id.to_string(),
        })?;
        logs::read(&dir)
    }

    /// `ps` — all records in the store, corrupt files skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state directory is unreadable.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        self.store.list()
    }

    /// `rm` — removes a record and best-effort its log directory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for running or paused containers.
    pub fn remove(&self, id: &ContainerId) -> Result<()> {
        let _lock = self.store.lock(id)?;
        let record = self.store.load(id)?;
        if !record.status.is_removable() {
            return Err(CorralError::InvalidState {
                id: id.to_string(),
                status: record.status.to_string(),
                op: "remove",
            });
        }
        self.store.remove(id)?;
        if let Some(dir) = &record.log.dir {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to remove log directory");
            }
        }
        tracing::info!(id = %id, "container removed");
        Ok(())
    }

    /// `commit` — snapshots the container root as a named image.
    ///
    /// # Errors
    ///
    /// Propagates image write errors.
    pub fn commit(&self, id: &ContainerId, name: &str, image_root: &Path) -> Result<PathBuf> {
        let record = self.store.load(id)?;
        image::commit(&record, name, image_root)
    }

    /// `update` — rewrites resource limits, live when running.
    ///
    /// Cgroup files are only written for a running container (the
    /// directories exist only then); the record is updated either way so
    /// the next start applies the new limits.
    ///
    /// # Errors
    ///
    /// Propagates cgroup write and store errors.
    pub fn update(
        &self,
        id: &ContainerId,
        memory: Option<String>,
        cpu_shares: Option<String>,
        pid_max: Option<u32>,
    ) -> Result<()> {
        self.store.update_locked(id, |record| {
            if record.status == ContainerStatus::Running {
                CgroupManager::new(&record.id).update(
                    memory.as_deref(),
                    cpu_shares.as_deref(),
                    pid_max,
                )?;
            }
            if let Some(memory) = &memory {
                record.limits.memory.clone_from(memory);
            }
            if let Some(cpu) = &cpu_shares {
                record.limits.cpu_shares.clone_from(cpu);
            }
            if let Some(pids) = pid_max {
                record.limits.pid_max = pids;
            }
            Ok(())
        })?;
        tracing::info!(id = %id, "resource limits updated");
        Ok(())
    }

    /// `volume-add` — bind-mounts a host path into a running container.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless running, or an error if the in-
    /// namespace mount fails.
    pub fn volume_add(
        &self,
        id: &ContainerId,
        host_path: &Path,
        container_path: &Path,
        read_only: bool,
    ) -> Result<()> {
        self.store.update_locked(id, |record| {
            record.ensure_status(&[ContainerStatus::Running], "volume-add")?;

            let opts = if read_only { "-o ro " } else { "" };
            let script = format!(
                "mkdir -p {dst} && mount {opts}--bind {src} {dst}",
                src = host_path.display(),
                dst = container_path.display(),
            );
            run_shell_in_mount_ns(record.pid, &script, "mount volume")?;

            record.mounts.push(Mount {
                source: host_path.to_path_buf(),
                destination: container_path.to_path_buf(),
                read_only,
            });
            Ok(())
        })?;
        tracing::info!(id = %id, "volume added");
        Ok(())
    }

    /// `volume-remove` — unmounts a previously added volume.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no mount exists at the path, or
    /// `InvalidState` unless running.
    pub fn volume_remove(&self, id: &ContainerId, container_path: &Path) -> Result<()> {
        self.store.update_locked(id, |record| {
            record.ensure_status(&[ContainerStatus::Running], "volume-remove")?;

            let index = record
                .mounts
                .iter()
                .position(|m| m.destination == container_path)
                .ok_or_else(|| CorralError::NotFound {
                    kind: "mount",
                    id: container_path.display().to_string(),
                })?;

            let script = format!("umount {}", container_path.display());
            run_shell_in_mount_ns(record.pid, &script, "unmount volume")?;

            record.mounts.remove(index);
            Ok(())
        })?;
        tracing::info!(id = %id, "volume removed");
        Ok(())
    }

    /// Releases the per-container runtime resources after exit: network,
    /// then cgroup directories, then the user binds in reverse order.
    /// Teardown errors are logged and skipped, never surfaced.
    fn teardown_runtime(&self, pid: u32, record: &ContainerRecord) {
        network::teardown(pid, &record.network);
        if let Err(e) = CgroupManager::new(&record.id).teardown() {
            tracing::warn!(id = %record.id, error = %e, "cgroup teardown failed");
        }
        if !record.mounts.is_empty() {
            // The destinations only exist inside the container's mount
            // namespace, so the unwind runs from a child that joins it.
            // Once the namespace itself is gone (no process pinning it),
            // the binds are already released and the join fails benignly.
            let mounts = record.mounts.clone();
            match exec::run_task_in(pid, &[NsKind::Mnt], move || {
                mount::release_bind_mounts(&mounts);
                0
            }) {
                Ok(0) => {}
                Ok(_) => {
                    tracing::debug!(id = %record.id, "mount namespace already released");
                }
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "bind mount teardown failed");
                }
            }
        }
    }
}

fn run_shell_in_mount_ns(pid: u32, script: &str, op: &'static str) -> Result<()> {
    let argv = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        script.to_string(),
    ];
    let code = exec::run_command_in(pid, &[NsKind::Mnt], &argv)?;
    if code != 0 {
        return Err(CorralError::Io {
            path: "/bin/sh".into(),
            source: std::io::Error::other(format!("{op} exited with {code}")),
        });
    }
    Ok(())
}

/// Sends a signal, treating an already-gone process as success.
fn signal_process(pid: u32, signal: Signal) -> Result<()> {
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(CorralError::Kernel {
            op: "kill",
            source: e,
        }),
    }
}

/// Polls `kill(pid, 0)` until the process is gone or the deadline
/// elapses. Also reaps the PID when it happens to be a zombie child of
/// this process, which `kill(pid, 0)` would otherwise report alive
/// forever.
fn wait_for_exit(pid: u32, timeout_secs: u64) -> bool {
    let target = Pid::from_raw(pid as i32);
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        let _ = waitpid(target, Some(WaitPidFlag::WNOHANG));
        if kill(target, None) == Err(nix::errno::Errno::ESRCH) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

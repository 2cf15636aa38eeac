//! Per-container cgroup management.
//!
//! Creates one directory per controller under the cgroup mount, writes
//! limit files, attaches PIDs, and drives the freezer for pause/unpause.
//! Init and the supervisor share the single canonical slug derived from
//! the container id, so both sides always address the same directories.

pub mod stats;

use std::path::{Path, PathBuf};

use corral_common::constants::CGROUP_ROOT;
use corral_common::error::{CorralError, Result};
use corral_common::types::{ContainerId, ResourceLimits};

/// Controllers a container owns a directory under.
const CONTROLLERS: &[&str] = &["pids", "memory", "cpu"];

/// Freezer controller, created on demand by pause.
const FREEZER: &str = "freezer";

/// Canonical cgroup directory name for a container.
#[must_use]
pub fn cgroup_slug(id: &ContainerId) -> String {
    format!("corral-{id}")
}

/// Handle to the cgroup directories of a single container.
#[derive(Debug)]
pub struct CgroupManager {
    root: PathBuf,
    slug: String,
}

impl CgroupManager {
    /// Creates a manager rooted at the system cgroup mount.
    #[must_use]
    pub fn new(id: &ContainerId) -> Self {
        Self::with_root(PathBuf::from(CGROUP_ROOT), id)
    }

    /// Creates a manager rooted at an arbitrary directory.
    ///
    /// Used by tests to exercise the read/write logic against a scratch
    /// tree instead of `/sys/fs/cgroup`.
    #[must_use]
    pub fn with_root(root: PathBuf, id: &ContainerId) -> Self {
        Self {
            root,
            slug: cgroup_slug(id),
        }
    }

    /// The directory name shared by all of this container's controllers.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    fn controller_dir(&self, controller: &str) -> PathBuf {
        self.root.join(controller).join(&self.slug)
    }

    fn write_control(&self, controller: &str, file: &str, value: &str) -> Result<()> {
        let path = self.controller_dir(controller).join(file);
        std::fs::write(&path, value).map_err(|e| CorralError::Io { path, source: e })?;
        tracing::debug!(controller, file, value, "cgroup control written");
        Ok(())
    }

    /// Creates the controller directories and writes the configured limits.
    ///
    /// Empty limit strings (and a zero pid limit) skip the corresponding
    /// file entirely. `notify_on_release` is set on the pids controller so
    /// the kernel reaps the group once the last task exits.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or a limit file
    /// cannot be written.
    pub fn setup(&self, limits: &ResourceLimits) -> Result<()> {
        for controller in CONTROLLERS {
            let dir = self.controller_dir(controller);
            std::fs::create_dir_all(&dir).map_err(|e| CorralError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        if limits.pid_max > 0 {
            self.write_control("pids", "pids.max", &limits.pid_max.to_string())?;
        }
        self.write_control("pids", "notify_on_release", "1")?;

        if !limits.memory.is_empty() {
            self.write_control("memory", "memory.limit_in_bytes", &limits.memory)?;
        }
        if !limits.cpu_shares.is_empty() {
            self.write_control("cpu", "cpu.shares", &limits.cpu_shares)?;
        }

        tracing::info!(slug = %self.slug, "cgroups configured");
        Ok(())
    }

    /// Attaches a process to one controller by writing `cgroup.procs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn attach(&self, pid: u32, controller: &str) -> Result<()> {
        self.write_control(controller, "cgroup.procs", &pid.to_string())
    }

    /// Attaches a process to every managed controller.
    ///
    /// # Errors
    ///
    /// Returns an error on the first controller that rejects the PID.
    pub fn attach_all(&self, pid: u32) -> Result<()> {
        for controller in CONTROLLERS {
            self.attach(pid, controller)?;
        }
        Ok(())
    }

    /// Freezes the container: creates the freezer directory if absent,
    /// attaches the PID, and writes `FROZEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the freezer directory or control files cannot
    /// be written.
    pub fn freeze(&self, pid: u32) -> Result<()> {
        let dir = self.controller_dir(FREEZER);
        std::fs::create_dir_all(&dir).map_err(|e| CorralError::Io {
            path: dir.clone(),
            source: e,
        })?;
        self.attach(pid, FREEZER)?;
        self.write_control(FREEZER, "freezer.state", "FROZEN")?;
        tracing::info!(slug = %self.slug, "container frozen");
        Ok(())
    }

    /// Thaws a previously frozen container by writing `THAWED`.
    ///
    /// # Errors
    ///
    /// Returns an error if the freezer state file cannot be written.
    pub fn thaw(&self) -> Result<()> {
        self.write_control(FREEZER, "freezer.state", "THAWED")?;
        tracing::info!(slug = %self.slug, "container thawed");
        Ok(())
    }

    /// Rewrites only the limit files for which a new value is provided.
    ///
    /// # Errors
    ///
    /// Returns an error if any provided limit cannot be written.
    pub fn update(
        &self,
        memory: Option<&str>,
        cpu_shares: Option<&str>,
        pid_max: Option<u32>,
    ) -> Result<()> {
        if let Some(memory) = memory {
            self.write_control("memory", "memory.limit_in_bytes", memory)?;
        }
        if let Some(cpu) = cpu_shares {
            self.write_control("cpu", "cpu.shares", cpu)?;
        }
        if let Some(pids) = pid_max {
            self.write_control("pids", "pids.max", &pids.to_string())?;
        }
        Ok(())
    }

    /// Removes every controller directory for this container.
    ///
    /// Directories that never existed (e.g. freezer when the container was
    /// never paused) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing directory cannot be removed.
    pub fn teardown(&self) -> Result<()> {
        for controller in CONTROLLERS.iter().chain(std::iter::once(&FREEZER)) {
            let dir = self.controller_dir(controller);
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(|e| CorralError::Io {
                    path: dir.clone(),
                    source: e,
                })?;
            }
        }
        tracing::info!(slug = %self.slug, "cgroups removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> CgroupManager {
        CgroupManager::with_root(dir.to_path_buf(), &ContainerId::new("c1"))
    }

    #[test]
    fn slug_is_derived_from_id_only() {
        let id = ContainerId::new("web-1");
        assert_eq!(cgroup_slug(&id), "corral-web-1");
        // Both init and supervisor construct the identical path.
        let a = CgroupManager::new(&id);
        let b = CgroupManager::new(&id);
        assert_eq!(a.slug(), b.slug());
    }

    #[test]
    fn setup_writes_configured_limits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path());
        let limits = ResourceLimits {
            memory: "536870912".into(),
            cpu_shares: "512".into(),
            pid_max: 64,
        };
        mgr.setup(&limits).expect("setup");

        let base = dir.path();
        let read = |p: &str| std::fs::read_to_string(base.join(p)).expect(p);
        assert_eq!(read("pids/corral-c1/pids.max"), "64");
        assert_eq!(read("pids/corral-c1/notify_on_release"), "1");
        assert_eq!(read("memory/corral-c1/memory.limit_in_bytes"), "536870912");
        assert_eq!(read("cpu/corral-c1/cpu.shares"), "512");
    }

    #[test]
    fn setup_skips_empty_limits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path());
        mgr.setup(&ResourceLimits::default()).expect("setup");

        assert!(!dir.path().join("pids/corral-c1/pids.max").exists());
        assert!(!dir.path().join("memory/corral-c1/memory.limit_in_bytes").exists());
        assert!(dir.path().join("cpu/corral-c1").is_dir());
    }

    #[test]
    fn attach_writes_cgroup_procs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path());
        mgr.setup(&ResourceLimits::default()).expect("setup");
        mgr.attach_all(4242).expect("attach");

        let procs =
            std::fs::read_to_string(dir.path().join("cpu/corral-c1/cgroup.procs")).expect("read");
        assert_eq!(procs, "4242");
    }

    #[test]
    fn freeze_and_thaw_drive_freezer_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path());

        mgr.freeze(100).expect("freeze");
        let state_file = dir.path().join("freezer/corral-c1/freezer.state");
        assert_eq!(std::fs::read_to_string(&state_file).expect("read"), "FROZEN");

        mgr.thaw().expect("thaw");
        assert_eq!(std::fs::read_to_string(&state_file).expect("read"), "THAWED");
    }

    #[test]
    fn update_only_touches_provided_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path());
        mgr.setup(&ResourceLimits::default()).expect("setup");

        mgr.update(Some("1073741824"), None, None).expect("update");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("memory/corral-c1/memory.limit_in_bytes"))
                .expect("read"),
            "1073741824"
        );
        assert!(!dir.path().join("pids/corral-c1/pids.max").exists());
    }

    #[test]
    fn teardown_removes_all_controller_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path());
        mgr.setup(&ResourceLimits::default()).expect("setup");
        mgr.freeze(1).expect("freeze");

        mgr.teardown().expect("teardown");
        for controller in ["pids", "memory", "cpu", "freezer"] {
            assert!(!dir.path().join(controller).join("corral-c1").exists());
        }
    }

    #[test]
    fn teardown_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(dir.path());
        mgr.teardown().expect("nothing to remove");
        mgr.teardown().expect("still nothing");
    }
}

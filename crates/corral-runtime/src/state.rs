//! Persistent per-container state.
//!
//! One JSON file per container in a single state directory, enabling
//! daemon-less lifecycle management across independent CLI invocations.
//! Writes go through a temp file plus rename so a crashed writer never
//! leaves a corrupt record, and read-modify-write sequences serialize on
//! an advisory lock.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use corral_common::error::{CorralError, Result};
use corral_common::types::{
    ContainerId, ContainerStatus, LogSettings, MonitorSettings, Mount, NetworkSettings,
    ResourceLimits,
};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};

/// Persistent record of one container. The single entity the runtime
/// stores on disk; every supervisor command reads and mutates it through
/// the [`StateStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container identifier, unique within the state directory.
    pub id: ContainerId,
    /// PID of the init process; 0 whenever the container is not running.
    #[serde(default)]
    pub pid: u32,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// RFC-3339 creation timestamp.
    pub created_at: String,
    /// Payload argv; non-empty for startable records.
    pub command: Vec<String>,
    /// Environment passed to the payload. Keys unique by construction.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Root filesystem path on the host.
    pub root_dir: PathBuf,
    /// Read-only overlay layers under `root_dir`; empty selects the plain
    /// bind-pivot strategy.
    #[serde(default)]
    pub layers: Vec<PathBuf>,
    /// User-provided bind mounts, applied in order.
    #[serde(default)]
    pub mounts: Vec<Mount>,
    /// Cgroup resource limits.
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Network wiring parameters.
    #[serde(default)]
    pub network: NetworkSettings,
    /// Capability whitelist; empty means drop everything.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// User spec applied by init; empty means no switch.
    #[serde(default)]
    pub user: String,
    /// Exec a shell instead of the payload argv.
    #[serde(default)]
    pub interactive: bool,
    /// Return from start instead of waiting for exit.
    #[serde(default)]
    pub detached: bool,
    /// Stdout/stderr capture configuration.
    #[serde(default)]
    pub log: LogSettings,
    /// Resource-stats collection configuration.
    #[serde(default)]
    pub monitor: MonitorSettings,
}

impl ContainerRecord {
    /// Creates a fresh record in the `created` status.
    #[must_use]
    pub fn new(id: ContainerId, command: Vec<String>, root_dir: PathBuf) -> Self {
        Self {
            id,
            pid: 0,
            status: ContainerStatus::Created,
            created_at: chrono::Utc::now().to_rfc3339(),
            command,
            env: BTreeMap::new(),
            root_dir,
            layers: Vec::new(),
            mounts: Vec::new(),
            limits: ResourceLimits::default(),
            network: NetworkSettings::default(),
            capabilities: Vec::new(),
            user: String::new(),
            interactive: false,
            detached: false,
            log: LogSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }

    /// Guards a lifecycle transition: fails unless the current status is
    /// one of `expected`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` naming the refused operation.
    pub fn ensure_status(&self, expected: &[ContainerStatus], op: &'static str) -> Result<()> {
        if expected.contains(&self.status) {
            return Ok(());
        }
        Err(CorralError::InvalidState {
            id: self.id.to_string(),
            status: self.status.to_string(),
            op,
        })
    }

    /// Transitions to `running` with the given PID.
    pub fn mark_running(&mut self, pid: u32) {
        self.pid = pid;
        self.status = ContainerStatus::Running;
    }

    /// Transitions to a non-running status, clearing the PID.
    pub fn mark_down(&mut self, status: ContainerStatus) {
        debug_assert!(status != ContainerStatus::Running);
        self.pid = 0;
        self.status = status;
    }
}

/// Store owning all record files in one state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

/// Advisory exclusive lock over one container's read-modify-write
/// sequence. Released on drop, and by the kernel on process exit under
/// all paths.
pub struct RecordLock {
    _flock: Flock<File>,
}

impl StateStore {
    /// Opens the default state directory (`/var/run/corral`, falling back
    /// to `$TMPDIR/corral`).
    #[must_use]
    pub fn open_default() -> Self {
        Self {
            dir: corral_common::constants::state_dir(),
        }
    }

    /// Opens (and creates if needed) an explicit state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CorralError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// The directory this store owns.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &ContainerId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lock_path(&self, id: &ContainerId) -> PathBuf {
        self.dir.join(format!("{id}.lock"))
    }

    /// Whether a record exists for the id.
    #[must_use]
    pub fn exists(&self, id: &ContainerId) -> bool {
        self.record_path(id).exists()
    }

    /// Persists a record, replacing any previous version atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write/rename fails.
    pub fn save(&self, record: &ContainerRecord) -> Result<()> {
        let path = self.record_path(&record.id);
        let json = serde_json::to_string_pretty(record)?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| CorralError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
        tmp.write_all(json.as_bytes()).map_err(|e| CorralError::Io {
            path: tmp.path().to_path_buf(),
            source: e,
        })?;
        tmp.persist(&path).map_err(|e| CorralError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        tracing::debug!(id = %record.id, status = %record.status, "record saved");
        Ok(())
    }

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record exists, or a serialization error
    /// for a corrupt file.
    pub fn load(&self, id: &ContainerId) -> Result<ContainerRecord> {
        let path = self.record_path(id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CorralError::NotFound {
                    kind: "container",
                    id: id.to_string(),
                }
            } else {
                CorralError::Io { path: path.clone(), source: e }
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Deletes a record file (and its lock file).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    pub fn remove(&self, id: &ContainerId) -> Result<()> {
        let path = self.record_path(id);
        std::fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CorralError::NotFound {
                    kind: "container",
                    id: id.to_string(),
                }
            } else {
                CorralError::Io { path: path.clone(), source: e }
            }
        })?;
        let _ = std::fs::remove_file(self.lock_path(id));
        tracing::debug!(id = %id, "record removed");
        Ok(())
    }

    /// Returns all readable records.
    ///
    /// Corrupt files are logged and skipped, never propagated: one broken
    /// record must not hide the rest of the fleet.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state directory itself is unreadable.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CorralError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    continue;
                }
            };
            match serde_json::from_str::<ContainerRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt record");
                }
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Takes the advisory lock for one container.
    ///
    /// The lock lives on a sibling `.lock` file rather than the record
    /// itself: save() replaces the record inode, which would silently
    /// invalidate a lock held on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    pub fn lock(&self, id: &ContainerId) -> Result<RecordLock> {
        let path = self.lock_path(id);
        let file = File::create(&path).map_err(|e| CorralError::Io {
            path: path.clone(),
            source: e,
        })?;
        let flock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            CorralError::Kernel {
                op: "flock",
                source: errno,
            }
        })?;
        Ok(RecordLock { _flock: flock })
    }

    /// Runs a read-modify-write sequence under the record lock and
    /// persists the result.
    ///
    /// # Errors
    ///
    /// Propagates lock, load, mutation, and save errors.
    pub fn update_locked(
        &self,
        id: &ContainerId,
        mutate: impl FnOnce(&mut ContainerRecord) -> Result<()>,
    ) -> Result<ContainerRecord> {
        let _lock = self.lock(id)?;
        let mut record = self.load(id)?;
        mutate(&mut record)?;
        self.save(&record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    fn record(id: &str) -> ContainerRecord {
        ContainerRecord::new(
            ContainerId::new(id),
            vec!["/bin/sleep".into(), "30".into()],
            PathBuf::from("/srv/rootfs"),
        )
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (_dir, store) = store();
        let mut rec = record("c1");
        rec.env.insert("RUST_LOG".into(), "info".into());
        rec.capabilities.push("CAP_NET_BIND_SERVICE".into());
        store.save(&rec).expect("save");

        let loaded = store.load(&ContainerId::new("c1")).expect("load");
        assert_eq!(loaded.id, rec.id);
        assert_eq!(loaded.status, ContainerStatus::Created);
        assert_eq!(loaded.pid, 0);
        assert_eq!(loaded.command, rec.command);
        assert_eq!(loaded.env.get("RUST_LOG").map(String::as_str), Some("info"));
        assert_eq!(loaded.capabilities, rec.capabilities);
    }

    #[test]
    fn load_missing_record_is_not_found() {
        let (_dir, store) = store();
        let err = store.load(&ContainerId::new("ghost")).unwrap_err();
        assert!(matches!(err, CorralError::NotFound { .. }));
    }

    #[test]
    fn save_overwrites_existing_record() {
        let (_dir, store) = store();
        let mut rec = record("c1");
        store.save(&rec).expect("save created");

        rec.mark_running(4321);
        store.save(&rec).expect("save running");

        let loaded = store.load(&ContainerId::new("c1")).expect("load");
        assert_eq!(loaded.status, ContainerStatus::Running);
        assert_eq!(loaded.pid, 4321);
    }

    #[test]
    fn remove_deletes_file_and_fails_when_absent() {
        let (dir, store) = store();
        let id = ContainerId::new("c1");
        store.save(&record("c1")).expect("save");
        assert!(dir.path().join("c1.json").exists());

        store.remove(&id).expect("remove");
        assert!(!dir.path().join("c1.json").exists());

        let err = store.remove(&id).unwrap_err();
        assert!(matches!(err, CorralError::NotFound { .. }));
    }

    #[test]
    fn list_skips_corrupt_files() {
        let (dir, store) = store();
        store.save(&record("good-1")).expect("save 1");
        store.save(&record("good-2")).expect("save 2");
        std::fs::write(dir.path().join("bad.json"), "{ not json").expect("write corrupt");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write noise");

        let records = store.list().expect("list");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.id.as_str().starts_with("good-")));
    }

    #[test]
    fn list_yields_one_record_per_id() {
        let (_dir, store) = store();
        let mut rec = record("c1");
        store.save(&rec).expect("save");
        rec.mark_running(1);
        store.save(&rec).expect("overwrite");
        rec.mark_down(ContainerStatus::Stopped);
        store.save(&rec).expect("overwrite again");

        let records = store.list().expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ContainerStatus::Stopped);
    }

    #[test]
    fn ensure_status_guards_transitions() {
        let mut rec = record("c1");
        rec.ensure_status(&[ContainerStatus::Created], "start")
            .expect("created is startable");

        rec.mark_down(ContainerStatus::Stopped);
        let err = rec
            .ensure_status(&[ContainerStatus::Running], "stop")
            .unwrap_err();
        assert!(matches!(err, CorralError::InvalidState { .. }));
    }

    #[test]
    fn mark_down_clears_pid() {
        let mut rec = record("c1");
        rec.mark_running(777);
        assert_eq!(rec.pid, 777);
        rec.mark_down(ContainerStatus::Exited);
        assert_eq!(rec.pid, 0);
        assert_eq!(rec.status, ContainerStatus::Exited);
    }

    #[test]
    fn update_locked_persists_mutation() {
        let (_dir, store) = store();
        let id = ContainerId::new("c1");
        store.save(&record("c1")).expect("save");

        let updated = store
            .update_locked(&id, |rec| {
                rec.limits.memory = "536870912".into();
                Ok(())
            })
            .expect("update");
        assert_eq!(updated.limits.memory, "536870912");

        let loaded = store.load(&id).expect("load");
        assert_eq!(loaded.limits.memory, "536870912");
    }

    #[test]
    fn unknown_fields_ignored_on_load() {
        let (dir, store) = store();
        let json = serde_json::json!({
            "id": "fwd",
            "status": "created",
            "created_at": "2026-01-01T00:00:00Z",
            "command": ["/bin/true"],
            "root_dir": "/srv/rootfs",
            "some_future_field": {"nested": true}
        });
        std::fs::write(dir.path().join("fwd.json"), json.to_string()).expect("write");

        let loaded = store.load(&ContainerId::new("fwd")).expect("forward compatible");
        assert_eq!(loaded.command, vec!["/bin/true"]);
        assert!(loaded.mounts.is_empty());
    }
}

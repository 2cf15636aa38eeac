//! Background resource-stats collection inside init.
//!
//! A plain thread on a fixed-period timer that appends one sample line
//! per tick to the stats file. It owns no shared state beyond a stop
//! flag, never touches the record file, and its lifetime is bounded by
//! init: the payload exec replaces the process image, threads included.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use corral_common::constants::CGROUP_ROOT;
use corral_common::error::{CorralError, Result};
use corral_common::types::MonitorSettings;
use corral_core::cgroup::stats;

/// Handle to a running stats task.
pub struct StatsTask {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl StatsTask {
    /// Signals the task and waits for it to flush its last sample.
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

/// Resolves the stats file destination: explicit setting first, then
/// `stats.log` inside the log directory.
///
/// # Errors
///
/// Returns `InvalidArgument` when neither is configured.
pub fn resolve_stats_file(
    settings: &MonitorSettings,
    log_dir: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(file) = &settings.stats_file {
        return Ok(file.clone());
    }
    log_dir
        .map(|dir| dir.join("stats.log"))
        .ok_or_else(|| CorralError::InvalidArgument {
            message: "stats file must be specified when logging is disabled".into(),
        })
}

/// Starts the collector thread for the container owning `slug`.
///
/// # Errors
///
/// Returns an error if the stats file cannot be opened.
pub fn spawn(
    settings: &MonitorSettings,
    slug: String,
    log_dir: Option<&Path>,
) -> Result<StatsTask> {
    spawn_with_root(settings, slug, log_dir, PathBuf::from(CGROUP_ROOT))
}

/// [`spawn`] with an injectable cgroup root, for tests.
///
/// # Errors
///
/// Returns an error if the stats file cannot be opened.
pub fn spawn_with_root(
    settings: &MonitorSettings,
    slug: String,
    log_dir: Option<&Path>,
    cgroup_root: PathBuf,
) -> Result<StatsTask> {
    let path = resolve_stats_file(settings, log_dir)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CorralError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| CorralError::Io {
            path: path.clone(),
            source: e,
        })?;

    let interval = Duration::from_secs(settings.interval_secs.max(1));
    let (cpu, memory, processes) = (settings.cpu, settings.memory, settings.processes);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = std::thread::spawn(move || {
        let _ = writeln!(
            file,
            "=== Resource monitoring started at {} ===",
            chrono::Utc::now().to_rfc3339()
        );
        // Tick in small slices so a stop request is honored promptly.
        let slice = Duration::from_millis(200);
        let mut elapsed = Duration::ZERO;
        while !stop_flag.load(Ordering::SeqCst) {
            std::thread::sleep(slice);
            elapsed += slice;
            if elapsed < interval {
                continue;
            }
            elapsed = Duration::ZERO;

            let sample = stats::collect(&cgroup_root, &slug, cpu, memory, processes);
            let _ = writeln!(file, "[{}] {sample}", chrono::Utc::now().to_rfc3339());
        }
    });

    tracing::info!(stats_file = %path.display(), interval = ?interval, "resource monitoring started");
    Ok(StatsTask { stop, handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_stats_file_wins() {
        let settings = MonitorSettings {
            stats_file: Some(PathBuf::from("/custom/stats.log")),
            ..MonitorSettings::default()
        };
        let resolved =
            resolve_stats_file(&settings, Some(Path::new("/logs"))).expect("resolve");
        assert_eq!(resolved, PathBuf::from("/custom/stats.log"));
    }

    #[test]
    fn stats_file_defaults_into_log_dir() {
        let settings = MonitorSettings::default();
        let resolved =
            resolve_stats_file(&settings, Some(Path::new("/logs/c1"))).expect("resolve");
        assert_eq!(resolved, PathBuf::from("/logs/c1/stats.log"));
    }

    #[test]
    fn no_destination_is_invalid() {
        let settings = MonitorSettings::default();
        let err = resolve_stats_file(&settings, None).unwrap_err();
        assert!(matches!(err, CorralError::InvalidArgument { .. }));
    }

    #[test]
    fn task_writes_header_and_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cgroup = dir.path().join("cgroup");
        std::fs::create_dir_all(&cgroup).expect("mkdir");
        std::fs::write(cgroup.join("memory.current"), "4194304").expect("write");

        let settings = MonitorSettings {
            enabled: true,
            interval_secs: 1,
            stats_file: Some(dir.path().join("stats.log")),
            cpu: false,
            memory: true,
            processes: false,
        };
        let task = spawn_with_root(&settings, "corral-c1".into(), None, cgroup)
            .expect("spawn");
        std::thread::sleep(Duration::from_millis(1400));
        task.stop();

        let content =
            std::fs::read_to_string(dir.path().join("stats.log")).expect("read stats");
        assert!(content.contains("=== Resource monitoring started"));
        assert!(content.contains("Memory: 4.00 MB"));
    }
}

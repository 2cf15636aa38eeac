//! System-wide constants and default paths.

use std::path::PathBuf;

/// Preferred directory for per-container state files.
pub const STATE_DIR: &str = "/var/run/corral";

/// Directory for committed images.
pub const IMAGE_DIR: &str = "/var/lib/corral/images";

/// Default directory for container log capture.
pub const DEFAULT_LOG_DIR: &str = "/var/log/corral";

/// Host bridge created on first use and never deleted by the runtime.
pub const DEFAULT_BRIDGE: &str = "corral0";

/// Mount point of the cgroup hierarchy.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Hostname set inside the UTS namespace.
pub const CONTAINER_HOSTNAME: &str = "container";

/// Grace period between SIGTERM and SIGKILL on stop.
pub const STOP_TIMEOUT_SECS: u64 = 10;

/// Highest capability index dropped from the bounding set.
pub const CAP_LAST_CAP: u64 = 40;

/// Default log rotation threshold (10 MiB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Default resource-stats sampling period.
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 30;

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "corral";

/// Returns the state directory, creating it if necessary.
///
/// Falls back to `$TMPDIR/corral` when the preferred location under
/// `/var/run` cannot be created (unprivileged callers).
#[must_use]
pub fn state_dir() -> PathBuf {
    let preferred = PathBuf::from(STATE_DIR);
    if std::fs::create_dir_all(&preferred).is_ok() {
        return preferred;
    }
    let fallback = std::env::temp_dir().join(APP_NAME);
    let _ = std::fs::create_dir_all(&fallback);
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dir_exists_after_resolution() {
        let dir = state_dir();
        assert!(dir.is_dir(), "state dir should be created on resolution");
    }
}

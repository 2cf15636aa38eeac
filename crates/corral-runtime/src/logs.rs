//! Container log capture and retrieval.
//!
//! Init redirects the payload's stdout/stderr into `stdout.log` and
//! `stderr.log` under the configured log directory; the supervisor reads
//! them back for `logs`.

use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use corral_common::error::{CorralError, Result};

/// Path of the captured stdout stream.
#[must_use]
pub fn stdout_path(log_dir: &Path) -> PathBuf {
    log_dir.join("stdout.log")
}

/// Path of the captured stderr stream.
#[must_use]
pub fn stderr_path(log_dir: &Path) -> PathBuf {
    log_dir.join("stderr.log")
}

/// Reads both captured streams.
///
/// # Errors
///
/// Returns `NotFound` if no stdout log exists (logging was never enabled
/// or the container never started); a missing stderr log reads as empty.
pub fn read(log_dir: &Path) -> Result<(String, String)> {
    let stdout_file = stdout_path(log_dir);
    if !stdout_file.exists() {
        return Err(CorralError::NotFound {
            kind: "log",
            id: stdout_file.display().to_string(),
        });
    }
    let stdout = std::fs::read_to_string(&stdout_file).map_err(|e| CorralError::Io {
        path: stdout_file,
        source: e,
    })?;
    let stderr = std::fs::read_to_string(stderr_path(log_dir)).unwrap_or_default();
    Ok((stdout, stderr))
}

/// Redirects the calling process's stdout and stderr into append-only
/// log files, creating the directory as needed.
///
/// Runs inside init just before the payload exec; the payload inherits
/// the redirected descriptors.
///
/// # Errors
///
/// Returns an error if the directory or files cannot be created, or a
/// `dup2` call fails.
pub fn redirect_stdio(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir).map_err(|e| CorralError::Io {
        path: log_dir.to_path_buf(),
        source: e,
    })?;

    let open = |path: PathBuf| -> Result<std::fs::File> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CorralError::Io { path, source: e })
    };
    let stdout_file = open(stdout_path(log_dir))?;
    let stderr_file = open(stderr_path(log_dir))?;

    nix::unistd::dup2(stdout_file.as_raw_fd(), libc::STDOUT_FILENO).map_err(|e| {
        CorralError::Kernel {
            op: "dup2 stdout",
            source: e,
        }
    })?;
    nix::unistd::dup2(stderr_file.as_raw_fd(), libc::STDERR_FILENO).map_err(|e| {
        CorralError::Kernel {
            op: "dup2 stderr",
            source: e,
        }
    })?;

    // Keep the files open for the lifetime of the process; the duplicated
    // descriptors share the open file description.
    std::mem::forget(stdout_file);
    std::mem::forget(stderr_file);

    tracing::info!(dir = %log_dir.display(), "stdio redirected to log files");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_log_layout() {
        let dir = Path::new("/var/log/corral/c1");
        assert_eq!(stdout_path(dir), PathBuf::from("/var/log/corral/c1/stdout.log"));
        assert_eq!(stderr_path(dir), PathBuf::from("/var/log/corral/c1/stderr.log"));
    }

    #[test]
    fn read_missing_logs_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read(dir.path()).unwrap_err();
        assert!(matches!(err, CorralError::NotFound { .. }));
    }

    #[test]
    fn read_returns_both_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(stdout_path(dir.path()), "hello out\n").expect("stdout");
        std::fs::write(stderr_path(dir.path()), "hello err\n").expect("stderr");

        let (stdout, stderr) = read(dir.path()).expect("read");
        assert_eq!(stdout, "hello out\n");
        assert_eq!(stderr, "hello err\n");
    }

    #[test]
    fn missing_stderr_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(stdout_path(dir.path()), "only stdout").expect("stdout");

        let (stdout, stderr) = read(dir.path()).expect("read");
        assert_eq!(stdout, "only stdout");
        assert!(stderr.is_empty());
    }
}

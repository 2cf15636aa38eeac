//! Read-side resource statistics.
//!
//! Tries the cgroup-v2 unified files first and falls back to the
//! per-container v1 directories. Every read is a soft error: a missing
//! or unreadable file simply omits that dimension from the sample.

use std::fmt;
use std::path::Path;

/// One sampled snapshot of a container's resource usage.
///
/// `None` fields were unavailable at sampling time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSample {
    /// Raw contents of `cpu.stat`, newline-flattened.
    pub cpu: Option<String>,
    /// Current memory usage in bytes.
    pub memory_bytes: Option<u64>,
    /// Current number of processes in the group.
    pub processes: Option<u64>,
}

impl fmt::Display for StatsSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(cpu) = &self.cpu {
            write!(f, "CPU: {cpu}")?;
            wrote = true;
        }
        if let Some(bytes) = self.memory_bytes {
            if wrote {
                write!(f, " | ")?;
            }
            write!(f, "Memory: {:.2} MB", bytes as f64 / 1024.0 / 1024.0)?;
            wrote = true;
        }
        if let Some(procs) = self.processes {
            if wrote {
                write!(f, " | ")?;
            }
            write!(f, "Processes: {procs}")?;
        }
        Ok(())
    }
}

fn read_flattened(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    Some(raw.trim_end().replace('\n', " "))
}

fn read_number(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Reads one file preferring the v2 location, then the v1 fallback.
fn v2_then_v1<T>(
    root: &Path,
    slug: &str,
    v2_file: &str,
    controller: &str,
    v1_file: &str,
    read: impl Fn(&Path) -> Option<T>,
) -> Option<T> {
    let v2 = root.join(v2_file);
    if v2.exists() {
        return read(&v2);
    }
    read(&root.join(controller).join(slug).join(v1_file))
}

/// Samples the selected dimensions for the container owning `slug`.
///
/// `root` is the cgroup mount point; tests substitute a scratch tree.
#[must_use]
pub fn collect(
    root: &Path,
    slug: &str,
    cpu: bool,
    memory: bool,
    processes: bool,
) -> StatsSample {
    StatsSample {
        cpu: cpu
            .then(|| v2_then_v1(root, slug, "cpu.stat", "cpu", "cpu.stat", read_flattened))
            .flatten(),
        memory_bytes: memory
            .then(|| {
                v2_then_v1(
                    root,
                    slug,
                    "memory.current",
                    "memory",
                    "memory.usage_in_bytes",
                    read_number,
                )
            })
            .flatten(),
        processes: processes
            .then(|| {
                v2_then_v1(
                    root,
                    slug,
                    "pids.current",
                    "pids",
                    "pids.current",
                    read_number,
                )
            })
            .flatten(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_prefers_v2_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cpu.stat"), "usage_usec 42\n").expect("write");
        std::fs::write(dir.path().join("memory.current"), "1048576\n").expect("write");
        std::fs::write(dir.path().join("pids.current"), "3\n").expect("write");

        let sample = collect(dir.path(), "corral-x", true, true, true);
        assert_eq!(sample.cpu.as_deref(), Some("usage_usec 42"));
        assert_eq!(sample.memory_bytes, Some(1_048_576));
        assert_eq!(sample.processes, Some(3));
    }

    #[test]
    fn collect_falls_back_to_v1_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let slug = "corral-x";
        for (controller, file, value) in [
            ("cpu", "cpu.stat", "nr_periods 7"),
            ("memory", "memory.usage_in_bytes", "2097152"),
            ("pids", "pids.current", "5"),
        ] {
            let d = dir.path().join(controller).join(slug);
            std::fs::create_dir_all(&d).expect("mkdir");
            std::fs::write(d.join(file), value).expect("write");
        }

        let sample = collect(dir.path(), slug, true, true, true);
        assert_eq!(sample.cpu.as_deref(), Some("nr_periods 7"));
        assert_eq!(sample.memory_bytes, Some(2_097_152));
        assert_eq!(sample.processes, Some(5));
    }

    #[test]
    fn missing_files_are_soft_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sample = collect(dir.path(), "corral-x", true, true, true);
        assert_eq!(sample, StatsSample::default());
    }

    #[test]
    fn disabled_dimensions_are_not_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("memory.current"), "1024").expect("write");

        let sample = collect(dir.path(), "corral-x", false, false, false);
        assert_eq!(sample.memory_bytes, None);
    }

    #[test]
    fn display_joins_present_dimensions() {
        let sample = StatsSample {
            cpu: Some("usage_usec 10".into()),
            memory_bytes: Some(2 * 1024 * 1024),
            processes: Some(4),
        };
        assert_eq!(
            sample.to_string(),
            "CPU: usage_usec 10 | Memory: 2.00 MB | Processes: 4"
        );

        let partial = StatsSample {
            cpu: None,
            memory_bytes: None,
            processes: Some(1),
        };
        assert_eq!(partial.to_string(), "Processes: 1");
    }
}

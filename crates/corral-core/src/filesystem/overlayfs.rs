//! `OverlayFS` management for layered container filesystems.
//!
//! Stacks read-only lower layers under a writable upper layer, so a
//! container started from committed image layers keeps its own writes
//! without touching the layers.

use std::path::{Path, PathBuf};

use corral_common::error::{CorralError, Result};
use nix::mount::{mount, MsFlags};

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Read-only lower layers (bottom to top).
    pub lower_dirs: Vec<PathBuf>,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Builds the kernel mount option string
    /// (`lowerdir=...,upperdir=...,workdir=...`).
    #[must_use]
    pub fn options(&self) -> String {
        let lowers = self
            .lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        format!(
            "lowerdir={},upperdir={},workdir={}",
            lowers,
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the upper, work, and merged directories if they do not exist,
/// then issues the `mount(2)` syscall with overlay-specific options. The
/// caller continues with the normal pivot sequence on `merged_dir`.
///
/// # Errors
///
/// Returns an error if directory creation fails or the mount is rejected.
pub fn mount_overlay(config: &OverlayConfig) -> Result<()> {
    for dir in [&config.upper_dir, &config.work_dir, &config.merged_dir] {
        std::fs::create_dir_all(dir).map_err(|e| CorralError::Io {
            path: dir.clone(),
            source: e,
        })?;
    }

    let opts = config.options();
    mount(
        Some("overlay"),
        &config.merged_dir,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )
    .map_err(|e| CorralError::Kernel {
        op: "mount overlay",
        source: e,
    })?;

    tracing::info!(merged = %config.merged_dir.display(), "overlayfs mounted");
    Ok(())
}

/// Convenience constructor for a container rootfs overlay: layers below,
/// the rootfs as upper, and a work dir beside it.
#[must_use]
pub fn rootfs_overlay(layers: Vec<PathBuf>, rootfs: &Path, scratch: &Path) -> OverlayConfig {
    OverlayConfig {
        lower_dirs: layers,
        upper_dir: rootfs.to_path_buf(),
        work_dir: scratch.join("overlay-work"),
        merged_dir: scratch.join("overlay-merged"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_join_layers_with_colons() {
        let config = OverlayConfig {
            lower_dirs: vec![PathBuf::from("/l/base"), PathBuf::from("/l/app")],
            upper_dir: PathBuf::from("/c/upper"),
            work_dir: PathBuf::from("/c/work"),
            merged_dir: PathBuf::from("/c/merged"),
        };
        assert_eq!(
            config.options(),
            "lowerdir=/l/base:/l/app,upperdir=/c/upper,workdir=/c/work"
        );
    }

    #[test]
    fn rootfs_overlay_places_scratch_dirs() {
        let config = rootfs_overlay(
            vec![PathBuf::from("/layers/1")],
            Path::new("/ctr/rootfs"),
            Path::new("/tmp/scratch"),
        );
        assert_eq!(config.upper_dir, PathBuf::from("/ctr/rootfs"));
        assert_eq!(config.work_dir, PathBuf::from("/tmp/scratch/overlay-work"));
        assert_eq!(config.merged_dir, PathBuf::from("/tmp/scratch/overlay-merged"));
    }
}

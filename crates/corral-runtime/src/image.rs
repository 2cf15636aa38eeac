//! Committing a container's filesystem to a named image.
//!
//! An image is a directory holding an uncompressed `rootfs.tar` snapshot
//! of the container's root plus a `metadata.json` describing where it
//! came from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use corral_common::error::{CorralError, Result};
use serde::{Deserialize, Serialize};

use crate::state::ContainerRecord;

/// Metadata written beside the rootfs tarball.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image name chosen at commit time.
    pub name: String,
    /// RFC-3339 commit timestamp.
    pub created_at: String,
    /// Container the image was committed from.
    pub container_id: String,
    /// Environment of the source container.
    pub env: BTreeMap<String, String>,
    /// Payload argv of the source container.
    pub command: Vec<String>,
}

/// Commits `record`'s root filesystem as image `name` under `image_root`.
///
/// Returns the created image directory. Committing a running container is
/// allowed but may snapshot in-flight writes, so it logs a warning.
///
/// # Errors
///
/// Returns an error if the image directory, tarball, or metadata cannot
/// be written.
pub fn commit(record: &ContainerRecord, name: &str, image_root: &Path) -> Result<PathBuf> {
    if record.status == corral_common::types::ContainerStatus::Running {
        tracing::warn!(id = %record.id, "committing a running container may produce an inconsistent image");
    }

    let image_dir = image_root.join(name);
    std::fs::create_dir_all(&image_dir).map_err(|e| CorralError::Io {
        path: image_dir.clone(),
        source: e,
    })?;

    let tar_path = image_dir.join("rootfs.tar");
    let tar_file = std::fs::File::create(&tar_path).map_err(|e| CorralError::Io {
        path: tar_path.clone(),
        source: e,
    })?;
    let mut builder = tar::Builder::new(tar_file);
    builder
        .append_dir_all(".", &record.root_dir)
        .and_then(|()| builder.finish())
        .map_err(|e| CorralError::Io {
            path: tar_path.clone(),
            source: e,
        })?;

    let metadata = ImageMetadata {
        name: name.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        container_id: record.id.to_string(),
        env: record.env.clone(),
        command: record.command.clone(),
    };
    let metadata_path = image_dir.join("metadata.json");
    let json = serde_json::to_string_pretty(&metadata)?;
    std::fs::write(&metadata_path, json).map_err(|e| CorralError::Io {
        path: metadata_path,
        source: e,
    })?;

    tracing::info!(id = %record.id, image = name, dir = %image_dir.display(), "container committed");
    Ok(image_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_common::types::ContainerId;

    fn record_with_rootfs(rootfs: &Path) -> ContainerRecord {
        let mut rec = ContainerRecord::new(
            ContainerId::new("c1"),
            vec!["/bin/sh".into(), "-c".into(), "true".into()],
            rootfs.to_path_buf(),
        );
        rec.env.insert("APP_ENV".into(), "prod".into());
        rec
    }

    #[test]
    fn commit_writes_tarball_and_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(rootfs.join("etc")).expect("mkdir");
        std::fs::write(rootfs.join("etc/hostname"), "container\n").expect("write");

        let images = dir.path().join("images");
        let record = record_with_rootfs(&rootfs);
        let image_dir = commit(&record, "snapshot", &images).expect("commit");

        assert_eq!(image_dir, images.join("snapshot"));

        let tar_file = std::fs::File::open(image_dir.join("rootfs.tar")).expect("open tar");
        let mut archive = tar::Archive::new(tar_file);
        let names: Vec<String> = archive
            .entries()
            .expect("entries")
            .map(|e| {
                e.expect("entry")
                    .path()
                    .expect("path")
                    .display()
                    .to_string()
            })
            .collect();
        assert!(names.iter().any(|n| n.contains("etc/hostname")));

        let metadata: ImageMetadata = serde_json::from_str(
            &std::fs::read_to_string(image_dir.join("metadata.json")).expect("read"),
        )
        .expect("parse metadata");
        assert_eq!(metadata.name, "snapshot");
        assert_eq!(metadata.container_id, "c1");
        assert_eq!(metadata.command.len(), 3);
        assert_eq!(metadata.env.get("APP_ENV").map(String::as_str), Some("prod"));
    }

    #[test]
    fn commit_missing_rootfs_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let record = record_with_rootfs(&dir.path().join("nonexistent"));
        let result = commit(&record, "broken", &dir.path().join("images"));
        assert!(result.is_err());
    }
}

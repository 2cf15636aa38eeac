//! # corral-core
//!
//! Low-level Linux isolation primitives for the Corral runtime.
//!
//! This crate provides safe abstractions over:
//! - **Capabilities**: the four per-process sets plus bounding/ambient,
//!   edited through `capget`/`capset` and `prctl`.
//! - **Cgroups**: per-container directories, limit files, freezer control,
//!   and read-side stats with a v2-then-v1 fallback.
//! - **Filesystem**: `pivot_root` rootfs switching, `OverlayFS` stacking,
//!   and ordered bind mounts.
//! - **Namespaces**: clone-flag assembly, UID/GID map files, and `setns`
//!   entry into a running container's namespaces.
//! - **Users**: resolution and application of `--user` specs.
//!
//! Everything here mutates process-wide state (mounts, identity, hostname,
//! capability sets) and is meant to run inside the container's init
//! process, never in the supervisor.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod capability;
pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod user;

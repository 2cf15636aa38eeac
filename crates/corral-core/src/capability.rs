//! Linux capability management for least-privilege execution.
//!
//! Drops every capability by default and raises back only those the
//! container configuration whitelists, across the effective, permitted,
//! inheritable, and ambient sets plus the bounding set.

use std::fmt;

use corral_common::constants::CAP_LAST_CAP;
use corral_common::error::{CorralError, Result};

/// Capability names recognized by the runtime, with their kernel indices.
pub const CAPABILITY_TABLE: &[(&str, u64)] = &[
    ("CAP_CHOWN", 0),
    ("CAP_DAC_OVERRIDE", 1),
    ("CAP_DAC_READ_SEARCH", 2),
    ("CAP_FOWNER", 3),
    ("CAP_FSETID", 4),
    ("CAP_KILL", 5),
    ("CAP_SETGID", 6),
    ("CAP_SETUID", 7),
    ("CAP_SETPCAP", 8),
    ("CAP_NET_BIND_SERVICE", 10),
    ("CAP_NET_RAW", 13),
    ("CAP_SYS_CHROOT", 18),
    ("CAP_MKNOD", 27),
    ("CAP_AUDIT_WRITE", 29),
    ("CAP_SETFCAP", 31),
];

/// A single capability validated against [`CAPABILITY_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    name: &'static str,
    index: u64,
}

impl Capability {
    /// Resolves a capability by its `CAP_*` name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for names outside the known table.
    pub fn from_name(name: &str) -> Result<Self> {
        CAPABILITY_TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, index)| Self { name, index })
            .ok_or_else(|| CorralError::InvalidArgument {
                message: format!("unknown capability: {name}"),
            })
    }

    /// Kernel index of this capability.
    #[must_use]
    pub fn index(self) -> u64 {
        self.index
    }

    /// Canonical `CAP_*` name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Resolves a whitelist of capability names up front.
///
/// Resolution happens before any kernel state is touched, so an unknown
/// name leaves the process's capability sets unchanged.
///
/// # Errors
///
/// Returns `InvalidArgument` on the first unknown name.
pub fn resolve_whitelist(names: &[String]) -> Result<Vec<Capability>> {
    names.iter().map(|n| Capability::from_name(n)).collect()
}

/// Splits a capability index into its `capget` data slot and bit mask.
///
/// # Errors
///
/// Returns `InvalidArgument` for indices the two-element v3 layout cannot
/// represent (>= 64).
fn bit_slot(index: u64) -> Result<(usize, u32)> {
    let slot = (index / 32) as usize;
    if slot >= 2 {
        return Err(CorralError::InvalidArgument {
            message: format!("capability index out of range: {index}"),
        });
    }
    Ok((slot, 1u32 << (index % 32)))
}

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

/// Maps a capability syscall failure onto the coarse error kinds.
fn cap_error(op: &'static str, errno: nix::Error) -> CorralError {
    if errno == nix::errno::Errno::EPERM {
        CorralError::InsufficientPrivilege {
            message: format!("{op} rejected by kernel"),
        }
    } else {
        CorralError::Kernel { op, source: errno }
    }
}

fn capget(data: &mut [CapUserData; 2]) -> Result<()> {
    let mut header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };
    // SAFETY: header and data outlive the call and match the kernel ABI
    // for _LINUX_CAPABILITY_VERSION_3 (two data elements).
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capget,
            std::ptr::addr_of_mut!(header),
            data.as_mut_ptr(),
        )
    };
    if rc < 0 {
        return Err(cap_error("capget", nix::errno::Errno::last()));
    }
    Ok(())
}

fn capset(data: &[CapUserData; 2]) -> Result<()> {
    let mut header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };
    // SAFETY: see capget.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capset,
            std::ptr::addr_of_mut!(header),
            data.as_ptr(),
        )
    };
    if rc < 0 {
        return Err(cap_error("capset", nix::errno::Errno::last()));
    }
    Ok(())
}

fn prctl(op: &'static str, option: libc::c_int, arg2: libc::c_ulong, arg3: libc::c_ulong) -> Result<()> {
    // SAFETY: plain integer arguments; no pointers involved.
    let rc = unsafe { libc::prctl(option, arg2, arg3, 0, 0) };
    if rc < 0 {
        return Err(cap_error(op, nix::errno::Errno::last()));
    }
    Ok(())
}

/// Drops every capability: clears the ambient set wholesale, then drops
/// each bounding-set index up to [`CAP_LAST_CAP`].
///
/// Bounding-set drops past the kernel's actual last cap fail with EINVAL
/// and are ignored, matching the all-or-nothing semantics of the ambient
/// clear. Idempotent.
///
/// # Errors
///
/// Returns an error if the ambient clear is rejected.
pub fn clear_all() -> Result<()> {
    prctl(
        "PR_CAP_AMBIENT_CLEAR_ALL",
        libc::PR_CAP_AMBIENT,
        libc::PR_CAP_AMBIENT_CLEAR_ALL as libc::c_ulong,
        0,
    )?;

    for index in 0..=CAP_LAST_CAP {
        let _ = prctl(
            "PR_CAPBSET_DROP",
            libc::PR_CAPBSET_DROP,
            index as libc::c_ulong,
            0,
        );
    }

    tracing::debug!("all capabilities dropped");
    Ok(())
}

/// Raises one capability in the effective, permitted, inheritable, and
/// ambient sets.
///
/// The sequence is a single atomic method because the kernel only accepts
/// `PR_CAP_AMBIENT_RAISE` for a capability that is already inheritable
/// and permitted: keepcaps first, then `capset` on all three sets, then
/// the ambient raise.
///
/// # Errors
///
/// Returns an error if any step is rejected; the caller must treat the
/// process's capability state as undefined afterwards and exit.
pub fn add(cap: Capability) -> Result<()> {
    let (slot, bit) = bit_slot(cap.index())?;

    prctl("PR_SET_KEEPCAPS", libc::PR_SET_KEEPCAPS, 1, 0)?;

    let mut data = [CapUserData::default(); 2];
    capget(&mut data)?;
    data[slot].effective |= bit;
    data[slot].permitted |= bit;
    data[slot].inheritable |= bit;
    capset(&data)?;

    prctl(
        "PR_CAP_AMBIENT_RAISE",
        libc::PR_CAP_AMBIENT,
        libc::PR_CAP_AMBIENT_RAISE as libc::c_ulong,
        cap.index() as libc::c_ulong,
    )?;

    tracing::debug!(cap = %cap, "capability raised");
    Ok(())
}

/// Clears one capability from the effective, permitted, inheritable, and
/// ambient sets.
///
/// # Errors
///
/// Returns an error if `capget`/`capset` or the ambient lower fails.
pub fn remove(cap: Capability) -> Result<()> {
    let (slot, bit) = bit_slot(cap.index())?;

    let mut data = [CapUserData::default(); 2];
    capget(&mut data)?;
    data[slot].effective &= !bit;
    data[slot].permitted &= !bit;
    data[slot].inheritable &= !bit;
    capset(&data)?;

    prctl(
        "PR_CAP_AMBIENT_LOWER",
        libc::PR_CAP_AMBIENT,
        libc::PR_CAP_AMBIENT_LOWER as libc::c_ulong,
        cap.index() as libc::c_ulong,
    )?;

    tracing::debug!(cap = %cap, "capability lowered");
    Ok(())
}

/// Applies a whitelist policy: drop everything, then raise each listed
/// capability. An empty whitelist is the secure default (drop all).
///
/// All names are resolved before any kernel state changes, so an unknown
/// name fails without side effects. A mid-sequence kernel failure leaves
/// the process with partially dropped capabilities; the error must be
/// treated as fatal.
///
/// # Errors
///
/// Returns `InvalidArgument` for unknown names, or the underlying kernel
/// error from [`clear_all`]/[`add`].
pub fn apply_policy(whitelist: &[String]) -> Result<()> {
    let caps = resolve_whitelist(whitelist)?;

    clear_all()?;
    for cap in caps {
        add(cap)?;
    }

    tracing::info!(retained = whitelist.len(), "capability policy applied");
    Ok(())
}

/// Reads the current (effective, permitted, inheritable) sets as 64-bit
/// bitmaps.
///
/// # Errors
///
/// Returns an error if `capget` fails.
pub fn current_sets() -> Result<(u64, u64, u64)> {
    let mut data = [CapUserData::default(); 2];
    capget(&mut data)?;
    let combine = |lo: u32, hi: u32| u64::from(hi) << 32 | u64::from(lo);
    Ok((
        combine(data[0].effective, data[1].effective),
        combine(data[0].permitted, data[1].permitted),
        combine(data[0].inheritable, data[1].inheritable),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_contains_fifteen_known_names() {
        assert_eq!(CAPABILITY_TABLE.len(), 15);
        assert!(CAPABILITY_TABLE.iter().any(|&(n, i)| n == "CAP_CHOWN" && i == 0));
        assert!(
            CAPABILITY_TABLE
                .iter()
                .any(|&(n, i)| n == "CAP_NET_BIND_SERVICE" && i == 10)
        );
        assert!(CAPABILITY_TABLE.iter().any(|&(n, i)| n == "CAP_SETFCAP" && i == 31));
    }

    #[test]
    fn from_name_resolves_known_capability() {
        let cap = Capability::from_name("CAP_NET_RAW").expect("known name");
        assert_eq!(cap.index(), 13);
        assert_eq!(cap.name(), "CAP_NET_RAW");
    }

    #[test]
    fn from_name_rejects_unknown_capability() {
        let err = Capability::from_name("CAP_SYS_ADMIN").unwrap_err();
        assert!(matches!(
            err,
            corral_common::error::CorralError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn resolve_whitelist_fails_fast_on_unknown_name() {
        let names = vec!["CAP_KILL".to_string(), "CAP_BOGUS".to_string()];
        assert!(resolve_whitelist(&names).is_err());

        let names = vec!["CAP_KILL".to_string(), "CAP_SETUID".to_string()];
        let caps = resolve_whitelist(&names).expect("all known");
        assert_eq!(caps.len(), 2);
    }

    #[test]
    fn bit_slot_splits_index() {
        assert_eq!(bit_slot(0).expect("low"), (0, 1));
        assert_eq!(bit_slot(10).expect("low"), (0, 1 << 10));
        assert_eq!(bit_slot(33).expect("high"), (1, 1 << 1));
        assert!(bit_slot(64).is_err());
    }

    #[test]
    fn current_sets_readable_without_privilege() {
        let (effective, permitted, inheritable) = current_sets().expect("capget");
        // Whatever the sets are, effective must be a subset of permitted.
        assert_eq!(effective & !permitted, 0);
        let _ = inheritable;
    }
}

//! User and group identity switching for container payloads.
//!
//! Resolves a `--user` spec (`<uid>`, `<uid>:<gid>`, or `<name>`) and
//! applies it in the only order that works with dropped privileges:
//! supplementary groups, then gid, then uid, then environment.

use std::ffi::CString;
use std::path::PathBuf;

use corral_common::error::{CorralError, Result};
use nix::unistd::{Gid, Uid};

/// Highest uid/gid the runtime accepts.
const ID_MAX: u32 = 65_535;

/// A resolved user specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    /// Target user id.
    pub uid: u32,
    /// Target group id.
    pub gid: u32,
    /// Name used for the `USER` environment variable and group lookup.
    pub name: String,
    /// Home directory from the user database, when known.
    pub home: Option<PathBuf>,
}

/// Parses and resolves a user spec string.
///
/// Returns `None` for the empty spec (no switch requested). Numeric forms
/// are parsed directly; anything else is looked up in the system user
/// database with a line-by-line `/etc/passwd` fallback.
///
/// # Errors
///
/// Returns `InvalidArgument` for malformed specs or ids outside
/// `[0, 65535]`, and `NotFound` for unknown user names.
pub fn parse(spec: &str) -> Result<Option<UserSpec>> {
    if spec.is_empty() {
        return Ok(None);
    }

    let parsed = if let Some((uid_str, gid_str)) = spec.split_once(':') {
        let uid = parse_id(uid_str)?;
        let gid = parse_id(gid_str)?;
        UserSpec {
            uid,
            gid,
            name: uid_str.to_string(),
            home: None,
        }
    } else if let Ok(uid) = spec.parse::<u32>() {
        // Same value for gid as uid, the common container practice.
        UserSpec {
            uid,
            gid: uid,
            name: spec.to_string(),
            home: None,
        }
    } else {
        resolve_name(spec)?
    };

    bounds_check(parsed.uid, parsed.gid)?;
    Ok(Some(parsed))
}

fn parse_id(s: &str) -> Result<u32> {
    s.parse().map_err(|_| CorralError::InvalidArgument {
        message: format!("invalid uid/gid: {s}"),
    })
}

fn bounds_check(uid: u32, gid: u32) -> Result<()> {
    if uid > ID_MAX || gid > ID_MAX {
        return Err(CorralError::InvalidArgument {
            message: format!("uid/gid out of valid range (0-{ID_MAX}): uid={uid}, gid={gid}"),
        });
    }
    Ok(())
}

fn resolve_name(name: &str) -> Result<UserSpec> {
    if let Ok(Some(user)) = nix::unistd::User::from_name(name) {
        return Ok(UserSpec {
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            name: name.to_string(),
            home: Some(user.dir),
        });
    }

    // User database unavailable or incomplete inside minimal rootfs trees.
    let passwd = std::fs::read_to_string("/etc/passwd").map_err(|e| CorralError::Io {
        path: "/etc/passwd".into(),
        source: e,
    })?;
    parse_passwd(&passwd, name).ok_or_else(|| CorralError::NotFound {
        kind: "user",
        id: name.to_string(),
    })
}

/// Finds a user entry in passwd-format content.
fn parse_passwd(content: &str, name: &str) -> Option<UserSpec> {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 4 && fields[0] == name {
            return Some(UserSpec {
                uid: fields[2].parse().ok()?,
                gid: fields[3].parse().ok()?,
                name: name.to_string(),
                home: fields.get(5).map(PathBuf::from),
            });
        }
    }
    None
}

/// Checks whether the caller may switch to the target identity.
///
/// Root may switch freely; any other caller may only "switch" to its own
/// uid/gid.
///
/// # Errors
///
/// Returns `InsufficientPrivilege` for a forbidden switch.
pub fn validate_switch(current_uid: u32, current_gid: u32, target: &UserSpec) -> Result<()> {
    if current_uid == 0 {
        return Ok(());
    }
    if target.uid != current_uid || target.gid != current_gid {
        return Err(CorralError::InsufficientPrivilege {
            message: format!(
                "current user {current_uid}:{current_gid} cannot switch to {}:{}",
                target.uid, target.gid
            ),
        });
    }
    Ok(())
}

/// Picks the `HOME` value for the target user.
#[must_use]
pub fn home_directory(spec: &UserSpec) -> PathBuf {
    if spec.uid == 0 {
        return PathBuf::from("/root");
    }
    spec.home
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("/home/{}", spec.name)))
}

/// Applies the identity switch to the current process.
///
/// Order is load-bearing: supplementary groups and gid must be set while
/// the process still holds the privilege to do so, uid last. A failure
/// after the first set call leaves the process with partial identity, so
/// every error here must abort the pipeline.
///
/// # Errors
///
/// Returns `InsufficientPrivilege` for forbidden switches or kernel
/// errors from the `set*` calls.
pub fn switch(spec: &UserSpec) -> Result<()> {
    validate_switch(
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
        spec,
    )?;

    tracing::info!(uid = spec.uid, gid = spec.gid, "switching user");

    let gid = Gid::from_raw(spec.gid);
    let groups = supplementary_groups(&spec.name, gid);
    nix::unistd::setgroups(&groups).map_err(|e| identity_error("setgroups", e))?;
    nix::unistd::setgid(gid).map_err(|e| identity_error("setgid", e))?;
    nix::unistd::setuid(Uid::from_raw(spec.uid)).map_err(|e| identity_error("setuid", e))?;

    let home = home_directory(spec);
    std::env::set_var("USER", &spec.name);
    std::env::set_var("HOME", &home);

    tracing::info!(user = %spec.name, home = %home.display(), "user switch completed");
    Ok(())
}

fn identity_error(op: &'static str, errno: nix::Error) -> CorralError {
    if errno == nix::errno::Errno::EPERM {
        CorralError::InsufficientPrivilege {
            message: format!("{op} rejected by kernel"),
        }
    } else {
        CorralError::Kernel { op, source: errno }
    }
}

/// Supplementary group list for the user, falling back to the primary
/// group alone when the lookup fails.
fn supplementary_groups(name: &str, gid: Gid) -> Vec<Gid> {
    CString::new(name)
        .ok()
        .and_then(|cname| nix::unistd::getgrouplist(&cname, gid).ok())
        .unwrap_or_else(|| vec![gid])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_spec_means_no_switch() {
        assert_eq!(parse("").expect("empty is valid"), None);
    }

    #[test]
    fn numeric_uid_uses_same_gid() {
        let spec = parse("1000").expect("parse").expect("some");
        assert_eq!(spec.uid, 1000);
        assert_eq!(spec.gid, 1000);
        assert_eq!(spec.name, "1000");
    }

    #[test]
    fn uid_gid_pair_parses_both() {
        let spec = parse("1000:2000").expect("parse").expect("some");
        assert_eq!(spec.uid, 1000);
        assert_eq!(spec.gid, 2000);
    }

    #[test]
    fn boundary_uid_accepted_and_above_rejected() {
        assert!(parse("65535").expect("max id").is_some());
        let err = parse("65536").unwrap_err();
        assert!(matches!(err, CorralError::InvalidArgument { .. }));
        assert!(parse("70000").is_err());
    }

    #[test]
    fn malformed_pair_rejected() {
        assert!(parse("1000:").is_err());
        assert!(parse("a:b").is_err());
    }

    #[test]
    fn passwd_fallback_finds_entry() {
        let passwd = "\
# comment line
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
app:x:1001:1002:App User:/srv/app:/bin/sh
";
        let spec = parse_passwd(passwd, "app").expect("found");
        assert_eq!(spec.uid, 1001);
        assert_eq!(spec.gid, 1002);
        assert_eq!(spec.home, Some(PathBuf::from("/srv/app")));

        assert!(parse_passwd(passwd, "missing").is_none());
    }

    #[test]
    fn root_caller_switches_freely() {
        let target = UserSpec {
            uid: 1000,
            gid: 1000,
            name: "app".into(),
            home: None,
        };
        validate_switch(0, 0, &target).expect("root may switch");
    }

    #[test]
    fn non_root_caller_limited_to_own_identity() {
        let own = UserSpec {
            uid: 1000,
            gid: 1000,
            name: "me".into(),
            home: None,
        };
        validate_switch(1000, 1000, &own).expect("identity no-op allowed");

        let root = UserSpec {
            uid: 0,
            gid: 0,
            name: "0".into(),
            home: None,
        };
        let err = validate_switch(1000, 1000, &root).unwrap_err();
        assert!(matches!(err, CorralError::InsufficientPrivilege { .. }));
    }

    #[test]
    fn home_directory_prefers_database_then_convention() {
        let root = UserSpec {
            uid: 0,
            gid: 0,
            name: "root".into(),
            home: Some(PathBuf::from("/nonstandard")),
        };
        assert_eq!(home_directory(&root), PathBuf::from("/root"));

        let with_db = UserSpec {
            uid: 1000,
            gid: 1000,
            name: "app".into(),
            home: Some(PathBuf::from("/srv/app")),
        };
        assert_eq!(home_directory(&with_db), PathBuf::from("/srv/app"));

        let bare = UserSpec {
            uid: 1000,
            gid: 1000,
            name: "app".into(),
            home: None,
        };
        assert_eq!(home_directory(&bare), PathBuf::from("/home/app"));
    }
}

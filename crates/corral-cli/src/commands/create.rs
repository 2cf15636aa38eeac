//! `corral create` — Create a container without starting it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use corral_common::error::{CorralError, Result};
use corral_common::types::{ContainerId, Mount};
use corral_runtime::state::ContainerRecord;
use corral_runtime::supervisor::Supervisor;

/// Per-container configuration flags, shared by `create` and `run`.
#[derive(Args, Debug)]
pub struct ContainerArgs {
    /// Container id (generated when omitted).
    #[arg(long)]
    pub id: Option<String>,

    /// Root filesystem path on the host.
    #[arg(long)]
    pub rootfs: PathBuf,

    /// Read-only overlay layer, bottom to top (repeatable); the rootfs
    /// becomes the writable upper layer.
    #[arg(long)]
    pub layer: Vec<PathBuf>,

    /// Bind mount (repeatable).
    #[arg(long, num_args = 3, value_names = ["SRC", "DST", "MODE"])]
    pub mount: Vec<String>,

    /// User spec: <uid>, <uid>:<gid>, or <name>.
    #[arg(long)]
    pub user: Option<String>,

    /// Capability to retain (repeatable); none means drop everything.
    #[arg(long = "cap-add", value_name = "NAME")]
    pub cap_add: Vec<String>,

    /// Extra environment variable (repeatable).
    #[arg(long, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Memory limit in cgroup units (e.g. 536870912).
    #[arg(long)]
    pub memory: Option<String>,

    /// CPU shares (relative weight).
    #[arg(long)]
    pub cpu: Option<String>,

    /// Maximum number of processes.
    #[arg(long)]
    pub pids: Option<u32>,

    /// Container address in CIDR form (enables network wiring).
    #[arg(long)]
    pub ip: Option<String>,

    /// Host bridge to attach to.
    #[arg(long)]
    pub bridge: Option<String>,

    /// Port forward <host>:<container>[/tcp|udp] (repeatable).
    #[arg(short = 'p', long)]
    pub publish: Vec<String>,

    /// Capture stdout/stderr into this directory.
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,

    /// Log rotation threshold in bytes.
    #[arg(long = "log-max-size", value_name = "BYTES")]
    pub log_max_size: Option<u64>,

    /// Enable the resource-stats collector.
    #[arg(long = "enable-monitor")]
    pub enable_monitor: bool,

    /// Stats sampling period in seconds.
    #[arg(long = "monitor-interval", value_name = "SECS")]
    pub monitor_interval: Option<u64>,

    /// Stats destination file.
    #[arg(long = "monitor-stats-file")]
    pub monitor_stats_file: Option<PathBuf>,

    /// Sample CPU usage only.
    #[arg(long = "monitor-cpu")]
    pub monitor_cpu: bool,

    /// Sample memory usage only.
    #[arg(long = "monitor-memory")]
    pub monitor_memory: bool,

    /// Sample process count only.
    #[arg(long = "monitor-processes")]
    pub monitor_processes: bool,

    /// Exec a shell instead of the payload.
    #[arg(short, long)]
    pub interactive: bool,

    /// Return immediately instead of waiting for exit.
    #[arg(short, long)]
    pub detach: bool,

    /// Payload command, after `--`.
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl ContainerArgs {
    /// Validates the flags and builds the container record.
    ///
    /// All input validation happens here, before anything is written to
    /// the state directory: a malformed user spec, capability name,
    /// mount, or port map must not leave a record behind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for any malformed flag.
    pub fn into_record(self) -> Result<ContainerRecord> {
        let id = self
            .id
            .map(ContainerId::new)
            .unwrap_or_else(ContainerId::generate);
        let mut record = ContainerRecord::new(id, self.command, self.rootfs);
        record.layers = self.layer;

        for triple in self.mount.chunks(3) {
            record
                .mounts
                .push(Mount::from_triple(&triple[0], &triple[1], &triple[2])?);
        }

        if let Some(user) = self.user {
            validate_user_spec(&user)?;
            record.user = user;
        }

        corral_core::capability::resolve_whitelist(&self.cap_add)?;
        record.capabilities = self.cap_add;

        record.env = default_env();
        for pair in self.env {
            let (key, value) = split_env(&pair)?;
            record.env.insert(key, value);
        }

        if let Some(memory) = self.memory {
            record.limits.memory = memory;
        }
        if let Some(cpu) = self.cpu {
            record.limits.cpu_shares = cpu;
        }
        if let Some(pids) = self.pids {
            record.limits.pid_max = pids;
        }

        if let Some(ip) = self.ip {
            record.network.container_ip = ip;
        }
        if let Some(bridge) = self.bridge {
            record.network.bridge = bridge;
        }
        for spec in self.publish {
            record.network.port_maps.push(spec.parse()?);
        }

        record.log.dir = self.log_dir;
        if let Some(max) = self.log_max_size {
            record.log.max_size = max;
        }

        record.monitor.enabled = self.enable_monitor;
        if let Some(interval) = self.monitor_interval {
            record.monitor.interval_secs = interval;
        }
        record.monitor.stats_file = self.monitor_stats_file;
        if self.monitor_cpu || self.monitor_memory || self.monitor_processes {
            record.monitor.cpu = self.monitor_cpu;
            record.monitor.memory = self.monitor_memory;
            record.monitor.processes = self.monitor_processes;
        }

        record.interactive = self.interactive;
        record.detached = self.detach;

        Ok(record)
    }
}

/// Environment every container starts from; `--env` entries override.
fn default_env() -> BTreeMap<String, String> {
    [
        ("PATH", "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"),
        ("HOME", "/root"),
        ("USER", "root"),
        ("SHELL", "/bin/sh"),
        ("TERM", "xterm"),
        ("LANG", "en_US.UTF-8"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn split_env(pair: &str) -> Result<(String, String)> {
    pair.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| CorralError::InvalidArgument {
            message: format!("environment variable must be KEY=VALUE, got {pair}"),
        })
}

/// Validates numeric user specs eagerly. Name lookups are deferred to
/// init, where the container's own user database is visible.
fn validate_user_spec(spec: &str) -> Result<()> {
    if !spec.is_empty() && spec.chars().all(|c| c.is_ascii_digit() || c == ':') {
        corral_core::user::parse(spec)?;
    }
    Ok(())
}

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Container configuration.
    #[command(flatten)]
    pub config: ContainerArgs,
}

/// Executes the `create` command.
///
/// # Errors
///
/// Returns an error if validation or persistence fails.
pub fn execute(supervisor: &Supervisor, args: CreateArgs) -> anyhow::Result<()> {
    let record = args.config.into_record()?;
    let id = supervisor.create(record)?;
    println!("Container created: {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        config: ContainerArgs,
    }

    fn parse(args: &[&str]) -> ContainerArgs {
        let argv: Vec<&str> = std::iter::once("test").chain(args.iter().copied()).collect();
        TestCli::parse_from(argv).config
    }

    #[test]
    fn minimal_flags_build_startable_record() {
        let args = parse(&["--rootfs", "/srv/r", "--id", "c1", "--", "/bin/sleep", "30"]);
        let record = args.into_record().expect("record");
        assert_eq!(record.id.as_str(), "c1");
        assert_eq!(record.command, vec!["/bin/sleep", "30"]);
        assert_eq!(record.root_dir, PathBuf::from("/srv/r"));
        assert!(!record.detached);
        assert_eq!(record.env.get("TERM").map(String::as_str), Some("xterm"));
    }

    #[test]
    fn omitted_id_is_generated() {
        let args = parse(&["--rootfs", "/srv/r", "--", "/bin/true"]);
        let record = args.into_record().expect("record");
        assert!(!record.id.as_str().is_empty());
    }

    #[test]
    fn mount_triples_are_parsed_in_order() {
        let args = parse(&[
            "--rootfs", "/srv/r",
            "--mount", "/data", "/mnt/data", "ro",
            "--mount", "/cache", "/mnt/cache", "rw",
            "--", "/bin/true",
        ]);
        let record = args.into_record().expect("record");
        assert_eq!(record.mounts.len(), 2);
        assert!(record.mounts[0].read_only);
        assert_eq!(record.mounts[1].source, PathBuf::from("/cache"));
        assert!(!record.mounts[1].read_only);
    }

    #[test]
    fn out_of_range_user_rejected_before_any_record_exists() {
        let args = parse(&["--rootfs", "/srv/r", "--user", "70000", "--", "/bin/true"]);
        let err = args.into_record().unwrap_err();
        assert!(matches!(err, CorralError::InvalidArgument { .. }));
    }

    #[test]
    fn named_user_deferred_to_init() {
        let args = parse(&[
            "--rootfs", "/srv/r",
            "--user", "surely-not-a-host-user",
            "--", "/bin/true",
        ]);
        let record = args.into_record().expect("name validation deferred");
        assert_eq!(record.user, "surely-not-a-host-user");
    }

    #[test]
    fn unknown_capability_rejected() {
        let args = parse(&[
            "--rootfs", "/srv/r",
            "--cap-add", "CAP_NOT_REAL",
            "--", "/bin/true",
        ]);
        assert!(args.into_record().is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let args = parse(&[
            "--rootfs", "/srv/r",
            "--env", "TERM=dumb",
            "--env", "APP=web",
            "--", "/bin/true",
        ]);
        let record = args.into_record().expect("record");
        assert_eq!(record.env.get("TERM").map(String::as_str), Some("dumb"));
        assert_eq!(record.env.get("APP").map(String::as_str), Some("web"));
        assert!(record.env.contains_key("PATH"));
    }

    #[test]
    fn malformed_env_rejected() {
        let args = parse(&["--rootfs", "/srv/r", "--env", "NOEQUALS", "--", "/bin/true"]);
        assert!(args.into_record().is_err());
    }

    #[test]
    fn network_flags_populate_settings() {
        let args = parse(&[
            "--rootfs", "/srv/r",
            "--ip", "172.20.0.5/16",
            "-p", "8080:80",
            "-p", "53:53/udp",
            "--", "/bin/true",
        ]);
        let record = args.into_record().expect("record");
        assert_eq!(record.network.container_ip, "172.20.0.5/16");
        assert_eq!(record.network.bridge, "corral0");
        assert_eq!(record.network.port_maps.len(), 2);
    }

    #[test]
    fn monitor_dimensions_default_to_all_when_unselected() {
        let args = parse(&["--rootfs", "/srv/r", "--enable-monitor", "--", "/bin/true"]);
        let record = args.into_record().expect("record");
        assert!(record.monitor.enabled);
        assert!(record.monitor.cpu && record.monitor.memory && record.monitor.processes);

        let args = parse(&[
            "--rootfs", "/srv/r",
            "--enable-monitor",
            "--monitor-memory",
            "--", "/bin/true",
        ]);
        let record = args.into_record().expect("record");
        assert!(!record.monitor.cpu);
        assert!(record.monitor.memory);
        assert!(!record.monitor.processes);
    }

    #[test]
    fn resource_limit_flags_fill_record() {
        let args = parse(&[
            "--rootfs", "/srv/r",
            "--memory", "536870912",
            "--cpu", "512",
            "--pids", "64",
            "--", "/bin/true",
        ]);
        let record = args.into_record().expect("record");
        assert_eq!(record.limits.memory, "536870912");
        assert_eq!(record.limits.cpu_shares, "512");
        assert_eq!(record.limits.pid_max, 64);
    }
}

//! Domain primitive types used across the Corral workspace.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CorralError, Result};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Record saved but never started.
    Created,
    /// Init (or the payload it exec'd into) is alive.
    Running,
    /// Frozen via the freezer cgroup.
    Paused,
    /// Stopped by an explicit `stop`.
    Stopped,
    /// The payload terminated on its own.
    Exited,
}

impl ContainerStatus {
    /// Statuses from which a container may be started.
    #[must_use]
    pub fn is_startable(self) -> bool {
        matches!(self, Self::Created | Self::Stopped | Self::Exited)
    }

    /// Statuses in which a record may be removed.
    #[must_use]
    pub fn is_removable(self) -> bool {
        matches!(self, Self::Created | Self::Stopped | Self::Exited)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// A bind mount from a host path into the container root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Host path to bind from.
    pub source: PathBuf,
    /// Path inside the container root.
    pub destination: PathBuf,
    /// Remount read-only after binding.
    pub read_only: bool,
}

impl Mount {
    /// Builds a mount from the `<src> <dst> <ro|rw>` CLI triple.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the mode is neither `ro` nor `rw`.
    pub fn from_triple(source: &str, destination: &str, mode: &str) -> Result<Self> {
        let read_only = match mode {
            "ro" => true,
            "rw" => false,
            other => {
                return Err(CorralError::InvalidArgument {
                    message: format!("mount mode must be ro or rw, got {other}"),
                })
            }
        };
        Ok(Self {
            source: PathBuf::from(source),
            destination: PathBuf::from(destination),
            read_only,
        })
    }
}

/// Transport protocol of a forwarded port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP forwarding.
    Tcp,
    /// UDP forwarding.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = CorralError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(CorralError::InvalidArgument {
                message: format!("protocol must be tcp or udp, got {other}"),
            }),
        }
    }
}

/// A host-port to container-port forwarding entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMap {
    /// Port on the host the DNAT rule matches.
    pub host_port: u16,
    /// Port the traffic is redirected to inside the container.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl FromStr for PortMap {
    type Err = CorralError;

    /// Parses `<host>:<container>[/<proto>]`, defaulting to TCP.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || CorralError::InvalidArgument {
            message: format!("port map must be <host>:<container>[/tcp|udp], got {s}"),
        };
        let (ports, proto) = match s.split_once('/') {
            Some((p, proto)) => (p, proto.parse()?),
            None => (s, Protocol::Tcp),
        };
        let (host, container) = ports.split_once(':').ok_or_else(bad)?;
        Ok(Self {
            host_port: host.parse().map_err(|_| bad())?,
            container_port: container.parse().map_err(|_| bad())?,
            protocol: proto,
        })
    }
}

/// Resource limits applied through cgroup control files.
///
/// Limit strings are written to the kernel verbatim (cgroup units such as
/// `"512m"` are the kernel's business); an empty string or zero means the
/// corresponding file is not written at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Value for `memory.limit_in_bytes`, or empty for unset.
    #[serde(default)]
    pub memory: String,
    /// Value for `cpu.shares`, or empty for unset.
    #[serde(default)]
    pub cpu_shares: String,
    /// Value for `pids.max`, or 0 for unset.
    #[serde(default)]
    pub pid_max: u32,
}

/// Network wiring parameters for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Address (CIDR) assigned to the container end of the veth pair.
    #[serde(default)]
    pub container_ip: String,
    /// Host bridge the veth host end is attached to.
    pub bridge: String,
    /// Port forwarding entries.
    #[serde(default)]
    pub port_maps: Vec<PortMap>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            container_ip: String::new(),
            bridge: crate::constants::DEFAULT_BRIDGE.to_string(),
            port_maps: Vec::new(),
        }
    }
}

/// Stdout/stderr capture configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Directory holding `stdout.log` and `stderr.log`; `None` disables capture.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Size threshold above which rotation is permitted.
    #[serde(default = "default_max_log_size")]
    pub max_size: u64,
}

fn default_max_log_size() -> u64 {
    crate::constants::DEFAULT_MAX_LOG_SIZE
}

/// Resource-stats collection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Whether the stats task is started at all.
    #[serde(default)]
    pub enabled: bool,
    /// Sampling period in seconds.
    pub interval_secs: u64,
    /// Destination file; defaults into the log dir when unset.
    #[serde(default)]
    pub stats_file: Option<PathBuf>,
    /// Sample CPU usage.
    pub cpu: bool,
    /// Sample memory usage.
    pub memory: bool,
    /// Sample process count.
    pub processes: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: crate::constants::DEFAULT_MONITOR_INTERVAL_SECS,
            stats_file: None,
            cpu: true,
            memory: true,
            processes: true,
        }
    }
}

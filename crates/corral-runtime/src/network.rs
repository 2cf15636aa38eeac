//! Host-side network wiring for containers.
//!
//! Creates the shared bridge on first use, a per-container veth pair
//! named from the init PID, moves the container end into the target
//! network namespace, and installs DNAT/MASQUERADE rules for each port
//! mapping. All wiring happens from the supervisor after the PID is
//! known and before init is released past its sync barrier, so the
//! namespace is always populated before the payload runs.

use std::path::Path;
use std::process::Command;

use corral_common::error::{CorralError, Result};
use corral_common::types::{NetworkSettings, PortMap};
use corral_core::namespace::NsKind;

/// Name of the container-side veth interface.
#[must_use]
pub fn container_veth(pid: u32) -> String {
    format!("veth{pid}")
}

/// Name of the host-side veth interface.
#[must_use]
pub fn host_veth(pid: u32) -> String {
    format!("hveth{pid}")
}

/// Strips the prefix length from a CIDR address for use in iptables
/// destinations.
#[must_use]
pub fn bare_ip(cidr: &str) -> &str {
    cidr.split('/').next().unwrap_or(cidr)
}

/// Arguments for one DNAT rule (`-A` to install, `-D` to delete).
#[must_use]
pub fn dnat_rule(action: &str, map: &PortMap, container_ip: &str) -> Vec<String> {
    vec![
        "-t".into(),
        "nat".into(),
        action.into(),
        "PREROUTING".into(),
        "-p".into(),
        map.protocol.to_string(),
        "--dport".into(),
        map.host_port.to_string(),
        "-j".into(),
        "DNAT".into(),
        "--to-destination".into(),
        format!("{}:{}", bare_ip(container_ip), map.container_port),
    ]
}

/// Arguments for the MASQUERADE rule paired with a DNAT rule.
#[must_use]
pub fn masquerade_rule(action: &str, map: &PortMap, container_ip: &str) -> Vec<String> {
    vec![
        "-t".into(),
        "nat".into(),
        action.into(),
        "POSTROUTING".into(),
        "-p".into(),
        map.protocol.to_string(),
        "-s".into(),
        bare_ip(container_ip).into(),
        "--dport".into(),
        map.container_port.to_string(),
        "-j".into(),
        "MASQUERADE".into(),
    ]
}

fn command_error(program: &str, detail: String) -> CorralError {
    CorralError::Io {
        path: program.into(),
        source: std::io::Error::other(detail),
    }
}

fn run(program: &str, args: &[String]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| CorralError::Io {
            path: program.into(),
            source: e,
        })?;
    if !output.status.success() {
        return Err(command_error(
            program,
            format!(
                "{program} {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(())
}

fn run_ip(args: &[&str]) -> Result<()> {
    let owned: Vec<String> = args.iter().map(ToString::to_string).collect();
    run("ip", &owned)
}

fn interface_exists(name: &str) -> bool {
    Path::new("/sys/class/net").join(name).exists()
}

/// Creates the bridge and brings it up if it does not exist yet.
///
/// The bridge is shared by all containers and never deleted by the
/// runtime.
///
/// # Errors
///
/// Returns an error if bridge creation or link-up fails.
pub fn ensure_bridge(name: &str) -> Result<()> {
    if interface_exists(name) {
        return Ok(());
    }
    run_ip(&["link", "add", name, "type", "bridge"])?;
    run_ip(&["link", "set", name, "up"])?;
    tracing::info!(bridge = name, "bridge created");
    Ok(())
}

/// Wires a freshly cloned init process into the bridge network.
///
/// No-op when the record carries no container IP. Sequence: ensure
/// bridge, create the veth pair, attach and raise the host end, move the
/// container end into the target netns, configure `lo` and the veth
/// inside the namespace, then install the NAT rules.
///
/// # Errors
///
/// Returns an error on the first wiring step that fails; the caller
/// tears down the container.
pub fn setup(pid: u32, net: &NetworkSettings) -> Result<()> {
    if net.container_ip.is_empty() {
        return Ok(());
    }

    ensure_bridge(&net.bridge)?;

    let ctr = container_veth(pid);
    let host = host_veth(pid);
    run_ip(&["link", "add", &ctr, "type", "veth", "peer", "name", &host])?;
    run_ip(&["link", "set", &host, "up"])?;
    run_ip(&["link", "set", &host, "master", &net.bridge])?;
    run_ip(&["link", "set", &ctr, "netns", &pid.to_string()])?;

    // The container end can only be configured from inside the netns.
    configure_in_netns(pid, &ctr, &net.container_ip)?;

    for map in &net.port_maps {
        run("iptables", &dnat_rule("-A", map, &net.container_ip))?;
        run("iptables", &masquerade_rule("-A", map, &net.container_ip))?;
    }

    tracing::info!(pid, ip = %net.container_ip, bridge = %net.bridge, "network wired");
    Ok(())
}

fn configure_in_netns(pid: u32, veth: &str, cidr: &str) -> Result<()> {
    let inside = |args: &[&str]| -> Result<()> {
        let argv: Vec<String> = std::iter::once("ip")
            .chain(args.iter().copied())
            .map(ToString::to_string)
            .collect();
        let code = crate::exec::run_command_in(pid, &[NsKind::Net], &argv)?;
        if code != 0 {
            return Err(command_error(
                "ip",
                format!("ip {} exited with {code} inside netns of {pid}", args.join(" ")),
            ));
        }
        Ok(())
    };

    inside(&["link", "set", "lo", "up"])?;
    inside(&["link", "set", veth, "up"])?;
    inside(&["addr", "add", cidr, "dev", veth])?;
    Ok(())
}

/// Removes the NAT rules and the host-side veth for a stopped container.
///
/// Every step is best-effort: missing interfaces or rules are logged and
/// skipped, never surfaced. The container-side veth vanishes with its
/// namespace.
pub fn teardown(pid: u32, net: &NetworkSettings) {
    if net.container_ip.is_empty() {
        return;
    }

    for map in &net.port_maps {
        if let Err(e) = run("iptables", &dnat_rule("-D", map, &net.container_ip)) {
            tracing::warn!(error = %e, "failed to remove DNAT rule");
        }
        if let Err(e) = run("iptables", &masquerade_rule("-D", map, &net.container_ip)) {
            tracing::warn!(error = %e, "failed to remove MASQUERADE rule");
        }
    }

    let host = host_veth(pid);
    if interface_exists(&host) {
        if let Err(e) = run_ip(&["link", "del", &host]) {
            tracing::warn!(veth = %host, error = %e, "failed to delete host veth");
        }
    }

    tracing::info!(pid, "network torn down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_common::types::Protocol;

    fn map() -> PortMap {
        PortMap {
            host_port: 8080,
            container_port: 80,
            protocol: Protocol::Tcp,
        }
    }

    #[test]
    fn veth_names_derive_from_pid() {
        assert_eq!(container_veth(1234), "veth1234");
        assert_eq!(host_veth(1234), "hveth1234");
    }

    #[test]
    fn bare_ip_strips_prefix_length() {
        assert_eq!(bare_ip("172.20.0.2/16"), "172.20.0.2");
        assert_eq!(bare_ip("172.20.0.2"), "172.20.0.2");
    }

    #[test]
    fn dnat_rule_targets_container_ip_and_port() {
        let rule = dnat_rule("-A", &map(), "172.20.0.2/16");
        assert_eq!(
            rule,
            vec![
                "-t",
                "nat",
                "-A",
                "PREROUTING",
                "-p",
                "tcp",
                "--dport",
                "8080",
                "-j",
                "DNAT",
                "--to-destination",
                "172.20.0.2:80",
            ]
        );
    }

    #[test]
    fn delete_rule_mirrors_install_rule() {
        let install = dnat_rule("-A", &map(), "172.20.0.2/16");
        let delete = dnat_rule("-D", &map(), "172.20.0.2/16");
        assert_eq!(install.len(), delete.len());
        assert!(install.iter().zip(&delete).all(|(a, b)| a == b
            || (a == "-A" && b == "-D")));
    }

    #[test]
    fn masquerade_rule_matches_source_and_port() {
        let rule = masquerade_rule("-A", &map(), "172.20.0.2/16");
        assert!(rule.contains(&"POSTROUTING".to_string()));
        assert!(rule.contains(&"172.20.0.2".to_string()));
        assert!(rule.contains(&"MASQUERADE".to_string()));
        assert!(rule.contains(&"80".to_string()));
    }
}

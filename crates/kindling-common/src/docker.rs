//! Docker CLI wrappers: networks and long-running helper containers

use tracing::{debug, info};

use crate::exec::{probe, run_best_effort, run_checked};
use crate::{CommandRunner, Invocation, Result};

/// Observed state of a named container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// No container with that name exists
    Missing,
    /// Container exists but is not running
    Stopped,
    /// Container is running
    Running,
}

/// Parameters for `docker run -d`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Network to attach at creation time
    pub network: Option<String>,
    /// Environment variables
    pub env: Vec<(String, String)>,
    /// Bind mounts / named volumes as `source:target`
    pub volumes: Vec<String>,
}

impl ContainerSpec {
    /// Build the `docker run` invocation for this spec
    pub fn run_invocation(&self) -> Invocation {
        let mut inv = Invocation::new("docker").args([
            "run",
            "-d",
            "--restart=always",
            "--name",
            self.name.as_str(),
        ]);
        if let Some(network) = &self.network {
            inv = inv.args(["--network", network.as_str()]);
        }
        for (key, value) in &self.env {
            inv = inv.args(["-e".to_string(), format!("{}={}", key, value)]);
        }
        for volume in &self.volumes {
            inv = inv.args(["-v", volume.as_str()]);
        }
        inv.arg(&self.image)
    }
}

/// Check whether a Docker network with exactly this name exists
pub async fn network_exists<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<bool> {
    let filter = format!("name=^{}$", name);
    let stdout = run_checked(
        runner,
        Invocation::new("docker").args([
            "network",
            "ls",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Name}}",
        ]),
    )
    .await?;
    Ok(stdout.lines().any(|line| line.trim() == name))
}

/// Create a bridge network with the given subnet
pub async fn create_network<R: CommandRunner + ?Sized>(
    runner: &R,
    name: &str,
    subnet: &str,
) -> Result<()> {
    info!(network = %name, subnet = %subnet, "Creating docker network");
    run_checked(
        runner,
        Invocation::new("docker").args([
            "network", "create", "--driver", "bridge", "--subnet", subnet, name,
        ]),
    )
    .await?;
    Ok(())
}

/// List the subnets configured on a network, in IPAM order.
///
/// Docker may report an IPv6 subnet alongside the IPv4 one.
pub async fn network_subnets<R: CommandRunner + ?Sized>(
    runner: &R,
    name: &str,
) -> Result<Vec<String>> {
    let stdout = run_checked(
        runner,
        Invocation::new("docker").args([
            "network",
            "inspect",
            name,
            "--format",
            "{{range .IPAM.Config}}{{.Subnet}} {{end}}",
        ]),
    )
    .await?;
    Ok(stdout.split_whitespace().map(str::to_string).collect())
}

/// Inspect a container's state
pub async fn container_state<R: CommandRunner + ?Sized>(
    runner: &R,
    name: &str,
) -> Result<ContainerState> {
    let output = runner
        .output(&Invocation::new("docker").args([
            "inspect",
            "--format",
            "{{.State.Running}}",
            name,
        ]))
        .await?;

    if !output.success {
        return Ok(ContainerState::Missing);
    }
    Ok(match output.stdout.trim() {
        "true" => ContainerState::Running,
        _ => ContainerState::Stopped,
    })
}

/// Start an existing, stopped container
pub async fn start_container<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<()> {
    run_checked(runner, Invocation::new("docker").args(["start", name])).await?;
    Ok(())
}

/// Create and start a detached container
pub async fn run_container<R: CommandRunner + ?Sized>(
    runner: &R,
    spec: &ContainerSpec,
) -> Result<()> {
    info!(container = %spec.name, image = %spec.image, "Starting container");
    run_checked(runner, spec.run_invocation()).await?;
    Ok(())
}

/// Attach a container to a network unless it is already attached
pub async fn connect_network<R: CommandRunner + ?Sized>(
    runner: &R,
    network: &str,
    container: &str,
) -> Result<()> {
    let attached = run_checked(
        runner,
        Invocation::new("docker").args([
            "inspect",
            "--format",
            "{{range $k, $v := .NetworkSettings.Networks}}{{$k}} {{end}}",
            container,
        ]),
    )
    .await?;

    if attached.split_whitespace().any(|n| n == network) {
        debug!(container = %container, network = %network, "already attached");
        return Ok(());
    }

    run_checked(
        runner,
        Invocation::new("docker").args(["network", "connect", network, container]),
    )
    .await?;
    Ok(())
}

/// Remove a container, ignoring the error if it does not exist
pub async fn remove_container<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<()> {
    run_best_effort(runner, Invocation::new("docker").args(["rm", "-f", name])).await
}

/// Remove a named volume, ignoring the error if it does not exist
pub async fn remove_volume<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<()> {
    run_best_effort(runner, Invocation::new("docker").args(["volume", "rm", name])).await
}

/// True if the docker daemon answers
pub async fn daemon_reachable<R: CommandRunner + ?Sized>(runner: &R) -> Result<bool> {
    probe(
        runner,
        Invocation::new("docker").args(["info", "--format", "{{.ServerVersion}}"]),
    )
    .await
}

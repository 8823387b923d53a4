//! Shared utilities for kind cluster operations

use tracing::info;

use kindling_common::exec::{run_best_effort, run_checked};
use kindling_common::{CommandRunner, Invocation};

use crate::Result;

/// kind reads the network to attach nodes to from this variable
pub const KIND_NETWORK_ENV: &str = "KIND_EXPERIMENTAL_DOCKER_NETWORK";

/// How long `kind create cluster` waits for the control plane
const CONTROL_PLANE_WAIT: &str = "120s";

/// True if kind already knows a cluster with this name
pub async fn cluster_exists<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<bool> {
    let stdout = run_checked(runner, Invocation::new("kind").args(["get", "clusters"])).await?;
    Ok(stdout.lines().any(|line| line.trim() == name))
}

/// Create a kind cluster from a rendered config on the given docker network
pub async fn create_kind_cluster<R: CommandRunner + ?Sized>(
    runner: &R,
    name: &str,
    config: &str,
    network: &str,
) -> Result<()> {
    info!("Creating kind cluster: {}", name);

    run_checked(
        runner,
        Invocation::new("kind")
            .args([
                "create",
                "cluster",
                "--name",
                name,
                "--config",
                "-",
                "--wait",
                CONTROL_PLANE_WAIT,
            ])
            .env(KIND_NETWORK_ENV, network)
            .stdin(config),
    )
    .await?;
    Ok(())
}

/// Delete a kind cluster. A failing `kind delete` is logged and ignored so
/// the rest of the teardown still runs.
pub async fn delete_kind_cluster<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<()> {
    info!("Deleting kind cluster: {}", name);
    run_best_effort(
        runner,
        Invocation::new("kind").args(["delete", "cluster", "--name", name]),
    )
    .await?;
    Ok(())
}

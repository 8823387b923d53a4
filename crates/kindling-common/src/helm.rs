//! helm wrappers

use std::time::Duration;

use tracing::info;

use crate::exec::run_checked;
use crate::{CommandRunner, Invocation, Result};

/// A chart release installed with `helm upgrade --install`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmRelease {
    /// Release name
    pub name: String,
    /// Chart name inside the repository
    pub chart: String,
    /// Chart repository URL
    pub repo: String,
    /// Pinned chart version
    pub version: String,
    /// Target namespace, created if missing
    pub namespace: String,
    /// Values document, passed on stdin
    pub values: Option<String>,
    /// How long helm waits for resources to become ready
    pub timeout: Duration,
}

impl HelmRelease {
    /// Build the `helm upgrade --install` invocation against `kube_context`
    pub fn upgrade_install_invocation(&self, kube_context: &str) -> Invocation {
        let mut inv = Invocation::new("helm").args([
            "upgrade",
            "--install",
            self.name.as_str(),
            self.chart.as_str(),
            "--repo",
            self.repo.as_str(),
            "--version",
            self.version.as_str(),
            "--namespace",
            self.namespace.as_str(),
            "--create-namespace",
            "--kube-context",
            kube_context,
            "--wait",
        ]);
        inv = inv.arg(format!("--timeout={}s", self.timeout.as_secs()));
        if let Some(values) = &self.values {
            inv = inv.args(["--values", "-"]).stdin(values.as_str());
        }
        inv
    }
}

/// Install or upgrade a release and wait for it to become ready
pub async fn upgrade_install<R: CommandRunner + ?Sized>(
    runner: &R,
    kube_context: &str,
    release: &HelmRelease,
) -> Result<()> {
    info!(
        release = %release.name,
        chart = %release.chart,
        version = %release.version,
        namespace = %release.namespace,
        "helm upgrade --install"
    );
    run_checked(runner, release.upgrade_install_invocation(kube_context)).await?;
    Ok(())
}

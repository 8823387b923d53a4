//! kubectl wrappers bound to a single kube context

use std::time::Duration;

use tracing::debug;

use crate::exec::{run_best_effort, run_checked};
use crate::{CommandRunner, Invocation, Result};

/// kubectl bound to one context, so no call can hit the wrong cluster
pub struct Kubectl<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    context: String,
}

impl<'a, R: CommandRunner + ?Sized> Kubectl<'a, R> {
    /// Bind kubectl to `context`
    pub fn new(runner: &'a R, context: impl Into<String>) -> Self {
        Self {
            runner,
            context: context.into(),
        }
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new("kubectl")
            .args(["--context", self.context.as_str()])
            .args(args)
    }

    /// `kubectl apply -f -` with the manifest on stdin
    pub async fn apply(&self, manifest: &str) -> Result<()> {
        debug!(context = %self.context, bytes = manifest.len(), "kubectl apply");
        run_checked(self.runner, self.invocation(["apply", "-f", "-"]).stdin(manifest)).await?;
        Ok(())
    }

    /// `kubectl apply -f <url>`
    pub async fn apply_url(&self, url: &str) -> Result<()> {
        run_checked(self.runner, self.invocation(["apply", "-f", url])).await?;
        Ok(())
    }

    /// `kubectl wait` for a condition on resources in a namespace.
    ///
    /// `target` is anything kubectl accepts, e.g. `deployment/controller`
    /// or `pod --selector=app=metallb`.
    pub async fn wait(
        &self,
        namespace: &str,
        target: &[&str],
        condition: &str,
        timeout: Duration,
    ) -> Result<()> {
        let invocation = self
            .invocation(["wait", "--namespace", namespace])
            .args(target.iter().copied())
            .arg(format!("--for=condition={}", condition))
            .arg(format!("--timeout={}s", timeout.as_secs()));
        run_checked(self.runner, invocation).await?;
        Ok(())
    }

    /// Read a field with a jsonpath expression. Returns the trimmed value,
    /// empty when the field is not set yet.
    pub async fn get_jsonpath(
        &self,
        namespace: &str,
        resource: &str,
        name: &str,
        jsonpath: &str,
    ) -> Result<String> {
        let stdout = run_checked(
            self.runner,
            self.invocation(["get", resource, name, "--namespace", namespace])
                .arg(format!("-o=jsonpath={}", jsonpath)),
        )
        .await?;
        Ok(stdout.trim().to_string())
    }

    /// Delete a resource, ignoring failure when it does not exist
    pub async fn delete_best_effort(&self, namespace: &str, resource: &str, name: &str) -> Result<()> {
        run_best_effort(
            self.runner,
            self.invocation(["delete", resource, name, "--namespace", namespace]),
        )
        .await
    }

    /// Create a `kubernetes.io/tls` secret from PEM files on disk
    pub async fn create_tls_secret(
        &self,
        namespace: &str,
        name: &str,
        cert_path: &str,
        key_path: &str,
    ) -> Result<()> {
        let cert = format!("--cert={}", cert_path);
        let key = format!("--key={}", key_path);
        run_checked(
            self.runner,
            self.invocation([
                "create",
                "secret",
                "tls",
                name,
                "--namespace",
                namespace,
                cert.as_str(),
                key.as_str(),
            ]),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandOutput, MockCommandRunner};

    #[tokio::test]
    async fn apply_pipes_manifest_with_context() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|inv| {
                inv.starts_with("kubectl", &["--context", "kind-dev", "apply", "-f", "-"])
                    && inv.stdin.as_deref() == Some("kind: Namespace")
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("namespace/x created")));

        Kubectl::new(&runner, "kind-dev")
            .apply("kind: Namespace")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_formats_condition_and_timeout() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|inv| {
                inv.args_line()
                    == "--context kind-dev wait --namespace metallb-system pod \
                        --selector=app=metallb --for=condition=ready --timeout=90s"
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("")));

        Kubectl::new(&runner, "kind-dev")
            .wait(
                "metallb-system",
                &["pod", "--selector=app=metallb"],
                "ready",
                Duration::from_secs(90),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn get_jsonpath_trims_output() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .returning(|_| Ok(CommandOutput::ok("172.30.255.200\n")));

        let ip = Kubectl::new(&runner, "kind-dev")
            .get_jsonpath(
                "ingress-nginx",
                "service",
                "ingress-nginx-controller",
                "{.status.loadBalancer.ingress[0].ip}",
            )
            .await
            .unwrap();
        assert_eq!(ip, "172.30.255.200");
    }

    #[tokio::test]
    async fn delete_best_effort_ignores_not_found() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .returning(|_| Ok(CommandOutput::failed("NotFound")));

        Kubectl::new(&runner, "kind-dev")
            .delete_best_effort("cert-manager", "secret", "ca-key-pair")
            .await
            .unwrap();
    }
}

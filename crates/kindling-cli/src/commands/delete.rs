//! Delete command - Tear down a cluster created by `kindling create`
//!
//! Usage: kindling delete [NAME] [--purge-registry-mirrors] [--purge-ca]
//!
//! Registry mirrors and the local CA are shared between clusters, so they
//! are kept unless a purge flag asks otherwise.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use kindling_common::{docker, CommandRunner, TokioCommandRunner};
use kindling_infra::bootstrap::dns;

use super::{host, kind_utils};
use crate::config::{ClusterArgs, ClusterConfig};
use crate::Result;

/// Delete a cluster and its host DNS entry
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Cluster name [default: dev]
    pub name: Option<String>,

    /// YAML config file the cluster was created with
    #[arg(short = 'f', long = "config")]
    pub config_file: Option<PathBuf>,

    /// Directory holding the local CA [default: current directory]
    #[arg(long, env = "KINDLING_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Leave the dnsmasq entry alone
    #[arg(long)]
    pub no_dns: bool,

    /// Also remove the registry mirror containers and their caches
    #[arg(long)]
    pub purge_registry_mirrors: bool,

    /// Also remove the local CA, including from the host trust store
    #[arg(long)]
    pub purge_ca: bool,
}

pub struct Uninstaller<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: ClusterConfig,
    purge_registry_mirrors: bool,
    purge_ca: bool,
}

impl<'a, R: CommandRunner + ?Sized> Uninstaller<'a, R> {
    pub fn new(
        runner: &'a R,
        config: ClusterConfig,
        purge_registry_mirrors: bool,
        purge_ca: bool,
    ) -> Self {
        Self {
            runner,
            config,
            purge_registry_mirrors,
            purge_ca,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let name = &self.config.name;

        info!("[Step 1] Deleting kind cluster...");
        if kind_utils::cluster_exists(self.runner, name).await? {
            kind_utils::delete_kind_cluster(self.runner, name).await?;
        } else {
            info!("kind cluster '{}' not found", name);
        }

        if self.config.dns {
            info!("[Step 2] Removing dnsmasq entry...");
            host::remove_root_file(self.runner, &dns::dnsmasq_conf_path(name)).await?;
            host::restart_service(self.runner, dns::DNSMASQ_SERVICE).await?;
        }

        if self.purge_registry_mirrors {
            info!("[Step 3] Removing registry mirrors...");
            for mirror in &self.config.registry_mirrors {
                let container = mirror.container_name();
                docker::remove_container(self.runner, &container).await?;
                // The cache volume is named after the container
                docker::remove_volume(self.runner, &container).await?;
            }
        }

        if self.purge_ca {
            info!("[Step 4] Removing local CA...");
            let files = self.config.ca_files();
            remove_if_present(&files.cert)?;
            remove_if_present(&files.key)?;
            if Path::new(host::HOST_CA_PATH).exists() {
                host::untrust_ca(self.runner).await?;
            }
        }

        info!("Cluster '{}' deleted", name);
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn run(args: DeleteArgs) -> Result<()> {
    let cluster_args = ClusterArgs {
        name: args.name,
        config_file: args.config_file,
        state_dir: args.state_dir,
        no_dns: args.no_dns,
        ..Default::default()
    };
    let config = ClusterConfig::resolve(&cluster_args)?;

    let runner = TokioCommandRunner::new();
    Uninstaller::new(&runner, config, args.purge_registry_mirrors, args.purge_ca)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use kindling_common::{CommandOutput, Invocation, MockCommandRunner};
    use kindling_infra::{CaFiles, CertificateAuthority};
    use mockall::predicate::*;
    use mockall::Sequence;

    fn config(state_dir: &Path, no_dns: bool) -> ClusterConfig {
        let args = ClusterArgs {
            state_dir: Some(state_dir.to_path_buf()),
            no_dns,
            ..Default::default()
        };
        ClusterConfig::merge(&args, FileConfig::default()).unwrap()
    }

    fn expect(
        runner: &mut MockCommandRunner,
        seq: &mut Sequence,
        invocation: Invocation,
        output: CommandOutput,
    ) {
        runner
            .expect_output()
            .with(eq(invocation))
            .times(1)
            .in_sequence(seq)
            .returning(move |_| Ok(output.clone()));
    }

    #[tokio::test]
    async fn deletes_cluster_then_dns_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();

        expect(
            &mut runner,
            &mut seq,
            Invocation::new("kind").args(["get", "clusters"]),
            CommandOutput::ok("dev\n"),
        );
        expect(
            &mut runner,
            &mut seq,
            Invocation::new("kind").args(["delete", "cluster", "--name", "dev"]),
            CommandOutput::ok(""),
        );
        expect(
            &mut runner,
            &mut seq,
            Invocation::new("sudo").args(["rm", "-f", "/etc/dnsmasq.d/dev.conf"]),
            CommandOutput::ok(""),
        );
        expect(
            &mut runner,
            &mut seq,
            Invocation::new("sudo").args(["systemctl", "restart", "dnsmasq"]),
            CommandOutput::ok(""),
        );

        Uninstaller::new(&runner, config(dir.path(), false), false, false)
            .run()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_cluster_delete_still_removes_dns_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();

        expect(
            &mut runner,
            &mut seq,
            Invocation::new("kind").args(["get", "clusters"]),
            CommandOutput::ok("dev\n"),
        );
        expect(
            &mut runner,
            &mut seq,
            Invocation::new("kind").args(["delete", "cluster", "--name", "dev"]),
            CommandOutput::failed("failed to delete nodes"),
        );
        expect(
            &mut runner,
            &mut seq,
            Invocation::new("sudo").args(["rm", "-f", "/etc/dnsmasq.d/dev.conf"]),
            CommandOutput::ok(""),
        );
        expect(
            &mut runner,
            &mut seq,
            Invocation::new("sudo").args(["systemctl", "restart", "dnsmasq"]),
            CommandOutput::ok(""),
        );

        Uninstaller::new(&runner, config(dir.path(), false), false, false)
            .run()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_cluster_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();

        expect(
            &mut runner,
            &mut seq,
            Invocation::new("kind").args(["get", "clusters"]),
            CommandOutput::ok(""),
        );

        Uninstaller::new(&runner, config(dir.path(), true), false, false)
            .run()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn purge_removes_mirrors_and_ca() {
        let dir = tempfile::tempdir().unwrap();
        let files = CaFiles::in_state_dir(dir.path());
        CertificateAuthority::new("test CA")
            .unwrap()
            .save(&files)
            .unwrap();

        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|inv| inv.starts_with("kind", &["get", "clusters"]))
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_output()
            .withf(|inv| inv.starts_with("docker", &["rm", "-f"]))
            .times(4)
            .returning(|_| Ok(CommandOutput::failed("No such container")));
        runner
            .expect_output()
            .withf(|inv| inv.starts_with("docker", &["volume", "rm"]))
            .times(4)
            .returning(|_| Ok(CommandOutput::ok("")));

        Uninstaller::new(&runner, config(dir.path(), true), true, true)
            .run()
            .await
            .unwrap();

        assert!(!files.cert.exists());
        assert!(!files.key.exists());
    }
}

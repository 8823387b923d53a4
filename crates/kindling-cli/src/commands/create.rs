//! Create command - Bring up a kind cluster with the full add-on stack
//!
//! Usage: kindling create [NAME] [API_SERVER_PORT] [--workers N] [flags]
//!
//! Steps, in order. Each one checks what already exists first, so a failed
//! run can simply be repeated:
//! 1. Docker network
//! 2. Registry mirror containers
//! 3. Local CA (and optionally the host trust store)
//! 4. kind cluster
//! 5. cert-manager
//! 6. CA ClusterIssuer
//! 7. MetalLB and its address pool
//! 8. ingress-nginx with a wildcard certificate
//! 9. ArgoCD
//! 10. dnsmasq entry for the cluster domain
//! 11. dnsmasq restart

use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use clap::Args;
use tracing::{debug, info};

use kindling_common::docker::{self, ContainerState};
use kindling_common::exec::probe;
use kindling_common::helm;
use kindling_common::kubectl::Kubectl;
use kindling_common::network::MetallbPool;
use kindling_common::poll::wait_with_timeout;
use kindling_common::{
    CommandRunner, Invocation, TokioCommandRunner, ARGOCD_NAMESPACE, CA_SECRET_NAME,
    CERT_MANAGER_NAMESPACE, INGRESS_NAMESPACE, METALLB_NAMESPACE,
};
use kindling_infra::bootstrap::{argocd, cert_manager, dns, ingress, metallb};
use kindling_infra::CertificateAuthority;

use super::{host, kind_utils, render};
use crate::config::{ClusterArgs, ClusterConfig};
use crate::{Error, Result};

/// Subject of the generated CA
pub const CA_COMMON_NAME: &str = "kindling local CA";

const METALLB_READY_TIMEOUT: Duration = Duration::from_secs(120);
const LOAD_BALANCER_IP_TIMEOUT: Duration = Duration::from_secs(180);
const LOAD_BALANCER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Create a cluster and install every add-on
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Print the generated documents and exit without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Pipeline steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Network,
    RegistryMirrors,
    CertificateAuthority,
    Cluster,
    CertManager,
    CaIssuer,
    Metallb,
    Ingress,
    Argocd,
    Dns,
    RestartDns,
}

impl Step {
    pub const ALL: [Step; 11] = [
        Step::Network,
        Step::RegistryMirrors,
        Step::CertificateAuthority,
        Step::Cluster,
        Step::CertManager,
        Step::CaIssuer,
        Step::Metallb,
        Step::Ingress,
        Step::Argocd,
        Step::Dns,
        Step::RestartDns,
    ];

    /// Short name used in errors
    pub fn name(&self) -> &'static str {
        match self {
            Step::Network => "network",
            Step::RegistryMirrors => "registry-mirrors",
            Step::CertificateAuthority => "ca",
            Step::Cluster => "cluster",
            Step::CertManager => "cert-manager",
            Step::CaIssuer => "ca-issuer",
            Step::Metallb => "metallb",
            Step::Ingress => "ingress",
            Step::Argocd => "argocd",
            Step::Dns => "dns",
            Step::RestartDns => "dns-restart",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Step::Network => "Ensuring docker network",
            Step::RegistryMirrors => "Ensuring registry mirrors",
            Step::CertificateAuthority => "Ensuring local CA",
            Step::Cluster => "Creating kind cluster",
            Step::CertManager => "Installing cert-manager",
            Step::CaIssuer => "Creating CA issuer",
            Step::Metallb => "Installing MetalLB",
            Step::Ingress => "Installing ingress-nginx",
            Step::Argocd => "Installing ArgoCD",
            Step::Dns => "Configuring dnsmasq",
            Step::RestartDns => "Restarting dnsmasq",
        }
    }

    fn enabled(&self, config: &ClusterConfig) -> bool {
        match self {
            Step::RegistryMirrors => !config.registry_mirrors.is_empty(),
            Step::Argocd => config.argocd,
            Step::Dns | Step::RestartDns => config.dns,
            _ => true,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Installer<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: ClusterConfig,
}

impl<'a, R: CommandRunner + ?Sized> Installer<'a, R> {
    pub fn new(runner: &'a R, config: ClusterConfig) -> Self {
        Self { runner, config }
    }

    fn kubectl(&self) -> Kubectl<'a, R> {
        Kubectl::new(self.runner, self.config.kube_context())
    }

    /// Run the whole pipeline, stopping at the first failed step
    pub async fn run(&self) -> Result<()> {
        let start = Instant::now();

        self.check_prerequisites().await?;

        for (index, step) in Step::ALL.iter().enumerate() {
            let number = index + 1;
            if !step.enabled(&self.config) {
                info!("[Step {}] Skipping {} (disabled)", number, step);
                continue;
            }
            info!("[Step {}] {}...", number, step.description());
            self.run_step(*step)
                .await
                .map_err(|e| Error::step(step.name(), &e))?;
        }

        info!(
            "Cluster '{}' ready in {:?}",
            self.config.name,
            start.elapsed()
        );
        info!("kubectl context: {}", self.config.kube_context());
        if self.config.argocd {
            info!(
                "ArgoCD: https://{}",
                argocd::argocd_hostname(&self.config.domain)
            );
            info!(
                "ArgoCD admin password: kubectl --context {} -n {} get secret argocd-initial-admin-secret -o jsonpath='{{.data.password}}' | base64 -d",
                self.config.kube_context(),
                ARGOCD_NAMESPACE
            );
        }

        Ok(())
    }

    async fn run_step(&self, step: Step) -> Result<()> {
        match step {
            Step::Network => self.ensure_network().await,
            Step::RegistryMirrors => self.ensure_registry_mirrors().await,
            Step::CertificateAuthority => self.ensure_ca().await,
            Step::Cluster => self.ensure_cluster().await,
            Step::CertManager => self.install_cert_manager().await,
            Step::CaIssuer => self.install_ca_issuer().await,
            Step::Metallb => self.install_metallb().await,
            Step::Ingress => self.install_ingress().await,
            Step::Argocd => self.install_argocd().await,
            Step::Dns => self.configure_dns().await,
            Step::RestartDns => host::restart_service(self.runner, dns::DNSMASQ_SERVICE).await,
        }
    }

    async fn check_prerequisites(&self) -> Result<()> {
        info!("Checking prerequisites...");

        let mut tools = vec![
            (
                "docker",
                "Install Docker: https://docs.docker.com/get-docker/",
            ),
            (
                "kind",
                "Install kind: https://kind.sigs.k8s.io/docs/user/quick-start/#installation",
            ),
            (
                "kubectl",
                "Install kubectl: https://kubernetes.io/docs/tasks/tools/",
            ),
            ("helm", "Install helm: https://helm.sh/docs/intro/install/"),
        ];
        if self.config.dns || self.config.trust_ca {
            tools.push(("sudo", "Host changes need sudo"));
        }
        if self.config.dns {
            tools.push(("systemctl", "dnsmasq is managed through systemd; use --no-dns"));
        }

        for (tool, hint) in tools {
            if !self.check_tool(tool).await? {
                return Err(Error::command_failed(format!(
                    "{} not found. {}",
                    tool, hint
                )));
            }
        }

        if !docker::daemon_reachable(self.runner).await? {
            return Err(Error::command_failed(
                "docker daemon is not reachable. Is it running?",
            ));
        }

        Ok(())
    }

    async fn check_tool(&self, tool: &str) -> Result<bool> {
        Ok(probe(self.runner, Invocation::new("which").arg(tool)).await?)
    }

    async fn ensure_network(&self) -> Result<()> {
        let network = &self.config.network;
        if docker::network_exists(self.runner, network).await? {
            info!("Network '{}' already exists", network);
            return Ok(());
        }
        docker::create_network(self.runner, network, &self.config.subnet.to_string()).await?;
        Ok(())
    }

    async fn ensure_registry_mirrors(&self) -> Result<()> {
        let network = &self.config.network;

        for mirror in &self.config.registry_mirrors {
            let name = mirror.container_name();
            match docker::container_state(self.runner, &name).await? {
                ContainerState::Running => {
                    debug!(container = %name, "mirror already running");
                    docker::connect_network(self.runner, network, &name).await?;
                }
                ContainerState::Stopped => {
                    info!(container = %name, "Starting stopped mirror");
                    docker::start_container(self.runner, &name).await?;
                    docker::connect_network(self.runner, network, &name).await?;
                }
                ContainerState::Missing => {
                    docker::run_container(self.runner, &mirror.container_spec(network)).await?;
                }
            }
        }

        Ok(())
    }

    async fn ensure_ca(&self) -> Result<()> {
        let files = self.config.ca_files();
        let (ca, _generated) = CertificateAuthority::load_or_generate(&files, CA_COMMON_NAME)?;

        if ca.cert_info()?.is_expired() {
            return Err(Error::validation(format!(
                "local CA at {} has expired; run `kindling delete --purge-ca` to replace it",
                files.cert.display()
            )));
        }

        if self.config.trust_ca {
            host::trust_ca(self.runner, &files.cert).await?;
        }
        Ok(())
    }

    async fn ensure_cluster(&self) -> Result<()> {
        let name = &self.config.name;
        if kind_utils::cluster_exists(self.runner, name).await? {
            info!("kind cluster '{}' already exists, reusing it", name);
            return Ok(());
        }

        let kind_config = self.config.kind_cluster().render()?;
        kind_utils::create_kind_cluster(self.runner, name, &kind_config, &self.config.network)
            .await
    }

    async fn install_cert_manager(&self) -> Result<()> {
        helm::upgrade_install(
            self.runner,
            &self.config.kube_context(),
            &cert_manager::cert_manager_release(),
        )
        .await?;
        Ok(())
    }

    async fn install_ca_issuer(&self) -> Result<()> {
        let files = self.config.ca_files();
        let kubectl = self.kubectl();

        kubectl
            .delete_best_effort(CERT_MANAGER_NAMESPACE, "secret", CA_SECRET_NAME)
            .await?;
        kubectl
            .create_tls_secret(
                CERT_MANAGER_NAMESPACE,
                CA_SECRET_NAME,
                &files.cert.to_string_lossy(),
                &files.key.to_string_lossy(),
            )
            .await?;
        kubectl.apply(&cert_manager::cluster_issuer()?).await?;
        Ok(())
    }

    async fn install_metallb(&self) -> Result<()> {
        let kubectl = self.kubectl();

        kubectl.apply_url(&metallb::manifest_url()).await?;
        // The controller deployment exists as soon as the manifest is
        // applied; its pods may not, so wait on it before selecting pods.
        kubectl
            .wait(
                METALLB_NAMESPACE,
                &["deployment/controller"],
                "available",
                METALLB_READY_TIMEOUT,
            )
            .await?;
        kubectl
            .wait(
                METALLB_NAMESPACE,
                &["pod", metallb::METALLB_POD_SELECTOR],
                "ready",
                METALLB_READY_TIMEOUT,
            )
            .await?;

        let pool = self.metallb_pool().await?;
        info!("MetalLB address pool: {}", pool);
        kubectl.apply(&metallb::pool_manifests(&pool)?).await?;
        Ok(())
    }

    /// The configured override, else derived from the network as docker
    /// reports it. A pre-existing network may not use the configured subnet.
    async fn metallb_pool(&self) -> Result<MetallbPool> {
        if let Some(pool) = self.config.metallb_pool {
            return Ok(pool);
        }
        let subnets = docker::network_subnets(self.runner, &self.config.network).await?;
        Ok(MetallbPool::from_docker_subnets(&subnets)?)
    }

    async fn install_ingress(&self) -> Result<()> {
        self.kubectl()
            .apply(&ingress::wildcard_certificate(&self.config.domain)?)
            .await?;
        helm::upgrade_install(
            self.runner,
            &self.config.kube_context(),
            &ingress::ingress_nginx_release()?,
        )
        .await?;
        Ok(())
    }

    async fn install_argocd(&self) -> Result<()> {
        helm::upgrade_install(
            self.runner,
            &self.config.kube_context(),
            &argocd::argocd_release(&self.config.domain)?,
        )
        .await?;
        Ok(())
    }

    async fn configure_dns(&self) -> Result<()> {
        let ip = self.wait_for_ingress_ip().await?;
        info!("{} -> {}", self.config.domain, ip);

        host::write_root_file(
            self.runner,
            &dns::dnsmasq_conf_path(&self.config.name),
            &dns::dnsmasq_entry(&self.config.domain, ip),
        )
        .await
    }

    async fn wait_for_ingress_ip(&self) -> Result<Ipv4Addr> {
        let kubectl = self.kubectl();
        let kubectl = &kubectl;

        let ip = wait_with_timeout(
            LOAD_BALANCER_IP_TIMEOUT,
            LOAD_BALANCER_POLL_INTERVAL,
            "ingress LoadBalancer IP",
            move || async move {
                let raw = kubectl
                    .get_jsonpath(
                        INGRESS_NAMESPACE,
                        "service",
                        ingress::CONTROLLER_SERVICE,
                        "{.status.loadBalancer.ingress[0].ip}",
                    )
                    .await?;
                if raw.is_empty() {
                    return Ok(None);
                }
                raw.parse::<Ipv4Addr>().map(Some).map_err(|_| {
                    kindling_common::Error::validation(format!(
                        "ingress LoadBalancer address '{}' is not an IPv4 address",
                        raw
                    ))
                })
            },
        )
        .await?;
        Ok(ip)
    }
}

pub async fn run(args: CreateArgs) -> Result<()> {
    let config = ClusterConfig::resolve(&args.cluster)?;

    info!("Cluster: {}", config.name);
    info!("API server port: {}", config.api_server_port);
    info!("Workers: {}", config.workers);
    info!("Domain: {}", config.domain);
    info!("State dir: {}", config.state_dir.display());

    if args.dry_run {
        info!("Dry run - printing generated documents only");
        print!("{}", render::render_plan(&config)?);
        return Ok(());
    }

    let runner = TokioCommandRunner::new();
    Installer::new(&runner, config).run().await
}

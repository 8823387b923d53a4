//! Render command - print every generated document without touching anything
//!
//! Usage: kindling render [NAME] [API_SERVER_PORT] [flags]
//!
//! The MetalLB pool and the dnsmasq entry are computed from the configured
//! subnet. At install time they come from the actual docker network and the
//! IP MetalLB hands out, which normally is the first pool address.

use clap::Args;

use kindling_common::docker::ContainerSpec;
use kindling_common::network::MetallbPool;
use kindling_infra::bootstrap::{argocd, cert_manager, dns, ingress, metallb};

use crate::config::{ClusterArgs, ClusterConfig};
use crate::Result;

/// Print the generated documents
#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

/// One rendered artifact and how it is used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// What the body is fed to
    pub title: String,
    /// Newline-terminated contents
    pub body: String,
}

impl Document {
    fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        Self {
            title: title.into(),
            body,
        }
    }
}

/// Every document `create` would use, in pipeline order
pub fn plan(config: &ClusterConfig) -> Result<Vec<Document>> {
    let context = config.kube_context();
    let mut docs = Vec::new();

    for mirror in &config.registry_mirrors {
        let spec: ContainerSpec = mirror.container_spec(&config.network);
        let run = spec.run_invocation();
        docs.push(Document::new(
            format!("registry mirror for {}", mirror.registry),
            format!("{} {}", run.program, run.args_line()),
        ));
    }

    docs.push(Document::new(
        format!("kind create cluster --name {} --config -", config.name),
        config.kind_cluster().render()?,
    ));

    let release = cert_manager::cert_manager_release();
    docs.push(helm_document(&release, &context));

    docs.push(Document::new(
        "kubectl apply -f - (CA issuer)",
        cert_manager::cluster_issuer()?,
    ));

    let pool = match config.metallb_pool {
        Some(pool) => pool,
        None => MetallbPool::from_subnet(&config.subnet)?,
    };
    docs.push(Document::new(
        format!("kubectl apply -f {}", metallb::manifest_url()),
        String::new(),
    ));
    docs.push(Document::new(
        format!("kubectl apply -f - (MetalLB pool {})", pool),
        metallb::pool_manifests(&pool)?,
    ));

    docs.push(Document::new(
        "kubectl apply -f - (wildcard certificate)",
        ingress::wildcard_certificate(&config.domain)?,
    ));
    docs.push(helm_document(&ingress::ingress_nginx_release()?, &context));

    if config.argocd {
        docs.push(helm_document(&argocd::argocd_release(&config.domain)?, &context));
    }

    if config.dns {
        docs.push(Document::new(
            format!("{} (expected IP)", dns::dnsmasq_conf_path(&config.name).display()),
            dns::dnsmasq_entry(&config.domain, pool.start),
        ));
    }

    Ok(docs)
}

fn helm_document(release: &kindling_common::helm::HelmRelease, context: &str) -> Document {
    let invocation = release.upgrade_install_invocation(context);
    Document::new(
        format!("{} {}", invocation.program, invocation.args_line()),
        release.values.clone().unwrap_or_default(),
    )
}

/// The plan as one printable stream, each document under a `# ==>` header
pub fn render_plan(config: &ClusterConfig) -> Result<String> {
    let mut out = String::new();
    for doc in plan(config)? {
        out.push_str("# ==> ");
        out.push_str(&doc.title);
        out.push('\n');
        if doc.body.trim().is_empty() {
            continue;
        }
        out.push_str(&doc.body);
    }
    Ok(out)
}

pub fn run(args: RenderArgs) -> Result<()> {
    let config = ClusterConfig::resolve(&args.cluster)?;
    print!("{}", render_plan(&config)?);
    Ok(())
}

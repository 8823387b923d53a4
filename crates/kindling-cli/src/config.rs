//! Cluster configuration
//!
//! Resolution order (highest priority first):
//! 1. Command-line flags and their `KINDLING_*` environment variables
//! 2. The YAML file passed with `-f`
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Deserialize;

use kindling_common::network::{Ipv4Cidr, MetallbPool};
use kindling_infra::bootstrap::kind::{KindClusterConfig, DEFAULT_NODE_IMAGE};
use kindling_infra::bootstrap::registry::{default_mirrors, RegistryMirror};
use kindling_infra::CaFiles;

use crate::{Error, Result};

pub const DEFAULT_NAME: &str = "dev";
pub const DEFAULT_API_SERVER_PORT: u16 = 6443;
pub const DEFAULT_WORKERS: u32 = 2;
pub const DEFAULT_NETWORK: &str = "kind";
pub const DEFAULT_SUBNET: &str = "172.30.0.0/16";

/// Longest accepted cluster name. Node containers are named
/// `<name>-control-plane` / `<name>-worker<N>` and must stay DNS labels.
const MAX_NAME_LEN: usize = 40;

const MAX_LABEL_LEN: usize = 63;

const MAX_DOMAIN_LEN: usize = 253;

/// Flags shared by `create` and `render`
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Cluster name [default: dev]
    pub name: Option<String>,

    /// Host port the Kubernetes API server is published on [default: 6443]
    pub api_server_port: Option<u16>,

    /// YAML config file
    #[arg(short = 'f', long = "config")]
    pub config_file: Option<PathBuf>,

    /// Number of worker nodes [default: 2]
    #[arg(short = 'w', long, env = "KINDLING_WORKERS")]
    pub workers: Option<u32>,

    /// Node image for every node
    #[arg(long, env = "KINDLING_NODE_IMAGE")]
    pub node_image: Option<String>,

    /// Docker network the nodes and registry mirrors join [default: kind]
    #[arg(long)]
    pub network: Option<String>,

    /// Subnet used when the network has to be created [default: 172.30.0.0/16]
    #[arg(long)]
    pub subnet: Option<String>,

    /// DNS domain served by the ingress [default: <name>.internal]
    #[arg(long, env = "KINDLING_DOMAIN")]
    pub domain: Option<String>,

    /// Directory holding the local CA [default: current directory]
    #[arg(long, env = "KINDLING_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// MetalLB address range `start-end`, overriding the derived one
    #[arg(long)]
    pub metallb_pool: Option<String>,

    /// Pull images directly instead of through local mirrors
    #[arg(long)]
    pub no_registry_mirrors: bool,

    /// Skip the ArgoCD install
    #[arg(long)]
    pub no_argocd: bool,

    /// Skip the dnsmasq entry
    #[arg(long)]
    pub no_dns: bool,

    /// Install the local CA into the host trust store (uses sudo)
    #[arg(long)]
    pub trust_ca: bool,
}

/// Config file layout. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub name: Option<String>,
    pub api_server_port: Option<u16>,
    pub workers: Option<u32>,
    pub node_image: Option<String>,
    pub network: Option<String>,
    pub subnet: Option<String>,
    pub domain: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub metallb_pool: Option<String>,
    /// Upstreams to mirror. An empty list disables mirrors.
    pub registry_mirrors: Option<Vec<MirrorEntry>>,
    pub argocd: Option<bool>,
    pub dns: Option<bool>,
    pub trust_ca: Option<bool>,
}

/// One `registry_mirrors` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorEntry {
    pub registry: String,
    pub remote_url: String,
}

impl FileConfig {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(path, &data)
    }

    fn parse(path: &Path, data: &str) -> Result<Self> {
        // An empty file deserializes to unit, not a mapping
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,
    pub api_server_port: u16,
    pub workers: u32,
    pub node_image: String,
    pub network: String,
    pub subnet: Ipv4Cidr,
    pub domain: String,
    /// Absolute
    pub state_dir: PathBuf,
    /// User override; `None` derives the pool from the network subnet
    pub metallb_pool: Option<MetallbPool>,
    pub registry_mirrors: Vec<RegistryMirror>,
    pub argocd: bool,
    pub dns: bool,
    pub trust_ca: bool,
}

impl ClusterConfig {
    /// Resolve flags against the optional config file and defaults
    pub fn resolve(args: &ClusterArgs) -> Result<Self> {
        let file = match &args.config_file {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Merge flags over an already-parsed file
    pub fn merge(args: &ClusterArgs, file: FileConfig) -> Result<Self> {
        let name = args
            .name
            .clone()
            .or(file.name)
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        validate_name(&name)?;

        let api_server_port = args
            .api_server_port
            .or(file.api_server_port)
            .unwrap_or(DEFAULT_API_SERVER_PORT);
        if api_server_port == 0 {
            return Err(Error::validation("api server port must be non-zero"));
        }

        let domain = args
            .domain
            .clone()
            .or(file.domain)
            .unwrap_or_else(|| format!("{}.internal", name));
        validate_domain(&domain)?;

        let subnet = args
            .subnet
            .clone()
            .or(file.subnet)
            .unwrap_or_else(|| DEFAULT_SUBNET.to_string());
        let subnet = Ipv4Cidr::parse(&subnet)?;

        let metallb_pool = args
            .metallb_pool
            .clone()
            .or(file.metallb_pool)
            .map(|range| MetallbPool::parse(&range))
            .transpose()?;

        let state_dir = args
            .state_dir
            .clone()
            .or(file.state_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let state_dir = std::path::absolute(&state_dir)?;

        let registry_mirrors = if args.no_registry_mirrors {
            Vec::new()
        } else {
            match file.registry_mirrors {
                Some(entries) => entries
                    .into_iter()
                    .map(|e| RegistryMirror::new(e.registry, e.remote_url))
                    .collect(),
                None => default_mirrors(),
            }
        };

        Ok(Self {
            name,
            api_server_port,
            workers: args.workers.or(file.workers).unwrap_or(DEFAULT_WORKERS),
            node_image: args
                .node_image
                .clone()
                .or(file.node_image)
                .unwrap_or_else(|| DEFAULT_NODE_IMAGE.to_string()),
            network: args
                .network
                .clone()
                .or(file.network)
                .unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            subnet,
            domain,
            state_dir,
            metallb_pool,
            registry_mirrors,
            argocd: !args.no_argocd && file.argocd.unwrap_or(true),
            dns: !args.no_dns && file.dns.unwrap_or(true),
            trust_ca: args.trust_ca || file.trust_ca.unwrap_or(false),
        })
    }

    /// kubectl/helm context of the cluster
    pub fn kube_context(&self) -> String {
        kindling_common::kube_context(&self.name)
    }

    /// Local CA key pair location
    pub fn ca_files(&self) -> CaFiles {
        CaFiles::in_state_dir(&self.state_dir)
    }

    /// Input for the kind cluster config. The local CA is always mounted.
    pub fn kind_cluster(&self) -> KindClusterConfig {
        KindClusterConfig {
            name: self.name.clone(),
            api_server_port: self.api_server_port,
            workers: self.workers,
            node_image: self.node_image.clone(),
            mirrors: self.registry_mirrors.clone(),
            ca_cert_path: Some(self.ca_files().cert),
        }
    }
}

/// kind names end up in container names, the kube context and the dnsmasq
/// drop-in file name.
fn validate_name(name: &str) -> Result<()> {
    if !is_dns_label(name, MAX_NAME_LEN) {
        return Err(Error::validation(format!(
            "invalid cluster name '{}': use 1-{} lowercase letters, digits or '-', \
             starting and ending with a letter or digit",
            name, MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// The domain becomes certificate SANs, ingress hosts and a dnsmasq
/// `address=` rule, so every dot-separated part must be a DNS label.
fn validate_domain(domain: &str) -> Result<()> {
    let valid = domain.len() <= MAX_DOMAIN_LEN
        && domain.split('.').all(|label| is_dns_label(label, MAX_LABEL_LEN));
    if !valid {
        return Err(Error::validation(format!(
            "invalid domain '{}': each dot-separated label needs 1-{} lowercase letters, \
             digits or '-', starting and ending with a letter or digit",
            domain, MAX_LABEL_LEN
        )));
    }
    Ok(())
}

/// RFC 1123 label, restricted to lowercase
fn is_dns_label(label: &str, max_len: usize) -> bool {
    let valid_chars = label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = label
        .chars()
        .next()
        .zip(label.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    valid_chars && valid_edges && label.len() <= max_len
}

//! kind cluster configuration

use std::path::PathBuf;

use minijinja::context;

use super::registry::{containerd_config_patch, RegistryMirror};
use super::{render, RenderError};

/// Default node image
pub const DEFAULT_NODE_IMAGE: &str = "kindest/node:v1.31.0";

/// Where the local CA is mounted inside every node. Go-based components
/// (containerd, kubelet) scan `/etc/ssl/certs` for extra roots.
pub const CA_NODE_PATH: &str = "/etc/ssl/certs/kindling-ca.pem";

const KIND_CLUSTER_TEMPLATE: &str = include_str!("../../templates/kind-cluster.yaml");

/// Everything that shapes the kind cluster config
#[derive(Debug, Clone)]
pub struct KindClusterConfig {
    /// Cluster name
    pub name: String,
    /// Host port of the API server
    pub api_server_port: u16,
    /// Number of worker nodes besides the control plane
    pub workers: u32,
    /// Node image for every node
    pub node_image: String,
    /// Registry mirrors nodes pull through
    pub mirrors: Vec<RegistryMirror>,
    /// Absolute host path of the CA certificate to mount into nodes
    pub ca_cert_path: Option<PathBuf>,
}

impl KindClusterConfig {
    /// Render the `kind.x-k8s.io/v1alpha4` Cluster document
    pub fn render(&self) -> Result<String, RenderError> {
        let ca_cert_path = self
            .ca_cert_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        render(
            "kind-cluster",
            KIND_CLUSTER_TEMPLATE,
            context! {
                name => &self.name,
                api_server_port => self.api_server_port,
                workers => self.workers,
                node_image => &self.node_image,
                containerd_patch => containerd_config_patch(&self.mirrors),
                ca_cert_path => ca_cert_path,
                ca_node_path => CA_NODE_PATH,
            },
        )
    }
}

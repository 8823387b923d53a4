//! cert-manager release and the CA-backed ClusterIssuer

use std::time::Duration;

use kindling_common::helm::HelmRelease;
use kindling_common::{CA_ISSUER_NAME, CA_SECRET_NAME, CERT_MANAGER_NAMESPACE};
use minijinja::context;

use super::{render, RenderError};

/// Pinned cert-manager chart version
pub const CERT_MANAGER_VERSION: &str = "v1.15.3";

const CERT_MANAGER_REPO: &str = "https://charts.jetstack.io";

const CLUSTER_ISSUER_TEMPLATE: &str = include_str!("../../templates/cluster-issuer.yaml");

/// cert-manager Helm release, CRDs included
pub fn cert_manager_release() -> HelmRelease {
    HelmRelease {
        name: "cert-manager".to_string(),
        chart: "cert-manager".to_string(),
        repo: CERT_MANAGER_REPO.to_string(),
        version: CERT_MANAGER_VERSION.to_string(),
        namespace: CERT_MANAGER_NAMESPACE.to_string(),
        values: Some("crds:\n  enabled: true\n".to_string()),
        timeout: Duration::from_secs(300),
    }
}

/// ClusterIssuer signing with the CA stored in [`CA_SECRET_NAME`]
pub fn cluster_issuer() -> Result<String, RenderError> {
    render(
        "cluster-issuer",
        CLUSTER_ISSUER_TEMPLATE,
        context! {
            issuer => CA_ISSUER_NAME,
            secret => CA_SECRET_NAME,
        },
    )
}

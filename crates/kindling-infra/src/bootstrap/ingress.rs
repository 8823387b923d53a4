//! ingress-nginx release
//!
//! The controller is exposed through a MetalLB `LoadBalancer` service and
//! serves a wildcard certificate for the cluster domain by default.

use std::time::Duration;

use kindling_common::helm::HelmRelease;
use kindling_common::{CA_ISSUER_NAME, INGRESS_NAMESPACE};
use minijinja::context;

use super::{render, RenderError};

/// Pinned ingress-nginx chart version
pub const INGRESS_NGINX_VERSION: &str = "4.11.2";

/// IngressClass created by the chart
pub const INGRESS_CLASS: &str = "nginx";

/// Service whose LoadBalancer IP the DNS entry points at
pub const CONTROLLER_SERVICE: &str = "ingress-nginx-controller";

/// Secret holding the `*.<domain>` certificate
pub const WILDCARD_TLS_SECRET: &str = "wildcard-tls";

const INGRESS_NGINX_REPO: &str = "https://kubernetes.github.io/ingress-nginx";

const VALUES_TEMPLATE: &str = include_str!("../../templates/ingress-nginx-values.yaml");
const WILDCARD_TEMPLATE: &str = include_str!("../../templates/wildcard-certificate.yaml");

/// Namespace plus the cert-manager Certificate for `*.<domain>`.
///
/// Applied before the chart so the controller starts with its default
/// certificate already requested.
pub fn wildcard_certificate(domain: &str) -> Result<String, RenderError> {
    render(
        "wildcard-certificate",
        WILDCARD_TEMPLATE,
        context! {
            namespace => INGRESS_NAMESPACE,
            secret => WILDCARD_TLS_SECRET,
            domain => domain,
            issuer => CA_ISSUER_NAME,
        },
    )
}

/// ingress-nginx Helm release
pub fn ingress_nginx_release() -> Result<HelmRelease, RenderError> {
    let values = render(
        "ingress-nginx-values",
        VALUES_TEMPLATE,
        context! {
            ingress_class => INGRESS_CLASS,
            namespace => INGRESS_NAMESPACE,
            default_tls_secret => WILDCARD_TLS_SECRET,
        },
    )?;

    Ok(HelmRelease {
        name: "ingress-nginx".to_string(),
        chart: "ingress-nginx".to_string(),
        repo: INGRESS_NGINX_REPO.to_string(),
        version: INGRESS_NGINX_VERSION.to_string(),
        namespace: INGRESS_NAMESPACE.to_string(),
        values: Some(values),
        timeout: Duration::from_secs(300),
    })
}

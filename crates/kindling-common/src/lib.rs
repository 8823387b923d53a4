//! Common building blocks for kindling: errors, the external command seam,
//! thin wrappers around `docker`, `kubectl` and `helm`, and network arithmetic.

#![deny(missing_docs)]

pub mod docker;
pub mod error;
pub mod exec;
pub mod helm;
pub mod kubectl;
pub mod network;
pub mod poll;

pub use error::Error;
pub use exec::{CommandOutput, CommandRunner, Invocation, TokioCommandRunner};

#[cfg(any(test, feature = "mock"))]
pub use exec::MockCommandRunner;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace cert-manager is installed into
pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";

/// Namespace MetalLB is installed into
pub const METALLB_NAMESPACE: &str = "metallb-system";

/// Namespace ingress-nginx is installed into
pub const INGRESS_NAMESPACE: &str = "ingress-nginx";

/// Namespace ArgoCD is installed into
pub const ARGOCD_NAMESPACE: &str = "argocd";

/// Name of the TLS secret holding the local CA key pair
pub const CA_SECRET_NAME: &str = "ca-key-pair";

/// Name of the cert-manager ClusterIssuer backed by the local CA
pub const CA_ISSUER_NAME: &str = "ca-issuer";

/// kubectl context name kind registers for a cluster
pub fn kube_context(cluster_name: &str) -> String {
    format!("kind-{}", cluster_name)
}

//! Infrastructure generation for kindling
//!
//! Everything in this crate is pure: it turns configuration into the text
//! and parameters handed to external tools, and never runs them itself.
//!
//! - **PKI**: the local certificate authority cert-manager issues from
//! - **Bootstrap**: kind cluster config, registry mirrors, and add-on
//!   manifests / Helm releases (cert-manager, MetalLB, ingress-nginx, ArgoCD)
//!   plus the dnsmasq entry

pub mod bootstrap;
pub mod pki;

pub use bootstrap::RenderError;
pub use pki::{CaFiles, CertificateAuthority, PkiError};

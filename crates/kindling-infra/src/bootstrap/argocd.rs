//! ArgoCD release, exposed at `argocd.<domain>`

use std::time::Duration;

use kindling_common::helm::HelmRelease;
use kindling_common::{ARGOCD_NAMESPACE, CA_ISSUER_NAME};
use minijinja::context;

use super::ingress::INGRESS_CLASS;
use super::{render, RenderError};

/// Pinned argo-cd chart version
pub const ARGOCD_CHART_VERSION: &str = "7.6.8";

const ARGO_HELM_REPO: &str = "https://argoproj.github.io/argo-helm";

const VALUES_TEMPLATE: &str = include_str!("../../templates/argocd-values.yaml");

/// Host the ArgoCD UI is served on
pub fn argocd_hostname(domain: &str) -> String {
    format!("argocd.{}", domain)
}

/// argo-cd Helm release. TLS terminates at ingress-nginx with a certificate
/// from the CA issuer, so the server itself runs insecure.
pub fn argocd_release(domain: &str) -> Result<HelmRelease, RenderError> {
    let values = render(
        "argocd-values",
        VALUES_TEMPLATE,
        context! {
            ingress_class => INGRESS_CLASS,
            hostname => argocd_hostname(domain),
            issuer => CA_ISSUER_NAME,
        },
    )?;

    Ok(HelmRelease {
        name: "argocd".to_string(),
        chart: "argo-cd".to_string(),
        repo: ARGO_HELM_REPO.to_string(),
        version: ARGOCD_CHART_VERSION.to_string(),
        namespace: ARGOCD_NAMESPACE.to_string(),
        values: Some(values),
        timeout: Duration::from_secs(600),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_uses_domain_and_issuer() {
        let release = argocd_release("dev.internal").unwrap();
        assert_eq!(release.chart, "argo-cd");
        assert_eq!(release.namespace, "argocd");

        let values: serde_yaml::Value =
            serde_yaml::from_str(release.values.as_deref().unwrap()).unwrap();
        let ingress = &values["server"]["ingress"];
        assert_eq!(ingress["enabled"], true);
        assert_eq!(ingress["hostname"], "argocd.dev.internal");
        assert_eq!(ingress["ingressClassName"], "nginx");
        assert_eq!(
            ingress["annotations"]["cert-manager.io/cluster-issuer"],
            CA_ISSUER_NAME
        );
        assert_eq!(ingress["tls"], true);
        assert_eq!(values["configs"]["params"]["server.insecure"], true);
    }
}

//! MetalLB native manifest and the L2 address pool

use kindling_common::network::MetallbPool;
use kindling_common::METALLB_NAMESPACE;
use minijinja::context;

use super::{render, RenderError};

/// Pinned MetalLB version
pub const METALLB_VERSION: &str = "v0.14.8";

/// Name shared by the IPAddressPool and its L2Advertisement
pub const POOL_NAME: &str = "kindling-pool";

/// Label selecting every MetalLB pod
pub const METALLB_POD_SELECTOR: &str = "--selector=app=metallb";

const METALLB_POOL_TEMPLATE: &str = include_str!("../../templates/metallb-pool.yaml");

/// URL of the upstream native (non-FRR) manifest
pub fn manifest_url() -> String {
    format!(
        "https://raw.githubusercontent.com/metallb/metallb/{}/config/manifests/metallb-native.yaml",
        METALLB_VERSION
    )
}

/// IPAddressPool and L2Advertisement for `pool`
pub fn pool_manifests(pool: &MetallbPool) -> Result<String, RenderError> {
    render(
        "metallb-pool",
        METALLB_POOL_TEMPLATE,
        context! {
            pool_name => POOL_NAME,
            namespace => METALLB_NAMESPACE,
            addresses => pool.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindling_common::network::Ipv4Cidr;
    use serde::Deserialize;

    #[test]
    fn manifest_url_is_pinned() {
        assert!(manifest_url().contains(METALLB_VERSION));
        assert!(manifest_url().ends_with("metallb-native.yaml"));
    }

    #[test]
    fn pool_carries_derived_range() {
        let pool = MetallbPool::from_subnet(&Ipv4Cidr::parse("172.30.0.0/16").unwrap()).unwrap();
        let rendered = pool_manifests(&pool).unwrap();

        let docs: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&rendered)
            .map(|d| serde_yaml::Value::deserialize(d).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0]["kind"], "IPAddressPool");
        assert_eq!(docs[0]["metadata"]["namespace"], METALLB_NAMESPACE);
        assert_eq!(
            docs[0]["spec"]["addresses"][0],
            "172.30.255.200-172.30.255.250"
        );

        assert_eq!(docs[1]["kind"], "L2Advertisement");
        assert_eq!(docs[1]["spec"]["ipAddressPools"][0], POOL_NAME);
    }
}

//! Pull-through registry mirrors
//!
//! Each upstream registry gets a `registry:2` container in proxy mode on the
//! kind network. Nodes reach it by container name through containerd's
//! mirror configuration, so images are pulled from the internet once per
//! host rather than once per cluster.

use kindling_common::docker::ContainerSpec;

/// Image run for every mirror
pub const REGISTRY_IMAGE: &str = "registry:2";

/// Port the registry listens on inside the container
pub const REGISTRY_PORT: u16 = 5000;

/// Upstream registries mirrored by default, as (registry host, remote URL)
pub const DEFAULT_UPSTREAMS: &[(&str, &str)] = &[
    ("docker.io", "https://registry-1.docker.io"),
    ("quay.io", "https://quay.io"),
    ("ghcr.io", "https://ghcr.io"),
    ("registry.k8s.io", "https://registry.k8s.io"),
];

/// One mirror container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryMirror {
    /// Registry host as referenced by image names (e.g. `docker.io`)
    pub registry: String,
    /// URL the proxy pulls from
    pub remote_url: String,
}

impl RegistryMirror {
    /// Create a mirror for `registry` proxying `remote_url`
    pub fn new(registry: impl Into<String>, remote_url: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            remote_url: remote_url.into(),
        }
    }

    /// Container name, e.g. `proxy-docker-io`
    pub fn container_name(&self) -> String {
        format!("proxy-{}", self.registry.replace('.', "-"))
    }

    /// Endpoint nodes use to reach the mirror on the kind network
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.container_name(), REGISTRY_PORT)
    }

    /// `docker run` parameters. Cached layers live in a named volume so they
    /// survive container recreation.
    pub fn container_spec(&self, network: &str) -> ContainerSpec {
        let name = self.container_name();
        ContainerSpec {
            volumes: vec![format!("{}:/var/lib/registry", name)],
            name,
            image: REGISTRY_IMAGE.to_string(),
            network: Some(network.to_string()),
            env: vec![(
                "REGISTRY_PROXY_REMOTEURL".to_string(),
                self.remote_url.clone(),
            )],
        }
    }
}

/// The default mirror set
pub fn default_mirrors() -> Vec<RegistryMirror> {
    DEFAULT_UPSTREAMS
        .iter()
        .map(|(registry, url)| RegistryMirror::new(*registry, *url))
        .collect()
}

/// containerd config patch pointing each registry at its mirror.
///
/// Returns `None` when there are no mirrors so the kind config omits the
/// patch entirely.
pub fn containerd_config_patch(mirrors: &[RegistryMirror]) -> Option<String> {
    if mirrors.is_empty() {
        return None;
    }

    let mut patch = String::new();
    for mirror in mirrors {
        patch.push_str(&format!(
            "[plugins.\"io.containerd.grpc.v1.cri\".registry.mirrors.\"{}\"]\n  endpoint = [\"{}\"]\n",
            mirror.registry,
            mirror.endpoint()
        ));
    }
    Some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_are_dns_safe() {
        let mirror = RegistryMirror::new("registry.k8s.io", "https://registry.k8s.io");
        assert_eq!(mirror.container_name(), "proxy-registry-k8s-io");
        assert_eq!(mirror.endpoint(), "http://proxy-registry-k8s-io:5000");
    }

    #[test]
    fn container_spec_runs_registry_in_proxy_mode() {
        let spec = RegistryMirror::new("docker.io", "https://registry-1.docker.io")
            .container_spec("kind");

        assert_eq!(spec.name, "proxy-docker-io");
        assert_eq!(spec.image, REGISTRY_IMAGE);
        assert_eq!(spec.network.as_deref(), Some("kind"));
        assert_eq!(
            spec.env,
            vec![(
                "REGISTRY_PROXY_REMOTEURL".to_string(),
                "https://registry-1.docker.io".to_string()
            )]
        );
        assert_eq!(spec.volumes, vec!["proxy-docker-io:/var/lib/registry"]);
    }

    #[test]
    fn default_mirrors_cover_common_registries() {
        let registries: Vec<_> = default_mirrors().into_iter().map(|m| m.registry).collect();
        assert_eq!(
            registries,
            vec!["docker.io", "quay.io", "ghcr.io", "registry.k8s.io"]
        );
    }

    #[test]
    fn patch_lists_every_mirror() {
        let patch = containerd_config_patch(&default_mirrors()).unwrap();
        assert!(patch.contains(
            "[plugins.\"io.containerd.grpc.v1.cri\".registry.mirrors.\"docker.io\"]\n  endpoint = [\"http://proxy-docker-io:5000\"]"
        ));
        assert_eq!(patch.matches("endpoint").count(), 4);
    }

    #[test]
    fn no_mirrors_no_patch() {
        assert!(containerd_config_patch(&[]).is_none());
    }
}

//! Host DNS via dnsmasq
//!
//! One drop-in per cluster resolves the cluster domain and every subdomain
//! to the ingress LoadBalancer IP.

use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Directory dnsmasq reads drop-in configuration from
pub const DNSMASQ_DIR: &str = "/etc/dnsmasq.d";

/// systemd unit restarted after writing the drop-in
pub const DNSMASQ_SERVICE: &str = "dnsmasq";

/// Drop-in path for a cluster
pub fn dnsmasq_conf_path(cluster_name: &str) -> PathBuf {
    PathBuf::from(DNSMASQ_DIR).join(format!("{}.conf", cluster_name))
}

/// Drop-in contents. `address=/d/ip` also matches every subdomain of `d`.
pub fn dnsmasq_entry(domain: &str, ip: Ipv4Addr) -> String {
    format!("address=/{}/{}\n", domain, ip)
}

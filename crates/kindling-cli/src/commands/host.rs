//! Host changes that need root: the trust store and dnsmasq
//!
//! Everything goes through `sudo`, so the user may be prompted once.

use std::path::Path;

use tracing::info;

use kindling_common::exec::run_checked;
use kindling_common::{CommandRunner, Invocation};

use crate::Result;

/// Where the local CA is installed for `update-ca-certificates`
pub const HOST_CA_PATH: &str = "/usr/local/share/ca-certificates/kindling-ca.crt";

fn sudo<I, S>(args: I) -> Invocation
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Invocation::new("sudo").args(args)
}

/// Write `contents` to a root-owned file with `sudo tee`
pub async fn write_root_file<R: CommandRunner + ?Sized>(
    runner: &R,
    path: &Path,
    contents: &str,
) -> Result<()> {
    let path = path.to_string_lossy();
    info!("Writing {}", path);
    run_checked(runner, sudo(["tee", &*path]).stdin(contents)).await?;
    Ok(())
}

/// Remove a root-owned file; a missing file is not an error
pub async fn remove_root_file<R: CommandRunner + ?Sized>(runner: &R, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    run_checked(runner, sudo(["rm", "-f", &*path])).await?;
    Ok(())
}

/// `systemctl restart <service>`
pub async fn restart_service<R: CommandRunner + ?Sized>(runner: &R, service: &str) -> Result<()> {
    info!("Restarting {}", service);
    run_checked(runner, sudo(["systemctl", "restart", service])).await?;
    Ok(())
}

/// Add the CA certificate to the host trust store
pub async fn trust_ca<R: CommandRunner + ?Sized>(runner: &R, cert: &Path) -> Result<()> {
    let cert = cert.to_string_lossy();
    info!("Installing local CA into the host trust store");
    run_checked(
        runner,
        sudo(["install", "-m", "0644", &*cert, HOST_CA_PATH]),
    )
    .await?;
    run_checked(runner, sudo(["update-ca-certificates"])).await?;
    Ok(())
}

/// Remove the CA certificate from the host trust store
pub async fn untrust_ca<R: CommandRunner + ?Sized>(runner: &R) -> Result<()> {
    info!("Removing local CA from the host trust store");
    run_checked(runner, sudo(["rm", "-f", HOST_CA_PATH])).await?;
    run_checked(runner, sudo(["update-ca-certificates", "--fresh"])).await?;
    Ok(())
}

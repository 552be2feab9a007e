use std::time::Duration;

use anyhow::Result;
use log::{debug, info};

use crate::control_interface::{BridgeApi, BridgeClient};
use crate::errors::Error;
use crate::util::auth::{CredentialProvider, PairingWaiter, Registrar};
use crate::util::discovery::{BridgeIdentifier, Discovery};

/// Where to look for bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMethod {
    /// SSDP search on the local network.
    #[default]
    Local,
    /// The vendor's remote discovery service.
    Remote,
}

/// Runs discovery and returns a client for the first bridge found.
pub async fn auto_client(method: DiscoveryMethod, timeout: Duration) -> Result<BridgeClient> {
    let bridges = match method {
        DiscoveryMethod::Local => Discovery::find_bridges(timeout).await?,
        DiscoveryMethod::Remote => Discovery::find_bridges_remote(timeout).await?,
    };
    let bridge = first_bridge(bridges)?;
    info!("Using bridge at {}", bridge.ip_address);
    Ok(BridgeClient::from_bridge_identifier(&bridge))
}

// Lowest address first, so repeated runs pick the same bridge.
fn first_bridge(bridges: impl IntoIterator<Item = BridgeIdentifier>) -> Result<BridgeIdentifier> {
    bridges
        .into_iter()
        .min_by_key(|bridge| bridge.ip_address)
        .ok_or_else(|| Error::NoBridgesFound.into())
}

/**
Initializes `client` with `app_key` and makes sure the bridge accepts it.

A rejected key starts pairing. The freshly registered key is not used for this
run; it is returned inside [`Error::InvalidAppKey`] so the caller can retry with it.
 */
pub async fn assert_initialized(
    mut client: BridgeClient,
    app_key: &str,
    waiter: &dyn PairingWaiter,
) -> Result<BridgeClient> {
    client.initialize(app_key);
    ensure_connection(&client, waiter).await?;
    Ok(client)
}

pub(crate) async fn ensure_connection<C: BridgeApi + ?Sized>(
    client: &C,
    waiter: &dyn PairingWaiter,
) -> Result<()> {
    if client.check_connection().await? {
        debug!("App key accepted");
        return Ok(());
    }
    let suggested = Registrar::register(client, waiter).await?;
    Err(Error::InvalidAppKey { suggested }.into())
}

/**
Produces a validated client.

Uses `address` when given, otherwise the first discovered bridge, and the key
from `credentials`.
 */
pub async fn connect(
    address: Option<&str>,
    method: DiscoveryMethod,
    timeout: Duration,
    credentials: &dyn CredentialProvider,
    waiter: &dyn PairingWaiter,
) -> Result<BridgeClient> {
    let client = match address {
        Some(address) => BridgeClient::new(address),
        None => auto_client(method, timeout).await?,
    };
    let app_key = credentials.app_key().await?;
    assert_initialized(client, &app_key, waiter).await
}

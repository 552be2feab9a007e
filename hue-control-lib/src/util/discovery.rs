use std::cmp::max;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use anyhow::Context;
use derivative::Derivative;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

const SSDP_ADDRESS: &str = "239.255.255.250:1900";
const SSDP_SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1900\r\n\
MAN: \"ssdp:discover\"\r\n\
MX: 3\r\n\
ST: ssdp:all\r\n\
\r\n";
const REMOTE_DISCOVERY_URL: &str = "https://discovery.meethue.com";

/// A bridge answering a discovery request.
#[derive(Derivative)]
#[derivative(Hash, PartialEq, Eq)]
#[derive(Debug, Clone, Serialize)]
pub struct BridgeIdentifier {
    pub ip_address: IpAddr,

    /**
    The bridge id, if the answer carried one.

    SSDP answers carry it in the `hue-bridgeid` header, the remote service as `id`.
    Bridges answer several times per search, sometimes with and sometimes without
    the header, so it is not part of the identity.
     */
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub bridge_id: Option<String>,
}

impl BridgeIdentifier {
    pub fn new(ip_address: IpAddr, bridge_id: Option<String>) -> Self {
        BridgeIdentifier {
            ip_address,
            bridge_id,
        }
    }
}

/// One entry of the remote discovery service answer.
#[derive(Deserialize, Debug)]
struct RemoteBridge {
    id: Option<String>,
    internalipaddress: String,
}

pub struct Discovery;

impl Discovery {
    /**
    Decodes one SSDP answer.

    Returns `None` for answers from anything that is not a Hue bridge. The address
    is taken from the `LOCATION` header, falling back to the sender address.
     */
    pub fn decode_ssdp_response(data: &[u8], sender: IpAddr) -> Option<BridgeIdentifier> {
        let text = std::str::from_utf8(data).ok()?;
        let mut lines = text.lines();
        let status = lines.next()?;
        if !status.starts_with("HTTP/1.1 200") {
            return None;
        }

        let mut bridge_id = None;
        let mut location = None;
        let mut is_bridge = false;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "hue-bridgeid" => {
                    is_bridge = true;
                    bridge_id = Some(value.to_string());
                }
                "server" if value.contains("IpBridge") => is_bridge = true,
                "location" => location = Some(value.to_string()),
                _ => {}
            }
        }
        if !is_bridge {
            return None;
        }

        let ip_address = location
            .as_deref()
            .and_then(Self::host_of_location)
            .unwrap_or(sender);
        Some(BridgeIdentifier::new(ip_address, bridge_id))
    }

    // "http://192.168.1.2:80/description.xml" -> 192.168.1.2
    fn host_of_location(location: &str) -> Option<IpAddr> {
        let rest = location.split_once("://").map_or(location, |(_, rest)| rest);
        let authority = rest.split('/').next()?;
        let host = authority.split(':').next()?;
        host.parse().ok()
    }

    /**
    Finds bridges on the local network.

    Sends one SSDP search and collects answers until `given_timeout` has elapsed.
    An empty set is not an error here.
     */
    pub async fn find_bridges(given_timeout: Duration) -> anyhow::Result<HashSet<BridgeIdentifier>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        socket
            .send_to(SSDP_SEARCH.as_bytes(), SSDP_ADDRESS)
            .await
            .context("Failed to send SSDP search")?;

        let mut discovered_bridges = HashSet::<BridgeIdentifier>::new();
        let mut buffer = [0; 2048];

        let timeout_end = Instant::now() + given_timeout;

        loop {
            if Instant::now() >= timeout_end {
                break;
            }

            let remaining_time = timeout_end - Instant::now();
            let result = timeout(remaining_time, socket.recv_from(&mut buffer)).await;

            match result {
                Ok(Ok((number_of_bytes, src_addr))) => {
                    let received_data = &buffer[..number_of_bytes];
                    match Self::decode_ssdp_response(received_data, src_addr.ip()) {
                        Some(bridge) => {
                            if discovered_bridges.contains(&bridge) {
                                debug!("Found bridge {:?} again, skipping", bridge);
                                continue;
                            }
                            info!("Found bridge: {:?}", bridge);
                            discovered_bridges.insert(bridge);
                        }
                        None => debug!("Ignoring SSDP answer from {}", src_addr),
                    }
                }
                Ok(Err(e)) => {
                    warn!("Failed to receive response: {}", e);
                    break;
                }
                Err(_) => {
                    debug!("Discovery time complete. If bridges are missing, try increasing the search timeout.");
                    break;
                }
            }
        }

        Ok(discovered_bridges)
    }

    /// Asks the vendor's remote discovery service for bridges on this network.
    pub async fn find_bridges_remote(
        given_timeout: Duration,
    ) -> anyhow::Result<HashSet<BridgeIdentifier>> {
        let client = reqwest::Client::builder().timeout(given_timeout).build()?;
        let response = client
            .get(REMOTE_DISCOVERY_URL)
            .send()
            .await
            .context("Failed to reach the remote discovery service")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Received non-success status code: {}",
                response.status()
            ));
        }
        let body = response.text().await?;
        Self::decode_remote_response(&body)
    }

    pub fn decode_remote_response(body: &str) -> anyhow::Result<HashSet<BridgeIdentifier>> {
        let bridges: Vec<RemoteBridge> =
            serde_json::from_str(body).context("Failed to parse discovery response")?;
        let mut discovered = HashSet::new();
        for bridge in bridges {
            match bridge.internalipaddress.parse::<IpAddr>() {
                Ok(ip_address) => {
                    info!("Found bridge: {} ({:?})", ip_address, bridge.id);
                    discovered.insert(BridgeIdentifier::new(ip_address, bridge.id));
                }
                Err(_) => warn!(
                    "Skipping bridge with invalid address {:?}",
                    bridge.internalipaddress
                ),
            }
        }
        Ok(discovered)
    }

    pub fn pretty_print_bridges(bridges: &HashSet<BridgeIdentifier>) {
        let max_ip_width = bridges
            .iter()
            .map(|b| b.ip_address.to_string().len())
            .max()
            .unwrap_or(0)
            .max("IP Address".len());
        let max_bridge_id_width = bridges
            .iter()
            .map(|b| max(b.bridge_id.as_deref().map_or(0, str::len), "Bridge ID".len()))
            .max()
            .unwrap_or("Bridge ID".len());

        println!(
            "{:<ip_width$} {:<bridge_id_width$}",
            "IP Address",
            "Bridge ID",
            ip_width = max_ip_width + 2,
            bridge_id_width = max_bridge_id_width + 2,
        );
        println!(
            "{:<ip_width$} {:<bridge_id_width$}",
            "-".repeat(max_ip_width),
            "-".repeat(max_bridge_id_width),
            ip_width = max_ip_width + 2,
            bridge_id_width = max_bridge_id_width + 2,
        );
        for bridge in bridges {
            println!(
                "{:<ip_width$} {:<bridge_id_width$}",
                bridge.ip_address,
                bridge.bridge_id.as_deref().unwrap_or("-"),
                ip_width = max_ip_width + 2,
                bridge_id_width = max_bridge_id_width + 2,
            );
        }
    }
}

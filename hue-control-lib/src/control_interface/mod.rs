use std::collections::HashMap;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use derivative::Derivative;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::Error;
use crate::light::state::{Group, Light, LightCommand};
use crate::util::discovery::BridgeIdentifier;
use crate::util::traits::{
    decode_resource, decode_results, is_unauthorized, split_results, ApiError, ApiErrorCodeTrait,
};

/// The operations the room controller needs from a bridge.
///
/// [`BridgeClient`] talks to a real bridge; tests substitute a recording fake.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// All groups known to the bridge, with their ids filled in.
    async fn get_groups(&self) -> anyhow::Result<Vec<Group>>;

    /// One light and its current state.
    async fn get_light(&self, light_id: &str) -> anyhow::Result<Light>;

    /// Whether the bridge answers and accepts the app key.
    async fn check_connection(&self) -> anyhow::Result<bool>;

    /// Applies `command` to every light in `light_ids`.
    async fn send_command(&self, command: &LightCommand, light_ids: &[String])
        -> anyhow::Result<()>;

    /// Asks the bridge for a new app key. Needs the link button to be pressed.
    async fn register(&self, application_name: &str, device_name: &str)
        -> anyhow::Result<String>;
}

#[derive(Derivative)]
#[derivative(Debug)]
#[derive(Clone)]
pub struct BridgeClient {
    pub host: String,
    #[derivative(Debug = "ignore")]
    app_key: Option<String>,
    #[derivative(Debug = "ignore")]
    client: Client,
}

/// Compare by address only; the key is a credential, not an identity.
impl PartialEq for BridgeClient {
    fn eq(&self, other: &BridgeClient) -> bool {
        self.host == other.host
    }
}

#[derive(Debug, Deserialize)]
struct RegisterSuccess {
    username: String,
}

/// The part of `/config` we look at.
#[derive(Debug, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bridgeid: Option<String>,
    #[serde(default)]
    pub apiversion: Option<String>,
    /// Only present when the app key is whitelisted.
    #[serde(default)]
    pub whitelist: Option<serde_json::Value>,
}

impl BridgeClient {
    /// Creates an uninitialized client for the bridge at `host`.
    pub fn new(host: &str) -> Self {
        BridgeClient {
            host: host.to_string(),
            app_key: None,
            client: Client::new(),
        }
    }

    /**
    Creates a [BridgeClient] by a [BridgeIdentifier].
    */
    pub fn from_bridge_identifier(bridge: &BridgeIdentifier) -> Self {
        BridgeClient::new(&bridge.ip_address.to_string())
    }

    /// Sets the app key used for every following call.
    pub fn initialize(&mut self, app_key: &str) {
        self.app_key = Some(app_key.to_string());
    }

    pub fn with_app_key(mut self, app_key: &str) -> Self {
        self.initialize(app_key);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.app_key.is_some()
    }

    fn base_url(&self) -> String {
        format!("http://{}/api", self.host)
    }

    fn resource_url(&self, path: &str) -> anyhow::Result<String> {
        let app_key = self
            .app_key
            .as_deref()
            .ok_or_else(|| anyhow!("Bridge client at {} has no app key", self.host))?;
        Ok(format!("{}/{}/{}", self.base_url(), app_key, path))
    }

    async fn get_text(&self, path: &str) -> anyhow::Result<String> {
        let url = self.resource_url(path)?;
        debug!("GET {}/{}", self.host, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", path))?;

        if response.status() != StatusCode::OK {
            return Err(anyhow!(
                "Failed to fetch {} with status: {}",
                path,
                response.status()
            ));
        }
        Ok(response.text().await?)
    }

    /// Fetches the bridge configuration.
    pub async fn get_config(&self) -> anyhow::Result<BridgeConfig> {
        let body = self.get_text("config").await?;
        decode_resource(&body)
    }

    async fn send_light_state(&self, command: &LightCommand, light_id: &str) -> anyhow::Result<()> {
        let path = format!("lights/{}/state", light_id);
        let url = self.resource_url(&path)?;
        debug!("PUT {}/{} {:?}", self.host, path, command);
        let response = self
            .client
            .put(&url)
            .json(command)
            .send()
            .await
            .with_context(|| format!("Failed to send command to light {}", light_id))?;

        if response.status() != StatusCode::OK {
            return Err(anyhow!(
                "Failed to send command to light {} with status: {}",
                light_id,
                response.status()
            ));
        }
        let body = response.text().await?;
        let (_, refused) = split_results::<serde_json::Value>(&body)?;
        for err in refused {
            warn!(
                "Light {} refused {}: {} ({})",
                light_id,
                err.address,
                err.description,
                err.api_error_code().message
            );
        }
        Ok(())
    }
}

#[async_trait]
impl BridgeApi for BridgeClient {
    async fn get_groups(&self) -> anyhow::Result<Vec<Group>> {
        let body = self.get_text("groups").await?;
        let groups: HashMap<String, Group> = decode_resource(&body)?;
        let mut groups: Vec<Group> = groups
            .into_iter()
            .map(|(id, mut group)| {
                group.id = id;
                group
            })
            .collect();
        // The answer is a map; keep a stable order for callers.
        groups.sort_by(|a, b| {
            a.id.parse::<u32>()
                .ok()
                .cmp(&b.id.parse::<u32>().ok())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(groups)
    }

    async fn get_light(&self, light_id: &str) -> anyhow::Result<Light> {
        let body = self.get_text(&format!("lights/{}", light_id)).await?;
        let mut light: Light = decode_resource(&body)?;
        light.id = light_id.to_string();
        Ok(light)
    }

    async fn check_connection(&self) -> anyhow::Result<bool> {
        if !self.is_initialized() {
            return Ok(false);
        }
        match self.get_config().await {
            Ok(config) => Ok(config.whitelist.is_some()),
            Err(err) => {
                if is_unauthorized(&err) {
                    debug!("Connection check rejected: {}", err);
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn send_command(
        &self,
        command: &LightCommand,
        light_ids: &[String],
    ) -> anyhow::Result<()> {
        for light_id in light_ids {
            self.send_light_state(command, light_id).await?;
        }
        Ok(())
    }

    async fn register(&self, application_name: &str, device_name: &str) -> anyhow::Result<String> {
        let url = self.base_url();
        let response = self
            .client
            .post(&url)
            .json(&json!({ "devicetype": format!("{}#{}", application_name, device_name) }))
            .send()
            .await
            .context("Failed to send registration request")?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("Registration failed with status: {}", response.status());
        }

        let body = response.text().await?;
        let results = match decode_results::<RegisterSuccess>(&body) {
            Ok(results) => results,
            Err(err) => {
                if let Some(Error::Api { code, .. }) = err.downcast_ref::<Error>() {
                    let api_error_code = ApiError::map_api_error_code(*code);
                    debug!("Registration refused: {}", api_error_code.message);
                }
                return Err(err.context("Registration failed"));
            }
        };
        results
            .into_iter()
            .next()
            .map(|success| success.username)
            .ok_or_else(|| Error::UnexpectedResponse(body).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_app_key() {
        let client = BridgeClient::new("192.168.1.2").with_app_key("secret-key");
        let debug = format!("{:?}", client);
        assert!(debug.contains("192.168.1.2"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_resource_url_requires_app_key() {
        let client = BridgeClient::new("10.0.0.5");
        assert!(client.resource_url("groups").is_err());
        let client = client.with_app_key("abc");
        assert_eq!(
            client.resource_url("lights/1/state").unwrap(),
            "http://10.0.0.5/api/abc/lights/1/state"
        );
    }

    #[tokio::test]
    async fn test_check_connection_without_key_is_false() {
        let client = BridgeClient::new("10.0.0.5");
        assert!(!client.check_connection().await.unwrap());
    }
}

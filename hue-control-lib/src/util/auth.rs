use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::info;
use uuid::Uuid;

use crate::control_interface::BridgeApi;

/// Application half of the `devicetype` sent on registration.
pub const APPLICATION_NAME: &str = "hue-control";

/// How many countdown ticks precede the registration request.
pub const PAIRING_COUNTDOWN: u32 = 10;

/// Gives the user time to press the bridge's link button.
#[async_trait]
pub trait PairingWaiter: Send + Sync {
    /// Called once per countdown step with the steps left, `PAIRING_COUNTDOWN` down to 1.
    async fn tick(&self, remaining: u32);
}

/// Logs the countdown and sleeps between steps.
pub struct CountdownWaiter {
    pub interval: Duration,
}

impl Default for CountdownWaiter {
    fn default() -> Self {
        CountdownWaiter {
            interval: Duration::from_secs(1),
        }
    }
}

#[async_trait]
impl PairingWaiter for CountdownWaiter {
    async fn tick(&self, remaining: u32) {
        info!("Press the link button on the bridge: {}", remaining);
        tokio::time::sleep(self.interval).await;
    }
}

/// Supplies the app key for a bridge.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn app_key(&self) -> Result<String>;
}

/// A key that is already known, e.g. from the command line.
pub struct StaticCredential(pub String);

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn app_key(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Asks for the key on the terminal.
pub struct PromptCredential {
    pub label: String,
}

impl Default for PromptCredential {
    fn default() -> Self {
        PromptCredential {
            label: "Hue Bridge AppKey".to_string(),
        }
    }
}

#[async_trait]
impl CredentialProvider for PromptCredential {
    async fn app_key(&self) -> Result<String> {
        let label = self.label.clone();
        let line = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut stderr = std::io::stderr();
            write!(stderr, "{}: ", label)?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .context("Credential prompt panicked")??;

        let key = line.trim();
        if key.is_empty() {
            bail!("No app key entered");
        }
        Ok(key.to_string())
    }
}

pub struct Registrar;

impl Registrar {
    /// `application` followed by the last 8 hex digits of a fresh UUID.
    pub fn device_name() -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("application{}", &uuid[uuid.len() - 8..])
    }

    /**
    Pairs with the bridge and returns the new app key.

    Runs the full countdown, then sends a single registration request. If the
    link button was not pressed in time the bridge error is returned as is.
     */
    pub async fn register<C: BridgeApi + ?Sized>(
        client: &C,
        waiter: &dyn PairingWaiter,
    ) -> Result<String> {
        for remaining in (1..=PAIRING_COUNTDOWN).rev() {
            waiter.tick(remaining).await;
        }
        let app_key = client
            .register(APPLICATION_NAME, &Self::device_name())
            .await?;
        info!("Use this app key: {}", app_key);
        Ok(app_key)
    }
}

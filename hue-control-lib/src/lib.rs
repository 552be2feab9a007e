//! # Hue Control Library
//!
//! `hue-control-lib` drives all the lights of one room through a local Hue
//! bridge. It finds the bridge, pairs with it when needed, captures the state
//! of the room's lights and fans commands out to every one of them.
//!
//! ## Features
//!
//! - Bridge discovery over SSDP or the vendor's remote discovery service
//! - Pairing with the bridge's link button, with a pluggable countdown
//! - Room-wide on/off, brightness, hue, color coordinates and color temperature
//! - Restoring a room to the state it was in when the controller was created
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hue_control_lib::room::RoomController;
//! use hue_control_lib::util::auth::{CountdownWaiter, StaticCredential};
//! use hue_control_lib::util::connect::{connect, DiscoveryMethod};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = connect(
//!         None,
//!         DiscoveryMethod::Local,
//!         Duration::from_secs(5),
//!         &StaticCredential("my-app-key".to_string()),
//!         &CountdownWaiter::default(),
//!     )
//!     .await?;
//!
//!     let office = RoomController::new(client, "Office").await?;
//!     office.switch(true).await?.dim(80).await?;
//!     office.restore().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Disclaimer
//!
//! This project is not affiliated with, authorized by, or endorsed by Signify or
//! Philips Hue.

// HTTP client for the bridge and the `BridgeApi` seam the controller is written against.
pub mod control_interface;

mod errors;

// Light and group models, commands and the named hue constants.
pub mod light;

// The room controller.
pub mod room;

// Discovery, pairing and connection bootstrap.
pub mod util;

pub use errors::Error;

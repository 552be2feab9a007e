use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use hue_control_lib::control_interface::BridgeClient;
use hue_control_lib::light::{Light, NamedHue};
use hue_control_lib::room::RoomController;
use hue_control_lib::util::auth::{
    CountdownWaiter, CredentialProvider, PromptCredential, Registrar, StaticCredential,
};
use hue_control_lib::util::connect::{auto_client, connect, DiscoveryMethod};
use hue_control_lib::util::discovery::{BridgeIdentifier, Discovery};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "hue_control",
    about = "Controls the lights of a room through a local Hue bridge",
    version
)]
pub struct Cli {
    /// Log every request sent to the bridge
    #[clap(long, global = true)]
    pub debug: bool,

    /// Address of the bridge; discovered when omitted
    #[clap(long, global = true)]
    pub bridge: Option<String>,

    /// App key for the bridge; prompted for when omitted
    #[clap(long, env = "HUE_APP_KEY", hide_env_values = true, global = true)]
    pub app_key: Option<String>,

    /// Discovery timeout in milliseconds
    #[clap(short = 't', long = "timeout", default_value_t = 5000, global = true)]
    pub timeout: u64,

    /// Ask the vendor's discovery service instead of searching the local network
    #[clap(long, global = true)]
    pub remote_discovery: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Supported output formats for the `discover` command.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Lists the bridges on the network
    #[clap(name = "discover")]
    Discover {
        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
    /// Pairs with the bridge and prints a new app key
    #[clap(name = "register")]
    Register,
    /// Subcommand for operations on all lights of a room
    #[clap(name = "room")]
    Room {
        /// Name of the room (bridge group)
        name: String,

        /// Pause after each light's command, in milliseconds
        #[clap(long, value_parser = parse_duration, default_value = "250")]
        delay: Duration,

        /// Print each light's state after its command
        #[clap(long)]
        report: bool,

        /// Restore the lights to how they were found after this many milliseconds
        #[clap(long, value_parser = parse_duration)]
        restore_after: Option<Duration>,

        #[clap(subcommand)]
        action: RoomAction,
    },
}

fn parse_duration(s: &str) -> Result<Duration, &'static str> {
    let millis = s
        .parse::<u64>()
        .map_err(|_| "could not parse duration in milliseconds")?;
    Ok(Duration::from_millis(millis))
}

/// Actions available under the `room` subcommand
#[derive(Subcommand)]
pub enum RoomAction {
    /// Turns the lights on.
    #[clap(name = "on")]
    On,
    /// Turns the lights off.
    #[clap(name = "off")]
    Off,
    /// Sets the brightness.
    #[clap(name = "dim")]
    Dim {
        /// Brightness, clamped to 0-255
        #[clap(allow_negative_numbers = true)]
        brightness: i64,
    },
    /// Sets hue and saturation.
    #[clap(name = "hue")]
    Hue {
        /// Hue value, wrapped onto 0-65535
        #[clap(allow_negative_numbers = true, required_unless_present = "named")]
        value: Option<i64>,

        /// A named color instead of a hue value
        #[clap(long, value_enum, conflicts_with = "value")]
        named: Option<NamedHue>,

        /// Saturation, clamped to 0-254
        #[clap(long, default_value_t = 254)]
        sat: i64,
    },
    /// Sets CIE color coordinates.
    #[clap(name = "color")]
    Color {
        /// x coordinate, clamped to 0-1
        #[clap(allow_negative_numbers = true)]
        x: f64,
        /// y coordinate, clamped to 0-1
        #[clap(allow_negative_numbers = true)]
        y: f64,
    },
    /// Sets the color temperature.
    #[clap(name = "temp")]
    Temp {
        /// Color temperature in mired
        ct: u16,
    },
    /// Prints the current hue of every light.
    #[clap(name = "hues")]
    Hues,
    /// Prints the lights of the room and their captured state.
    #[clap(name = "lights")]
    Lights,
}

fn discovery_method(cli: &Cli) -> DiscoveryMethod {
    if cli.remote_discovery {
        DiscoveryMethod::Remote
    } else {
        DiscoveryMethod::Local
    }
}

async fn find_bridges(cli: &Cli) -> Result<HashSet<BridgeIdentifier>> {
    let timeout = Duration::from_millis(cli.timeout);
    match discovery_method(cli) {
        DiscoveryMethod::Local => Discovery::find_bridges(timeout).await,
        DiscoveryMethod::Remote => Discovery::find_bridges_remote(timeout).await,
    }
}

async fn handle_cli(cli: Cli) -> Result<()> {
    let timeout = Duration::from_millis(cli.timeout);
    let waiter = CountdownWaiter::default();

    match &cli.command {
        Commands::Discover { output } => {
            let bridges = find_bridges(&cli).await?;
            match output {
                OutputFormat::Plaintext => {
                    Discovery::pretty_print_bridges(&bridges);
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string(&bridges)?;
                    println!("{}", json);
                }
                OutputFormat::Yaml => {
                    let yaml = serde_yaml::to_string(&bridges)?;
                    println!("{}", yaml);
                }
            }
        }
        Commands::Register => {
            let client = match &cli.bridge {
                Some(address) => BridgeClient::new(address),
                None => auto_client(discovery_method(&cli), timeout).await?,
            };
            let app_key = Registrar::register(&client, &waiter).await?;
            println!("{}", app_key);
        }
        Commands::Room {
            name,
            delay,
            report,
            restore_after,
            action,
        } => {
            let credentials: Box<dyn CredentialProvider> = match &cli.app_key {
                Some(app_key) => Box::new(StaticCredential(app_key.clone())),
                None => Box::new(PromptCredential::default()),
            };
            let client = connect(
                cli.bridge.as_deref(),
                discovery_method(&cli),
                timeout,
                credentials.as_ref(),
                &waiter,
            )
            .await?;

            let mut controller = RoomController::new(client, name).await?.with_delay(*delay);
            if *report {
                controller = controller.with_post_send(print_light);
            }

            handle_room_action(&controller, action).await?;

            if let Some(pause) = restore_after {
                info!("Restoring in {:?}", pause);
                tokio::time::sleep(*pause).await;
                controller.restore().await?;
            }
        }
    }

    Ok(())
}

async fn handle_room_action(
    controller: &RoomController<BridgeClient>,
    action: &RoomAction,
) -> Result<()> {
    match action {
        RoomAction::On => {
            controller.switch(true).await?;
        }
        RoomAction::Off => {
            controller.switch(false).await?;
        }
        RoomAction::Dim { brightness } => {
            controller.dim(*brightness).await?;
        }
        RoomAction::Hue { value, named, sat } => match (value, named) {
            (Some(value), None) => {
                controller.set_hue(*value, *sat).await?;
            }
            (None, Some(named)) => {
                controller.set_named_hue(*named, *sat).await?;
            }
            _ => return Err(anyhow!("Give either a hue value or --named")),
        },
        RoomAction::Color { x, y } => {
            controller.set_color(*x, *y).await?;
        }
        RoomAction::Temp { ct } => {
            controller.temp(*ct).await?;
        }
        RoomAction::Hues => {
            let hues = controller.get_hues().await?;
            for (light_id, hue) in controller.lights().iter().zip(hues) {
                println!("{}: {}", light_id, hue);
            }
        }
        RoomAction::Lights => {
            println!("Room {} (group {})", controller.room(), controller.group_id());
            for (light_id, state) in controller.initial_states() {
                println!("{}: {:?}", light_id, state);
            }
        }
    }
    Ok(())
}

fn print_light(light: &Light) {
    println!(
        "{} ({}): on={} bri={:?} hue={:?} sat={:?} xy={:?} ct={:?}",
        light.id,
        light.name,
        light.state.on,
        light.state.bri,
        light.state.hue,
        light.state.sat,
        light.state.xy,
        light.state.ct
    );
}

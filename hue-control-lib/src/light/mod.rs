pub mod color;
pub mod state;

pub use color::NamedHue;
pub use state::{Group, GroupState, Light, LightCommand, LightState};

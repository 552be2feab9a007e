use serde::{Deserialize, Serialize};

use crate::light::color::{
    clamp_brightness, clamp_coordinate, clamp_saturation, normalize_hue, MAX_SATURATION,
};

/// A light as reported by `GET /api/<key>/lights/<id>`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Light {
    /// Not part of the answer body; filled in from the request path.
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub light_type: String,
    pub state: LightState,
}

/// Current state of a light.
///
/// Hue, saturation, xy and ct are missing on white-only lights.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct LightState {
    pub on: bool,
    /// Range 0..255. Missing on on/off plugs.
    pub bri: Option<u8>,
    /// Range 0..65535.
    pub hue: Option<u16>,
    /// Range 0..254.
    pub sat: Option<u8>,
    /// CIE color coordinates, each in 0..1.
    pub xy: Option<[f64; 2]>,
    /// Color temperature in mired.
    pub ct: Option<u16>,
    pub colormode: Option<String>,
    pub reachable: Option<bool>,
}

/// A partial state mutation. Only fields that are set are sent.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct LightCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
}

impl LightCommand {
    pub fn switch(on: bool) -> Self {
        LightCommand {
            on: Some(on),
            ..Default::default()
        }
    }

    /// Brightness clamped to 0..255.
    pub fn brightness(brightness: i64) -> Self {
        LightCommand {
            bri: Some(clamp_brightness(brightness)),
            ..Default::default()
        }
    }

    /// Hue wrapped onto the wheel, saturation clamped to 0..254.
    pub fn hue(hue: i64, saturation: i64) -> Self {
        LightCommand {
            hue: Some(normalize_hue(hue)),
            sat: Some(clamp_saturation(saturation)),
            ..Default::default()
        }
    }

    /// Color coordinates, each axis clamped to 0..1.
    pub fn color(x: f64, y: f64) -> Self {
        LightCommand {
            xy: Some([clamp_coordinate(x), clamp_coordinate(y)]),
            ..Default::default()
        }
    }

    pub fn temperature(ct: u16) -> Self {
        LightCommand {
            ct: Some(ct),
            ..Default::default()
        }
    }
}

/**
Restoring a light sends back every setting that was captured, in one command.

Settings a light did not report stay unset so white-only lights are not sent
color fields.
 */
impl From<&LightState> for LightCommand {
    fn from(state: &LightState) -> Self {
        LightCommand {
            on: Some(state.on),
            bri: state.bri,
            hue: state.hue,
            sat: state.sat,
            xy: state.xy,
            ct: state.ct,
        }
    }
}

/// Default saturation used when setting a hue.
pub const DEFAULT_SATURATION: u8 = MAX_SATURATION;

/// Aggregate state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct GroupState {
    pub all_on: bool,
    pub any_on: bool,
}

/// A group ("room") as reported by `GET /api/<key>/groups`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Group {
    /// The key of the group in the answer map.
    #[serde(skip)]
    pub id: String,
    pub name: String,
    /// Member light ids, in bridge order.
    #[serde(default)]
    pub lights: Vec<String>,
    #[serde(rename = "type", default)]
    pub group_type: String,
    /// Last command sent to the whole group.
    #[serde(default)]
    pub action: LightCommand,
    #[serde(default)]
    pub state: GroupState,
}

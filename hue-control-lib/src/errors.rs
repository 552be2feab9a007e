/// Failures specific to talking to a bridge and resolving a room.
///
/// Library functions return [`anyhow::Result`]; these errors travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref::<Error>()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Discovery finished without a single bridge answering.
    #[error("No Hue bridges found")]
    NoBridgesFound,

    /// The app key was rejected; a new one has been registered.
    #[error("Invalid app key - try using \"{suggested}\"")]
    InvalidAppKey { suggested: String },

    /// No group carries the requested name.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// More than one group carries the requested name.
    #[error("room name {name:?} is ambiguous, {count} groups match")]
    AmbiguousRoom { name: String, count: usize },

    /// The bridge answered with an error entry.
    #[error("bridge error {code} at {address}: {description}")]
    Api {
        code: u32,
        address: String,
        description: String,
    },

    /// The light does not report a hue (white-only bulbs).
    #[error("light {0} does not report a hue")]
    NoHue(String),

    /// The bridge answered with something we could not interpret.
    #[error("unexpected bridge response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    pub fn ambiguous_room(name: &str, count: usize) -> Self {
        Error::AmbiguousRoom {
            name: name.to_string(),
            count,
        }
    }

    /// Whether this is the bridge telling us the link button was not pressed.
    pub fn is_link_button_not_pressed(&self) -> bool {
        matches!(self, Error::Api { code, .. } if *code == crate::util::traits::LINK_BUTTON_NOT_PRESSED.code)
    }
}

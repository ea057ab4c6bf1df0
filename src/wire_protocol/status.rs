use std::fmt;

// -----------------------------------------------------------------------------
// ----- ResponseStatus --------------------------------------------------------

/// Status byte of the gateway's error-response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    NoError,
    ProcessingError,
    MissingDeviceToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Shutdown,
    Unknown(u8),
}

// -----------------------------------------------------------------------------
// ----- ResponseStatus: Static ------------------------------------------------

impl ResponseStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ResponseStatus::NoError,
            1 => ResponseStatus::ProcessingError,
            2 => ResponseStatus::MissingDeviceToken,
            3 => ResponseStatus::MissingTopic,
            4 => ResponseStatus::MissingPayload,
            5 => ResponseStatus::InvalidTokenSize,
            6 => ResponseStatus::InvalidTopicSize,
            7 => ResponseStatus::InvalidPayloadSize,
            8 => ResponseStatus::InvalidToken,
            10 => ResponseStatus::Shutdown,
            other => ResponseStatus::Unknown(other),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ResponseStatus: Public ------------------------------------------------

impl ResponseStatus {
    pub fn code(self) -> u8 {
        match self {
            ResponseStatus::NoError => 0,
            ResponseStatus::ProcessingError => 1,
            ResponseStatus::MissingDeviceToken => 2,
            ResponseStatus::MissingTopic => 3,
            ResponseStatus::MissingPayload => 4,
            ResponseStatus::InvalidTokenSize => 5,
            ResponseStatus::InvalidTopicSize => 6,
            ResponseStatus::InvalidPayloadSize => 7,
            ResponseStatus::InvalidToken => 8,
            ResponseStatus::Shutdown => 10,
            ResponseStatus::Unknown(code) => code,
        }
    }

    /// Statuses 1-8: the gateway rejected this specific notification.
    pub fn is_protocol_error(self) -> bool {
        matches!(self.code(), 1..=8)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::NoError => "no errors encountered",
            ResponseStatus::ProcessingError => "processing error",
            ResponseStatus::MissingDeviceToken => "missing device token",
            ResponseStatus::MissingTopic => "missing topic",
            ResponseStatus::MissingPayload => "missing payload",
            ResponseStatus::InvalidTokenSize => "invalid token size",
            ResponseStatus::InvalidTopicSize => "invalid topic size",
            ResponseStatus::InvalidPayloadSize => "invalid payload size",
            ResponseStatus::InvalidToken => "invalid token",
            ResponseStatus::Shutdown => "shutdown",
            ResponseStatus::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Unknown(255) => f.write_str("none (unknown)"),
            ResponseStatus::Unknown(code) => write!(f, "unknown (status {code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::status::ResponseStatus;
use super::wire_serializable::WireSerializable;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const ERROR_RESPONSE_COMMAND: u8 = 8;
pub const ERROR_RESPONSE_LEN: usize = 6;

// -----------------------------------------------------------------------------
// ----- ErrorResponse ---------------------------------------------------------

/// The 6-byte frame the gateway sends before closing a connection on which it
/// rejected a notification. Nothing is sent on success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub command: u8,
    pub status: ResponseStatus,
    pub identifier: u32,
}

impl ErrorResponse {
    pub fn new(status: ResponseStatus, identifier: u32) -> Self {
        Self {
            command: ERROR_RESPONSE_COMMAND,
            status,
            identifier,
        }
    }

    /// Fields are taken verbatim; the command byte is not checked.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < ERROR_RESPONSE_LEN {
            return Err(DecodeError::TruncatedResponse { len: bytes.len() });
        }

        Ok(Self {
            command: bytes[0],
            status: ResponseStatus::from_code(bytes[1]),
            identifier: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
        })
    }
}

impl<'a> WireSerializable<'a> for ErrorResponse {
    type Error = DecodeError;

    fn peek(buf: &[u8]) -> Option<usize> {
        (buf.len() >= ERROR_RESPONSE_LEN).then_some(ERROR_RESPONSE_LEN)
    }

    fn to_bytes(&self) -> Result<Bytes, Self::Error> {
        let mut buf = BytesMut::with_capacity(ERROR_RESPONSE_LEN);
        buf.put_u8(self.command);
        buf.put_u8(self.status.code());
        buf.put_u32(self.identifier);
        Ok(buf.freeze())
    }

    fn from_bytes(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        Self::decode(bytes)
    }

    fn body_size(&self) -> usize {
        ERROR_RESPONSE_LEN - 1
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated error response: got {len} of 6 bytes")]
    TruncatedResponse { len: usize },

    #[error("unexpected command byte {0}")]
    UnexpectedCommand(u8),

    #[error("frame length mismatch: expected {expected} bytes, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },

    #[error("frame is missing required item {0}")]
    MissingItem(u8),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::certificate::CertificateError;
use crate::config::ConfigError;
use crate::wire_protocol::{DecodeError, EncodeError, ResponseStatus};

// -----------------------------------------------------------------------------
// ----- PushError -------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PushError {
    // -- Fatal at pool construction --
    #[error("certificate: {0}")]
    Certificate(#[from] CertificateError),

    #[error("tls configuration: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("connection pool unavailable: {0}")]
    PoolUnavailable(Arc<PushError>),

    #[error("connection pool closed")]
    PoolClosed,

    // -- Fatal for this send, never retried --
    #[error("encode: {0}")]
    Encode(#[from] EncodeError),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to connect to gateway: {0}")]
    Connect(#[source] io::Error),

    #[error("transport error while waiting for response: {0}")]
    Transport(#[source] io::Error),

    // -- Retryable, counted against the budget --
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("{status} (notification {identifier})")]
    Rejected {
        status: ResponseStatus,
        identifier: u32,
    },

    #[error("unknown error status {code} (notification {identifier})")]
    UnknownStatus { code: u8, identifier: u32 },

    // -- Terminal --
    #[error("retries exhausted: {}", describe_last(.last))]
    RetriesExhausted { last: Option<Arc<PushError>> },
}

// -----------------------------------------------------------------------------
// ----- PushError: Public -----------------------------------------------------

impl PushError {
    /// True for failures that consume one unit of retry budget and trigger a
    /// reconnect-and-resend.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PushError::Write(_)
                | PushError::ConnectionClosed
                | PushError::Rejected { .. }
                | PushError::UnknownStatus { .. }
        )
    }

    /// The error that ended the last attempt, when this is an exhaustion.
    pub fn last_attempt(&self) -> Option<&PushError> {
        match self {
            PushError::RetriesExhausted { last } => last.as_deref(),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn describe_last(last: &Option<Arc<PushError>>) -> String {
    match last {
        Some(err) => err.to_string(),
        None => "no attempt was made".to_string(),
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

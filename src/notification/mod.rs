//! notification/mod.rs
//!
//! A single push notification plus the per-send state the retry loop carries
//! across attempts (remaining budget, last failure).

pub mod payload;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::errors::PushError;

pub use payload::{Alert, AlertDict, Aps, Payload};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_RETRY_BUDGET: u32 = 3;

static NEXT_IDENTIFIER: AtomicU32 = AtomicU32::new(1);

// -----------------------------------------------------------------------------
// ----- Priority --------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    /// Deliver now (10).
    #[default]
    Immediate,
    /// Deliver at a time that conserves power on the device (5).
    Lazy,
}

impl Priority {
    pub fn code(self) -> u8 {
        match self {
            Priority::Immediate => 10,
            Priority::Lazy => 5,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            5 => Priority::Lazy,
            _ => Priority::Immediate,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PushNotification ------------------------------------------------------

#[derive(Debug)]
pub struct PushNotification {
    device_token: String,
    payload: Payload,
    identifier: u32,
    expiry: u32,
    priority: Priority,
    retry_budget: u32,
    last_error: Option<Arc<PushError>>,
}

// -----------------------------------------------------------------------------
// ----- PushNotification: Static ----------------------------------------------

impl PushNotification {
    /// `device_token` is the hex form handed out by the device. A fresh
    /// identifier is assigned from a process-wide counter.
    pub fn new(device_token: impl Into<String>, payload: Payload) -> Self {
        Self {
            device_token: device_token.into(),
            payload,
            identifier: NEXT_IDENTIFIER.fetch_add(1, Ordering::Relaxed),
            expiry: 0,
            priority: Priority::Immediate,
            retry_budget: DEFAULT_RETRY_BUDGET,
            last_error: None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PushNotification: Builder ---------------------------------------------

impl PushNotification {
    pub fn with_identifier(mut self, identifier: u32) -> Self {
        self.identifier = identifier;
        self
    }

    /// Unix timestamp after which the gateway discards the notification.
    /// 0 means "deliver once or not at all".
    pub fn with_expiry(mut self, unix_seconds: u32) -> Self {
        self.expiry = unix_seconds;
        self
    }

    pub fn expires_in(self, ttl: Duration) -> Self {
        let at = SystemTime::now()
            .checked_add(ttl)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
            .unwrap_or(u32::MAX);
        self.with_expiry(at)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- PushNotification: Public ----------------------------------------------

impl PushNotification {
    pub fn device_token(&self) -> &str {
        &self.device_token
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn identifier(&self) -> u32 {
        self.identifier
    }

    pub fn expiry(&self) -> u32 {
        self.expiry
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// The failure that triggered the most recent retry, if any. It is kept
    /// after the send returns, including when the budget ran out.
    pub fn last_error(&self) -> Option<&PushError> {
        self.last_error.as_deref()
    }
}

// -----------------------------------------------------------------------------
// ----- PushNotification: Crate -----------------------------------------------

impl PushNotification {
    /// Takes one unit of budget. Returns false when none is left.
    pub(crate) fn consume_attempt(&mut self) -> bool {
        if self.retry_budget == 0 {
            return false;
        }
        self.retry_budget -= 1;
        true
    }

    pub(crate) fn record_error(&mut self, err: PushError) {
        self.last_error = Some(Arc::new(err));
    }

    pub(crate) fn shared_last_error(&self) -> Option<Arc<PushError>> {
        self.last_error.clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

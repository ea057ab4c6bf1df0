use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;
use thiserror::Error;

use super::error_response::DecodeError;
use super::wire_serializable::WireSerializable;
use crate::notification::{Priority, PushNotification};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const ENHANCED_COMMAND: u8 = 1;
pub const ITEMIZED_COMMAND: u8 = 2;

/// Largest JSON body the gateway accepts in either frame format.
pub const MAX_PAYLOAD_SIZE: usize = 2048;

const ENHANCED_HEADER_LEN: usize = 1 + 4 + 4 + 2;
const ITEMIZED_HEADER_LEN: usize = 1 + 4;
const ITEM_HEADER_LEN: usize = 1 + 2;

const ITEM_DEVICE_TOKEN: u8 = 1;
const ITEM_PAYLOAD: u8 = 2;
const ITEM_IDENTIFIER: u8 = 3;
const ITEM_EXPIRY: u8 = 4;
const ITEM_PRIORITY: u8 = 5;

// -----------------------------------------------------------------------------
// ----- FrameFormat -----------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// Command 1: identifier, expiry, token, payload.
    #[default]
    Enhanced,
    /// Command 2: item list, adds the delivery priority.
    Itemized,
}

// -----------------------------------------------------------------------------
// ----- Encode ----------------------------------------------------------------

/// Encodes a notification as an enhanced (command 1) frame.
pub fn encode(notification: &PushNotification) -> Result<Bytes, EncodeError> {
    encode_as(notification, FrameFormat::Enhanced)
}

pub fn encode_as(
    notification: &PushNotification,
    format: FrameFormat,
) -> Result<Bytes, EncodeError> {
    let token = hex::decode(notification.device_token())
        .map_err(|e| EncodeError::InvalidDeviceToken(e.to_string()))?;
    let payload = serde_json::to_vec(notification.payload())?;

    let frame = NotificationFrame {
        format,
        identifier: notification.identifier(),
        expiry: notification.expiry(),
        priority: notification.priority(),
        device_token: &token,
        payload: &payload,
    };

    frame.encode()
}

// -----------------------------------------------------------------------------
// ----- NotificationFrame -----------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotificationFrame<'a> {
    pub format: FrameFormat,
    pub identifier: u32,
    pub expiry: u32,
    pub priority: Priority,
    pub device_token: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> WireSerializable<'a> for NotificationFrame<'a> {
    type Error = FrameError;

    fn peek(buf: &[u8]) -> Option<usize> {
        match *buf.first()? {
            ENHANCED_COMMAND => peek_enhanced(buf),
            ITEMIZED_COMMAND => {
                if buf.len() < ITEMIZED_HEADER_LEN {
                    return None;
                }
                let total = ITEMIZED_HEADER_LEN + be_u32(&buf[1..]) as usize;
                (buf.len() >= total).then_some(total)
            }
            _ => None,
        }
    }

    fn to_bytes(&self) -> Result<Bytes, Self::Error> {
        Ok(self.encode()?)
    }

    fn from_bytes(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        match bytes.first().copied() {
            Some(ENHANCED_COMMAND) => parse_enhanced(bytes),
            Some(ITEMIZED_COMMAND) => parse_itemized(bytes),
            Some(other) => Err(DecodeError::UnexpectedCommand(other).into()),
            None => Err(DecodeError::UnexpectedLength {
                expected: ENHANCED_HEADER_LEN,
                actual: 0,
            }
            .into()),
        }
    }

    fn body_size(&self) -> usize {
        let token = self.device_token.len();
        let payload = self.payload.len();
        match self.format {
            FrameFormat::Enhanced => 4 + 4 + 2 + token + 2 + payload,
            FrameFormat::Itemized => 5 * ITEM_HEADER_LEN + token + payload + 4 + 4 + 1,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- NotificationFrame: Private --------------------------------------------

impl NotificationFrame<'_> {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(EncodeError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if self.device_token.len() > u16::MAX as usize {
            return Err(EncodeError::TokenTooLong(self.device_token.len()));
        }

        let bytes = match self.format {
            FrameFormat::Enhanced => self.enhanced_bytes(),
            FrameFormat::Itemized => self.itemized_bytes(),
        };

        Ok(bytes)
    }

    fn enhanced_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.body_size());

        buf.put_u8(ENHANCED_COMMAND);
        buf.put_u32(self.identifier);
        buf.put_u32(self.expiry);
        buf.put_u16(self.device_token.len() as u16);
        buf.extend_from_slice(self.device_token);
        buf.put_u16(self.payload.len() as u16);
        buf.extend_from_slice(self.payload);

        buf.freeze()
    }

    fn itemized_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ITEMIZED_HEADER_LEN + self.body_size());

        buf.put_u8(ITEMIZED_COMMAND);
        buf.put_u32(0); // frame length placeholder

        put_item(&mut buf, ITEM_DEVICE_TOKEN, self.device_token);
        put_item(&mut buf, ITEM_PAYLOAD, self.payload);
        put_item(&mut buf, ITEM_IDENTIFIER, &self.identifier.to_be_bytes());
        put_item(&mut buf, ITEM_EXPIRY, &self.expiry.to_be_bytes());
        put_item(&mut buf, ITEM_PRIORITY, &[self.priority.code()]);

        let len = (buf.len() - ITEMIZED_HEADER_LEN) as u32;
        buf[1..5].copy_from_slice(&len.to_be_bytes());

        buf.freeze()
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload is {size} bytes, gateway maximum is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("device token is not valid hex: {0}")]
    InvalidDeviceToken(String),

    #[error("device token is {0} bytes, longer than a frame can carry")]
    TokenTooLong(usize),

    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

#[inline]
fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn put_item(buf: &mut BytesMut, id: u8, data: &[u8]) {
    buf.put_u8(id);
    buf.put_u16(data.len() as u16);
    buf.extend_from_slice(data);
}

fn peek_enhanced(buf: &[u8]) -> Option<usize> {
    if buf.len() < ENHANCED_HEADER_LEN {
        return None;
    }

    let token_len = be_u16(&buf[9..]) as usize;
    let payload_len_at = ENHANCED_HEADER_LEN + token_len;
    if buf.len() < payload_len_at + 2 {
        return None;
    }

    let payload_len = be_u16(&buf[payload_len_at..]) as usize;
    let total = payload_len_at + 2 + payload_len;
    (buf.len() >= total).then_some(total)
}

fn parse_enhanced(bytes: &[u8]) -> Result<NotificationFrame<'_>, FrameError> {
    let total = peek_enhanced(bytes).ok_or(DecodeError::UnexpectedLength {
        expected: ENHANCED_HEADER_LEN,
        actual: bytes.len(),
    })?;

    if total != bytes.len() {
        return Err(DecodeError::UnexpectedLength {
            expected: total,
            actual: bytes.len(),
        }
        .into());
    }

    let token_len = be_u16(&bytes[9..]) as usize;
    let token_end = ENHANCED_HEADER_LEN + token_len;

    Ok(NotificationFrame {
        format: FrameFormat::Enhanced,
        identifier: be_u32(&bytes[1..]),
        expiry: be_u32(&bytes[5..]),
        priority: Priority::Immediate,
        device_token: &bytes[ENHANCED_HEADER_LEN..token_end],
        payload: &bytes[token_end + 2..],
    })
}

fn parse_itemized(bytes: &[u8]) -> Result<NotificationFrame<'_>, FrameError> {
    let total = NotificationFrame::peek(bytes).ok_or(DecodeError::UnexpectedLength {
        expected: ITEMIZED_HEADER_LEN,
        actual: bytes.len(),
    })?;

    if total != bytes.len() {
        return Err(DecodeError::UnexpectedLength {
            expected: total,
            actual: bytes.len(),
        }
        .into());
    }

    let mut frame = NotificationFrame {
        format: FrameFormat::Itemized,
        identifier: 0,
        expiry: 0,
        priority: Priority::Immediate,
        device_token: &[],
        payload: &[],
    };
    let mut seen_token = false;
    let mut seen_payload = false;

    let mut rest = &bytes[ITEMIZED_HEADER_LEN..];
    while !rest.is_empty() {
        if rest.len() < ITEM_HEADER_LEN {
            return Err(DecodeError::UnexpectedLength {
                expected: ITEM_HEADER_LEN,
                actual: rest.len(),
            }
            .into());
        }

        let id = rest[0];
        let len = be_u16(&rest[1..]) as usize;
        let end = ITEM_HEADER_LEN + len;
        if rest.len() < end {
            return Err(DecodeError::UnexpectedLength {
                expected: end,
                actual: rest.len(),
            }
            .into());
        }
        let data = &rest[ITEM_HEADER_LEN..end];

        match (id, len) {
            (ITEM_DEVICE_TOKEN, _) => {
                frame.device_token = data;
                seen_token = true;
            }
            (ITEM_PAYLOAD, _) => {
                frame.payload = data;
                seen_payload = true;
            }
            (ITEM_IDENTIFIER, 4) => frame.identifier = be_u32(data),
            (ITEM_EXPIRY, 4) => frame.expiry = be_u32(data),
            (ITEM_PRIORITY, 1) => frame.priority = Priority::from_code(data[0]),
            (ITEM_IDENTIFIER | ITEM_EXPIRY | ITEM_PRIORITY, _) => {
                return Err(DecodeError::UnexpectedLength {
                    expected: if id == ITEM_PRIORITY { 1 } else { 4 },
                    actual: len,
                }
                .into());
            }
            _ => {} // unknown items are skipped
        }

        rest = &rest[end..];
    }

    if !seen_token {
        return Err(DecodeError::MissingItem(ITEM_DEVICE_TOKEN).into());
    }
    if !seen_payload {
        return Err(DecodeError::MissingItem(ITEM_PAYLOAD).into());
    }

    Ok(frame)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Payload;

    const TOKEN: &str = "8d5a4b1f04a6f6e2b1fbd6c8b8c0d43e4c8be1a3c1e1b0c3f6b2f8c07a1e2d3f";

    fn notification() -> PushNotification {
        PushNotification::new(TOKEN, Payload::new().alert("hello").badge(3))
            .with_identifier(42)
            .with_expiry(1_700_000_000)
    }

    #[test]
    fn enhanced_frame_length_matches_fields() {
        let n = notification();
        let payload = serde_json::to_vec(n.payload()).unwrap();
        let frame = encode(&n).unwrap();

        let t = TOKEN.len() / 2;
        let p = payload.len();
        assert_eq!(frame.len(), 1 + 4 + 4 + 2 + t + 2 + p);

        assert_eq!(frame[0], ENHANCED_COMMAND);
        assert_eq!(be_u32(&frame[1..]), 42);
        assert_eq!(be_u32(&frame[5..]), 1_700_000_000);
        assert_eq!(be_u16(&frame[9..]) as usize, t);
        assert_eq!(be_u16(&frame[11 + t..]) as usize, p);
        assert_eq!(&frame[13 + t..], &payload[..]);
    }

    #[test]
    fn enhanced_frame_parses_back() {
        let frame = encode(&notification()).unwrap();
        assert_eq!(NotificationFrame::peek(&frame), Some(frame.len()));
        assert_eq!(NotificationFrame::peek(&frame[..frame.len() - 1]), None);

        let parsed = NotificationFrame::from_bytes(&frame).unwrap();
        assert_eq!(parsed.identifier, 42);
        assert_eq!(parsed.device_token, &hex::decode(TOKEN).unwrap()[..]);
        let body: serde_json::Value = serde_json::from_slice(parsed.payload).unwrap();
        assert_eq!(body["aps"]["alert"], "hello");
        assert_eq!(body["aps"]["badge"], 3);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let big = "x".repeat(MAX_PAYLOAD_SIZE);
        let n = PushNotification::new(TOKEN, Payload::new().alert(big));

        match encode(&n).unwrap_err() {
            EncodeError::PayloadTooLarge { size, max } => {
                assert!(size > MAX_PAYLOAD_SIZE);
                assert_eq!(max, MAX_PAYLOAD_SIZE);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn non_hex_token_is_rejected() {
        let n = PushNotification::new("not-a-token", Payload::new().alert("hi"));
        assert!(matches!(
            encode(&n).unwrap_err(),
            EncodeError::InvalidDeviceToken(_)
        ));
    }

    #[test]
    fn itemized_frame_carries_priority() {
        let n = notification().with_priority(Priority::Lazy);
        let frame = encode_as(&n, FrameFormat::Itemized).unwrap();

        assert_eq!(frame[0], ITEMIZED_COMMAND);
        assert_eq!(
            be_u32(&frame[1..]) as usize,
            frame.len() - ITEMIZED_HEADER_LEN
        );

        let parsed = NotificationFrame::from_bytes(&frame).unwrap();
        assert_eq!(parsed.format, FrameFormat::Itemized);
        assert_eq!(parsed.priority, Priority::Lazy);
        assert_eq!(parsed.identifier, 42);
        assert_eq!(parsed.expiry, 1_700_000_000);
        assert_eq!(parsed.device_token.len(), TOKEN.len() / 2);
    }

    #[test]
    fn itemized_frame_requires_token_and_payload() {
        let mut buf = BytesMut::new();
        buf.put_u8(ITEMIZED_COMMAND);
        buf.put_u32(7);
        put_item(&mut buf, ITEM_IDENTIFIER, &9u32.to_be_bytes());

        let err = NotificationFrame::from_bytes(&buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Decode(DecodeError::MissingItem(ITEM_DEVICE_TOKEN))
        ));
    }

    #[test]
    fn trailing_bytes_are_a_length_mismatch() {
        let mut frame = encode(&notification()).unwrap().to_vec();
        frame.push(0);
        assert!(matches!(
            NotificationFrame::from_bytes(&frame).unwrap_err(),
            FrameError::Decode(DecodeError::UnexpectedLength { .. })
        ));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(matches!(
            NotificationFrame::from_bytes(&[9, 0, 0]).unwrap_err(),
            FrameError::Decode(DecodeError::UnexpectedCommand(9))
        ));
        assert_eq!(NotificationFrame::peek(&[9, 0, 0]), None);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------

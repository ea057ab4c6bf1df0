//! Binary gateway protocol: outbound notification frames and the inbound
//! 6-byte error response.

pub mod error_response;
pub mod notification_frame;
pub mod status;
pub mod wire_serializable;

pub use error_response::{DecodeError, ERROR_RESPONSE_LEN, ErrorResponse};
pub use notification_frame::{
    EncodeError, FrameError, FrameFormat, MAX_PAYLOAD_SIZE, NotificationFrame, encode, encode_as,
};
pub use status::ResponseStatus;
pub use wire_serializable::WireSerializable;

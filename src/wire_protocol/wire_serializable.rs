use bytes::Bytes;
use std::error::Error as StdError;

pub trait WireSerializable<'a>: Sized {
    type Error: StdError + Send + Sync + 'static;

    /// Look ahead at the buffer to determine if the frame is complete,
    /// returning the total number of bytes the frame occupies.
    fn peek(buf: &[u8]) -> Option<usize>;

    /// Serialize the object into bytes for wire transmission.
    fn to_bytes(&self) -> Result<Bytes, Self::Error>;

    /// Deserialize from bytes into the object.
    fn from_bytes(bytes: &'a [u8]) -> Result<Self, Self::Error>;

    /// Size of the body of the frame (everything after the header).
    fn body_size(&self) -> usize;
}

//! Wire protocol spoken by the inference server over a raw byte stream.
//!
//! A request is an 8 byte header holding two big endian `u32` image counts,
//! followed by the left images and then the right images, each one
//! `64 x 64 x 3` bytes in row-major, channel-last order. A response is a
//! single text line: `json` followed by the JSON array of probabilities.

mod frame;
mod receiver;
mod sender;

use tokio::io::{AsyncRead, AsyncWrite};

pub use frame::{CHANNELS, HEADER_SIZE, Header, IMAGE_BYTES, IMAGE_SIDE, Request};
pub use receiver::FrameReader;
pub use sender::{RESPONSE_PREFIX, ResponseWriter};

/// Creates both `FrameReader` and `ResponseWriter` stream parts.
///
/// # Arguments
/// * `rx` - An async readable carrying requests.
/// * `tx` - An async writable receiving responses.
///
/// # Returns
/// The request reader and the response writer.
pub fn channel<R, W>(rx: R, tx: W) -> (FrameReader<R>, ResponseWriter<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FrameReader::new(rx), ResponseWriter::new(tx))
}

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{HEADER_SIZE, Header, IMAGE_BYTES, Request};

/// Upper bound on the payload buffer reserved before any byte arrives.
const PREALLOC_LIMIT: usize = 64 * IMAGE_BYTES;

/// The receiving end of the scoring stream.
pub struct FrameReader<R: AsyncRead + Unpin> {
    rx: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Creates a new `FrameReader` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Waits for the next request on the inner reader.
    ///
    /// # Returns
    /// `None` when the stream ends cleanly, that is, before any byte of a new
    /// header arrives.
    ///
    /// # Errors
    /// `UnexpectedEof` if the stream ends in the middle of a frame, either
    /// inside the header or inside an image payload. `InvalidData` if the
    /// declared counts cannot be addressed.
    pub async fn recv(&mut self) -> io::Result<Option<Request>> {
        let Some(header) = self.recv_header().await? else {
            return Ok(None);
        };

        let left = self.recv_payload(header.left_len()?, "left images").await?;
        let right = self.recv_payload(header.right_len()?, "right images").await?;

        Ok(Some(Request { left, right }))
    }

    async fn recv_header(&mut self) -> io::Result<Option<Header>> {
        let mut buf = [0; HEADER_SIZE];
        let mut filled = 0;

        while filled < HEADER_SIZE {
            let n = self.rx.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }

            filled += n;
        }

        match filled {
            0 => Ok(None),
            HEADER_SIZE => Ok(Some(Header::from_bytes(buf))),
            n => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream closed inside a header after {n} of {HEADER_SIZE} bytes"),
            )),
        }
    }

    /// Reads `len` payload bytes, growing the buffer only as bytes arrive.
    async fn recv_payload(&mut self, len: usize, what: &str) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        (&mut self.rx).take(len as u64).read_to_end(&mut buf).await?;

        if buf.len() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "stream closed inside {what} after {} of {len} bytes",
                    buf.len()
                ),
            ));
        }

        Ok(buf)
    }
}

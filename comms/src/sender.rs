//! The sending end of the scoring stream.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Literal prefix of every response line.
pub const RESPONSE_PREFIX: &[u8] = b"json";

/// Writes one response line per request.
pub struct ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    /// Creates a new `ResponseWriter` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Writes `json<probs>` followed by a newline and flushes, so the reader
    /// sees the answer before the next request is read.
    ///
    /// Non finite probabilities are written as JSON `null`.
    ///
    /// # Arguments
    /// * `probs` - The probability for each scored pair.
    pub async fn send(&mut self, probs: &[f32]) -> io::Result<()> {
        let Self { tx, buf } = self;

        buf.clear();
        buf.extend_from_slice(RESPONSE_PREFIX);
        serde_json::to_writer(&mut *buf, probs)?;
        buf.push(b'\n');

        tx.write_all(buf).await?;
        tx.flush().await
    }
}

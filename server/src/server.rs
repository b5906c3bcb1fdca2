use comms::{FrameReader, ResponseWriter};
use log::{debug, info};
use machine_learning::images_to_tensor;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Result, Scorer};

/// Answers scoring requests one at a time until the request stream closes.
///
/// Each request is read whole, scored and answered with a flushed line
/// before the next header is read.
///
/// # Arguments
/// * `rx` - The request stream.
/// * `tx` - The response stream.
/// * `scorer` - What turns crop pairs into probabilities.
///
/// # Returns
/// The number of requests answered.
///
/// # Errors
/// Any read, scoring or write failure, including a request cut short by
/// the end of the stream.
pub async fn serve<R, W, S>(
    mut rx: FrameReader<R>,
    mut tx: ResponseWriter<W>,
    scorer: &mut S,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Scorer + ?Sized,
{
    let mut answered = 0;

    while let Some(request) = rx.recv().await? {
        debug!(
            left = request.left_count(),
            right = request.right_count();
            "received request"
        );

        let left: Vec<&[u8]> = request.left_images().collect();
        let right: Vec<&[u8]> = request.right_images().collect();

        let probs = scorer.score(images_to_tensor(&left)?, images_to_tensor(&right)?)?;
        tx.send(&probs).await?;

        answered += 1;
    }

    info!(answered = answered; "request stream closed");
    Ok(answered)
}

//! Writer task: serialises chunk batches onto the stream.

use std::sync::Arc;

use futures::SinkExt;
use log::debug;
use tokio::{io::AsyncWrite, sync::mpsc};
use tokio_util::codec::FramedWrite;

use super::Shared;
use crate::{
    chunk::{ChunkBatch, ChunkCodec, ChunkCodecError},
    error::Error,
    metrics::{self, Direction},
};

/// Drain `queue` onto the stream until shutdown or a write error.
pub(super) async fn run<W>(
    mut sink: FramedWrite<W, ChunkCodec>,
    mut queue: mpsc::UnboundedReceiver<ChunkBatch>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let batch = tokio::select! {
            biased;

            () = shared.shutdown.cancelled() => break,
            batch = queue.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };
        let message_id = batch.message_id();
        let count = batch.len() as u64;
        let written = tokio::select! {
            biased;

            () = shared.shutdown.cancelled() => break,
            result = write_batch(&mut sink, batch) => result,
        };
        if let Err(err) = written {
            shared.fail(
                Error::WriteError,
                &format!("failed to write message {message_id}: {err}"),
            );
            break;
        }
        metrics::inc_chunks(Direction::Outbound, count);
    }

    // Dropping the sink together with the reader's half releases the stream.
    debug!("writer stopped: queued_batches={}", queue.len());
}

/// Write every chunk of `batch` and flush once, keeping the batch contiguous.
async fn write_batch<W>(
    sink: &mut FramedWrite<W, ChunkCodec>,
    batch: ChunkBatch,
) -> Result<(), ChunkCodecError>
where
    W: AsyncWrite + Unpin,
{
    for chunk in batch {
        sink.feed(chunk).await?;
    }
    sink.flush().await
}

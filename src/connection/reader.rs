//! Reader task: reassembles inbound chunks and dispatches responses.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, warn};
use tokio::{
    io::AsyncRead,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::codec::FramedRead;

use super::Shared;
use crate::{
    chunk::{Chunk, ChunkCodec, ChunkCodecError, ReassembledMessage, Reassembler, ReassemblyError},
    error::Error,
    metrics::{self, Direction},
    response::Response,
};

/// Drive the inbound half of the connection until shutdown or failure.
pub(super) async fn run<R>(mut frames: FramedRead<R, ChunkCodec>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut reassembler = Reassembler::new(shared.config.chunk());
    let mut sweep = time::interval(shared.config.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = shared.shutdown.cancelled() => break,
            // Ahead of frames so a busy stream cannot starve deadlines.
            _ = sweep.tick() => shared.sweep(&mut reassembler, Instant::now()),
            frame = frames.next() => match frame {
                Some(Ok(chunk)) => {
                    metrics::inc_chunks(Direction::Inbound, 1);
                    if let Err(err) = shared.accept(&mut reassembler, chunk, Instant::now()) {
                        shared.fail(Error::ProtocolError, &err.to_string());
                        break;
                    }
                }
                Some(Err(err)) => {
                    let error = match &err {
                        ChunkCodecError::Io(_) => Error::ReadError,
                        ChunkCodecError::UnexpectedEof { .. } => Error::ConnectionClosed,
                        ChunkCodecError::Chunk(_) => Error::ProtocolError,
                    };
                    shared.fail(error, &err.to_string());
                    break;
                }
                None => {
                    shared.fail(Error::ConnectionClosed, "peer closed the stream");
                    break;
                }
            },
        }
    }

    if reassembler.buffered_len() > 0 {
        debug!(
            "discarding {} partial messages on shutdown",
            reassembler.buffered_len()
        );
    }
    reassembler.clear();
}

impl Shared {
    /// Feed one chunk to the reassembler.
    ///
    /// Returns the error only when the stream cannot be parsed any further.
    fn accept(
        &self,
        reassembler: &mut Reassembler,
        chunk: Chunk,
        now: Instant,
    ) -> Result<(), ReassemblyError> {
        match reassembler.push_at(chunk, now.into_std()) {
            Ok(Some(message)) => {
                self.dispatch(message);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                if matches!(err, ReassemblyError::UnknownMessage { .. }) {
                    metrics::inc_orphan_chunks();
                }
                warn!("dropping chunk: {err}");
                if let Some(id) = err.aborted_message() {
                    self.resolve(id, Err(Error::ProtocolError));
                }
                Ok(())
            }
        }
    }

    /// Hand a complete message to the request waiting for it.
    fn dispatch(&self, message: ReassembledMessage) {
        let id = message.message_id();
        let Some(pending) = self.pending.take(id) else {
            warn!("dropping response for unknown message id: message_id={id}");
            return;
        };
        let outcome = Response::decode(id, &message.into_payload(), self.config.body_codec.as_ref())
            .map_err(|err| {
                warn!("malformed response: message_id={id}, error={err}");
                Error::ProtocolError
            });
        debug!(
            "dispatching response: message_id={id}, elapsed={:?}",
            pending.submitted_at.elapsed()
        );
        pending.resolve(outcome);
    }

    /// Expire overdue requests and stalled reassembly buffers.
    fn sweep(&self, reassembler: &mut Reassembler, now: Instant) {
        for id in reassembler.purge_expired_at(now.into_std()) {
            debug!("evicted stalled reassembly buffer: message_id={id}");
            if self.resolve(id, Err(Error::Timeout)) {
                metrics::inc_request_timeouts();
            }
        }
        for (id, pending) in self.pending.take_expired(now) {
            debug!("request timed out: message_id={id}");
            metrics::inc_request_timeouts();
            pending.resolve(Err(Error::Timeout));
        }
    }
}

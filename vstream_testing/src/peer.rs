//! Simulated server peer for driving a `vstream` connection in tests.
//!
//! The peer reads the version preamble, reassembles requests from chunks,
//! records what it saw, and answers through a handler closure. Responses are
//! chunked with the peer's own chunk size so tests can exercise multi-chunk
//! replies independently of the client's settings.

use std::{
    collections::HashMap,
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, DuplexStream, duplex},
    net::TcpListener,
    task::JoinHandle,
};
use tokio_util::codec::Framed;
use vstream::{
    Request,
    Response,
    chunk::{ChunkCodec, ChunkConfig, ChunkHeader, Chunker, HeaderCodec, MessageId, Reassembler},
    message::LengthPrefixedHeader,
    preamble::read_preamble,
};

/// Decides how the peer answers a request; `None` leaves it unanswered.
pub type Handler = Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

/// A request as the peer received it.
#[derive(Clone, Debug)]
pub struct ObservedRequest {
    /// Message id the client assigned.
    pub message_id: MessageId,
    /// Decoded request.
    pub request: Request,
    /// Headers of the chunks that carried it, in arrival order.
    pub chunks: Vec<ChunkHeader>,
    /// Length of the encoded message payload.
    pub message_length: usize,
}

type Observed = Arc<Mutex<Vec<ObservedRequest>>>;

/// Builder for a simulated peer.
#[derive(Clone)]
pub struct SimulatedPeer {
    handler: Handler,
    chunk: ChunkConfig,
    mismatch_ids: bool,
}

impl SimulatedPeer {
    /// Peer answering each request with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            chunk: ChunkConfig::default(),
            mismatch_ids: false,
        }
    }

    /// Peer answering `200` with the request body echoed back.
    #[must_use]
    pub fn echo() -> Self {
        Self::new(|request| Some(Response::new(200).with_body(request.body().clone())))
    }

    /// Peer that never answers.
    #[must_use]
    pub fn silent() -> Self { Self::new(|_| None) }

    /// Chunk size used for responses.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk = self.chunk.with_chunk_size(size);
        self
    }

    /// Answer under a different message id than the request used, so no
    /// response ever matches.
    #[must_use]
    pub fn with_mismatched_ids(mut self) -> Self {
        self.mismatch_ids = true;
        self
    }

    /// Serve one in-memory connection; returns the client's end.
    #[must_use]
    pub fn spawn(self) -> (DuplexStream, PeerHandle) {
        let (client, server) = duplex(256 * 1024);
        let observed = Observed::default();
        let task = tokio::spawn(self.serve(server, Arc::clone(&observed)));
        (client, PeerHandle { observed, task })
    }

    /// Accept and serve one TCP connection on an ephemeral localhost port.
    ///
    /// # Errors
    ///
    /// Returns any error binding the listener.
    pub async fn spawn_tcp(self) -> io::Result<(SocketAddr, PeerHandle)> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let observed = Observed::default();
        let task = tokio::spawn({
            let observed = Arc::clone(&observed);
            async move {
                let (stream, _) = listener.accept().await?;
                self.serve(stream, observed).await
            }
        });
        Ok((addr, PeerHandle { observed, task }))
    }

    async fn serve<S>(self, mut io: S, observed: Observed) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let version = read_preamble(&mut io).await.map_err(io::Error::other)?;
        let codec = ChunkCodec::new(HeaderCodec::new(
            version,
            self.chunk.max_inbound_chunk().get(),
        ));
        let chunker = Chunker::new(
            HeaderCodec::new(version, self.chunk.chunk_size().get()),
            &self.chunk,
        );
        let mut reassembler = Reassembler::new(&self.chunk);
        let mut headers: HashMap<MessageId, Vec<ChunkHeader>> = HashMap::new();
        let mut frames = Framed::new(io, codec);

        while let Some(chunk) = frames.next().await {
            let chunk = chunk.map_err(io::Error::other)?;
            let header = *chunk.header();
            headers
                .entry(header.message_id())
                .or_default()
                .push(header);
            let Some(message) = reassembler.push(chunk).map_err(io::Error::other)? else {
                continue;
            };

            let message_id = message.message_id();
            let payload: Bytes = message.into_payload();
            let request =
                Request::decode(&payload, &LengthPrefixedHeader).map_err(io::Error::other)?;
            let reply = (self.handler)(&request);
            observed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(ObservedRequest {
                    message_id,
                    request,
                    chunks: headers.remove(&message_id).unwrap_or_default(),
                    message_length: payload.len(),
                });

            if let Some(response) = reply {
                let encoded = response.encode().map_err(io::Error::other)?;
                let reply_id = if self.mismatch_ids {
                    MessageId::new(message_id.get().wrapping_add(999))
                } else {
                    message_id
                };
                let batch = chunker.chunk(reply_id, encoded).map_err(io::Error::other)?;
                for chunk in batch {
                    frames.feed(chunk).await.map_err(io::Error::other)?;
                }
                frames.flush().await.map_err(io::Error::other)?;
            }
        }
        Ok(())
    }
}

/// Handle to a running simulated peer.
#[derive(Debug)]
pub struct PeerHandle {
    observed: Observed,
    task: JoinHandle<io::Result<()>>,
}

impl PeerHandle {
    /// Requests received so far.
    #[must_use]
    pub fn observed(&self) -> Vec<ObservedRequest> {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the peer immediately, dropping its end of the stream.
    pub fn abort(&self) { self.task.abort(); }

    /// Wait for the peer to finish, which happens when the client closes.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the peer, if any.
    pub async fn join(self) -> io::Result<()> { self.task.await.map_err(io::Error::other)? }
}

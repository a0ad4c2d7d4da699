//! Multiplexed request/response connection.
//!
//! A [`Connection`] owns one byte stream split between two tasks. The writer
//! task drains a queue of chunk batches and writes each batch back to back,
//! so chunks of concurrently submitted messages never interleave. The reader
//! task reassembles inbound chunks, matches completed responses to pending
//! requests by message id, and sweeps expired deadlines.
//!
//! Any number of threads or tasks may submit requests through clones of the
//! same handle. Each request is resolved exactly once: with its response,
//! with [`Error::Timeout`], or with the error that closed the connection.

mod builder;
mod config;
mod hooks;
mod pending;
mod reader;
mod state;
mod writer;

use std::{
    fmt,
    sync::{Arc, atomic::AtomicU64},
};

pub use builder::ConnectionBuilder;
pub use config::{
    ConnectionConfig,
    DEFAULT_CONNECT_RETRIES,
    DEFAULT_CONNECT_RETRY_PAUSE,
    DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SWEEP_INTERVAL,
};
pub use hooks::{FailureHook, ResponseCallback};
use log::{debug, info, warn};
use pending::{Continuation, PendingRequest, PendingTable};
pub use state::ConnectionState;
use state::StateCell;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
    task::TaskTracker,
};

use crate::{
    chunk::{ChunkBatch, ChunkCodec, Chunker},
    error::{Error, ErrorCode},
    request::Request,
    response::Response,
};

/// State shared by every handle and both I/O tasks.
struct Shared {
    state: StateCell,
    pending: PendingTable,
    next_id: AtomicU64,
    config: ConnectionConfig,
    chunker: Chunker,
    outbound: mpsc::UnboundedSender<ChunkBatch>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Shared {
    /// Register `continuation`, chunk `request` and queue it for writing.
    ///
    /// Every failure is reported through the continuation itself.
    fn submit(&self, request: Request, reply: Reply) {
        if let Some(error) = self.state.load().rejection() {
            debug!("rejecting request while {:?}: {error}", self.state.load());
            reply.into_continuation(request).resolve(Err(error));
            return;
        }

        let payload = match request.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode request: path={}, error={err}", request.path());
                reply
                    .into_continuation(request)
                    .resolve(Err(Error::ProtocolError));
                return;
            }
        };
        let deadline = request
            .timeout()
            .or(self.config.request_timeout)
            .map(|timeout| Instant::now() + timeout);

        let pending = PendingRequest::new(reply.into_continuation(request), deadline);
        let id = match self.pending.insert(&self.next_id, pending) {
            Ok(id) => id,
            Err(pending) => {
                debug!("in-flight cap reached: requests_left={}", self.pending.len());
                pending.resolve(Err(Error::QueueCapacityExceeded));
                return;
            }
        };

        // A close racing this submission may have drained the table before
        // the insert landed; whoever takes the slot resolves it.
        if self.state.load() != ConnectionState::Connected {
            self.resolve(id, Err(Error::ConnectionClosed));
            return;
        }

        let batch = match self.chunker.chunk(id, payload) {
            Ok(batch) => batch,
            Err(err) => {
                warn!("failed to chunk request: message_id={id}, error={err}");
                self.resolve(id, Err(Error::ProtocolError));
                return;
            }
        };
        debug!(
            "queued request: message_id={id}, chunks={}, bytes={}",
            batch.len(),
            batch.wire_len()
        );
        if self.outbound.send(batch).is_err() {
            self.resolve(id, Err(Error::ConnectionClosed));
        }
    }

    /// Resolve the request stored under `id`, if it is still pending.
    ///
    /// Returns `false` when another path already resolved it.
    fn resolve(&self, id: crate::chunk::MessageId, outcome: Result<Response, Error>) -> bool {
        match self.pending.take(id) {
            Some(pending) => {
                pending.resolve(outcome);
                true
            }
            None => false,
        }
    }

    fn cancel_pending(&self, error: Error) {
        let drained = self.pending.drain();
        if !drained.is_empty() {
            debug!("resolving {} pending requests with {error}", drained.len());
        }
        for (_, pending) in drained {
            pending.resolve(Err(error));
        }
    }

    /// Close at the caller's request. Pending requests resolve with
    /// [`Error::Canceled`].
    fn close(&self) {
        if !self.state.begin_close(Error::CloseRequested) {
            return;
        }
        info!("closing connection: requests_left={}", self.pending.len());
        self.teardown(Error::Canceled);
    }

    /// Close because of `error`. Pending requests resolve with `error` and
    /// the failure hook runs once.
    fn fail(&self, error: Error, reason: &str) {
        if !self.state.begin_close(error) {
            return;
        }
        tracing::error!(
            error = %error,
            code = %error.code(),
            reason,
            requests_left = self.pending.len(),
            "connection failed"
        );
        if let Some(hook) = &self.config.on_failure {
            hook(&error, reason);
        }
        self.teardown(error);
    }

    fn teardown(&self, error: Error) {
        self.shutdown.cancel();
        self.cancel_pending(error);
        self.state.set(ConnectionState::Closed);
        crate::metrics::dec_connections();
    }
}

/// Caller-side half of a continuation, before the request is registered.
enum Reply {
    Wait(oneshot::Sender<Result<Response, Error>>),
    Call(ResponseCallback),
}

impl Reply {
    fn into_continuation(self, request: Request) -> Continuation {
        match self {
            Self::Wait(tx) => Continuation::Waiter(tx),
            Self::Call(callback) => Continuation::callback(request, callback),
        }
    }
}

/// Closes the connection when the last user handle is dropped.
struct CloseOnDrop(Arc<Shared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) { self.0.close(); }
}

/// Handle to a multiplexed connection.
///
/// Cloning is cheap and every clone shares the same stream. Dropping the last
/// clone closes the connection.
///
/// # Examples
///
/// ```no_run
/// use vstream::{Connection, RestVerb, create_request};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), vstream::Error> {
/// let connection = Connection::builder().connect("127.0.0.1:8529").await?;
/// let response = connection
///     .send_request(create_request(RestVerb::Get, "/_api/version"))
///     .await?;
/// println!("{} {:?}", response.status_code(), response.body());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    _guard: Arc<CloseOnDrop>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("requests_left", &self.requests_left())
            .field("last_error", &self.last_error())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Start configuring a new connection.
    #[must_use]
    pub fn builder() -> ConnectionBuilder { ConnectionBuilder::new() }

    /// Spawn the I/O tasks over an established stream whose preamble has
    /// already been written.
    fn start<T>(io: T, config: ConnectionConfig, state: StateCell) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = ChunkCodec::new(config.inbound_codec());
        let (read_half, write_half) = tokio::io::split(io);
        let (outbound, queue) = mpsc::unbounded_channel();
        state.set(ConnectionState::Connected);

        let shared = Arc::new(Shared {
            state,
            pending: PendingTable::new(config.max_in_flight),
            next_id: AtomicU64::new(1),
            chunker: config.chunker(),
            config,
            outbound,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });
        crate::metrics::inc_connections();
        info!(
            "connection established: version={}, chunk_size={}",
            shared.config.version,
            shared.chunker.chunk_size()
        );

        shared.tracker.spawn(reader::run(
            FramedRead::new(read_half, codec),
            Arc::clone(&shared),
        ));
        shared.tracker.spawn(writer::run(
            FramedWrite::new(write_half, codec),
            queue,
            Arc::clone(&shared),
        ));
        shared.tracker.close();

        Self {
            _guard: Arc::new(CloseOnDrop(Arc::clone(&shared))),
            shared,
        }
    }

    /// Send `request` and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`Error`] when the connection is not connected, the request
    /// times out, or the connection closes first.
    pub async fn send_request(&self, request: Request) -> Result<Response, Error> {
        let (tx, rx) = oneshot::channel();
        self.shared.submit(request, Reply::Wait(tx));
        rx.await.unwrap_or(Err(Error::Canceled))
    }

    /// Send `request` and block the calling thread until it resolves.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request).
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`send_request`](Self::send_request) there instead.
    pub fn send_request_blocking(&self, request: Request) -> Result<Response, Error> {
        let (tx, rx) = oneshot::channel();
        self.shared.submit(request, Reply::Wait(tx));
        rx.blocking_recv().unwrap_or(Err(Error::Canceled))
    }

    /// Send `request` without waiting. `callback` runs exactly once with the
    /// outcome and the original request.
    ///
    /// The callback usually runs on the connection's reader task, so it must
    /// not block. Submissions rejected up front invoke it immediately on the
    /// calling thread.
    pub fn send_request_async<F>(&self, request: Request, callback: F)
    where
        F: FnOnce(Result<Response, Error>, Request) + Send + 'static,
    {
        self.shared.submit(request, Reply::Call(Box::new(callback)));
    }

    /// Requests submitted but not yet resolved.
    ///
    /// Callers may poll this to pace submissions; no cap is enforced unless
    /// [`ConnectionBuilder::max_in_flight`] was set.
    #[must_use]
    pub fn requests_left(&self) -> usize { self.shared.pending.len() }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.shared.state.load() }

    /// Error that closed the connection, or [`ErrorCode::NoError`].
    #[must_use]
    pub fn last_error(&self) -> ErrorCode { self.shared.state.last_error() }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.shared.config }

    /// Close the connection, resolving pending requests with
    /// [`Error::Canceled`]. Closing twice is a no-op.
    pub fn close(&self) { self.shared.close(); }

    /// Wait until both I/O tasks have exited.
    pub async fn closed(&self) { self.shared.tracker.wait().await; }
}

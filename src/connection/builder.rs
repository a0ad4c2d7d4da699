//! Builder establishing a [`Connection`].

use std::{fmt, num::NonZeroUsize, sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
    time::{sleep, timeout},
};

use super::{
    Connection,
    ConnectionConfig,
    ConnectionState,
    FailureHook,
    state::StateCell,
};
use crate::{
    chunk::{ChunkConfig, ProtocolVersion},
    error::Error,
    message::BodyCodec,
    preamble::write_preamble,
};

/// Configures and opens a [`Connection`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use vstream::{Connection, chunk::ProtocolVersion};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), vstream::Error> {
/// let connection = Connection::builder()
///     .version(ProtocolVersion::V1_0)
///     .request_timeout(Some(Duration::from_secs(30)))
///     .on_failure(|error, reason| eprintln!("connection lost: {error} ({reason})"))
///     .connect("127.0.0.1:8529")
///     .await?;
/// # drop(connection);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a builder with default settings.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Protocol version announced in the preamble.
    #[must_use]
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.config.version = version;
        self
    }

    /// Chunk sizing and reassembly limits.
    #[must_use]
    pub fn chunk_config(mut self, chunk: ChunkConfig) -> Self {
        self.config.chunk = chunk;
        self
    }

    /// Default request timeout; `None` lets requests wait indefinitely.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// How often deadlines and stalled reassembly buffers are checked.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Reject submissions with [`Error::QueueCapacityExceeded`] once `limit`
    /// requests are in flight.
    #[must_use]
    pub fn max_in_flight(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.config.max_in_flight = limit;
        self
    }

    /// Time allowed for each connect attempt.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Attempts made after the first connect failure, and the pause between
    /// them.
    #[must_use]
    pub fn connect_retries(mut self, retries: u32, pause: Duration) -> Self {
        self.config.max_connect_retries = retries;
        self.config.connect_retry_pause = pause;
        self
    }

    /// Configure `TCP_NODELAY` on sockets opened by [`connect`](Self::connect).
    #[must_use]
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Replace the codec used to validate response envelopes.
    #[must_use]
    pub fn body_codec(mut self, codec: impl BodyCodec) -> Self {
        self.config.body_codec = Arc::new(codec);
        self
    }

    /// Register a handler run once when the connection fails.
    #[must_use]
    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Error, &str) + Send + Sync + 'static,
    {
        self.config.on_failure = Some(Arc::new(hook) as FailureHook);
        self
    }

    /// Configuration assembled so far.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.config }

    /// Open a TCP connection to `addr`, retrying failed attempts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CouldNotConnect`] once every attempt has failed or
    /// the preamble cannot be written.
    pub async fn connect<A>(self, addr: A) -> Result<Connection, Error>
    where
        A: ToSocketAddrs + Clone + fmt::Display,
    {
        let state = StateCell::new();
        state.set(ConnectionState::Connecting);
        let attempts = self.config.max_connect_retries.saturating_add(1);

        for attempt in 1..=attempts {
            match timeout(self.config.connect_timeout, TcpStream::connect(addr.clone())).await {
                Ok(Ok(stream)) => {
                    if let Err(err) = stream.set_nodelay(self.config.nodelay) {
                        debug!("failed to set TCP_NODELAY: {err}");
                    }
                    info!("connected: endpoint={addr}, attempt={attempt}");
                    return self.handshake(stream, state).await;
                }
                Ok(Err(err)) => {
                    warn!("connect attempt failed: endpoint={addr}, attempt={attempt}, error={err}");
                }
                Err(_) => {
                    warn!("connect attempt timed out: endpoint={addr}, attempt={attempt}");
                }
            }
            if attempt < attempts {
                sleep(self.config.connect_retry_pause).await;
            }
        }

        self.give_up(&format!("could not connect to {addr} after {attempts} attempts"))
    }

    /// Run the protocol over an already established stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CouldNotConnect`] if the preamble cannot be written.
    pub async fn connect_stream<T>(self, io: T) -> Result<Connection, Error>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let state = StateCell::new();
        state.set(ConnectionState::Connecting);
        self.handshake(io, state).await
    }

    async fn handshake<T>(self, mut io: T, state: StateCell) -> Result<Connection, Error>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if let Err(err) = write_preamble(&mut io, self.config.version).await {
            return self.give_up(&err.to_string());
        }
        Ok(Connection::start(io, self.config, state))
    }

    fn give_up(self, reason: &str) -> Result<Connection, Error> {
        let error = Error::CouldNotConnect;
        tracing::error!(error = %error, reason, "connection could not be established");
        if let Some(hook) = &self.config.on_failure {
            hook(&error, reason);
        }
        Err(error)
    }
}

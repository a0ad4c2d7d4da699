//! Callback types invoked by a connection.

use std::sync::Arc;

use crate::{error::Error, request::Request, response::Response};

/// Handler invoked once when a connection fails or is closed by its peer.
///
/// Receives the error kind and a human-readable reason. It runs on the
/// connection's I/O task, so it must not block.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use vstream::connection::FailureHook;
///
/// let hook: FailureHook = Arc::new(|error, reason| eprintln!("{error}: {reason}"));
/// # let _ = hook;
/// ```
pub type FailureHook = Arc<dyn Fn(&Error, &str) + Send + Sync>;

/// Completion callback for [`send_request_async`](super::Connection::send_request_async).
///
/// Invoked exactly once with the outcome and the original request.
pub type ResponseCallback = Box<dyn FnOnce(Result<Response, Error>, Request) + Send + 'static>;

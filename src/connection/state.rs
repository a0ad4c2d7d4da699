//! Connection lifecycle state.

use std::sync::atomic::{AtomicU8, AtomicU16, Ordering};

use crate::error::{Error, ErrorCode};

/// Lifecycle of a [`Connection`](super::Connection).
///
/// `Disconnected → Connecting → Connected → Closing → Closed`. Requests are
/// accepted only while `Connected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No stream yet.
    Disconnected = 0,
    /// Connect attempts or the preamble are in progress.
    Connecting = 1,
    /// Both I/O tasks are running and requests are accepted.
    Connected = 2,
    /// A close has begun and pending requests are being resolved.
    Closing = 3,
    /// Terminal; the stream is released.
    Closed = 4,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Error a submission fails fast with in this state, if any.
    pub(super) const fn rejection(self) -> Option<Error> {
        match self {
            Self::Connected => None,
            Self::Disconnected | Self::Connecting => Some(Error::CouldNotConnect),
            Self::Closing | Self::Closed => Some(Error::ConnectionClosed),
        }
    }
}

/// Atomic state shared between caller threads and the I/O tasks.
#[derive(Debug)]
pub(super) struct StateCell {
    state: AtomicU8,
    last_error: AtomicU16,
}

impl StateCell {
    pub(super) const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            last_error: AtomicU16::new(ErrorCode::NoError as u16),
        }
    }

    pub(super) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(super) fn set(&self, state: ConnectionState) { self.state.store(state as u8, Ordering::SeqCst); }

    /// Move from `Connected` to `Closing`, recording `cause`.
    ///
    /// Returns `true` only for the single caller that performed the
    /// transition; everyone else must leave teardown alone.
    pub(super) fn begin_close(&self, cause: Error) -> bool {
        let won = self
            .state
            .compare_exchange(
                ConnectionState::Connected as u8,
                ConnectionState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if won {
            self.last_error
                .store(cause.code().as_u16(), Ordering::SeqCst);
        }
        won
    }

    pub(super) fn last_error(&self) -> ErrorCode {
        ErrorCode::from_u16(self.last_error.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

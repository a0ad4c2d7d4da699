use derive_more::{Display, From, Into};

/// Connection-scoped identifier shared by every chunk of one logical message.
///
/// Requests and their responses carry the same identifier, which is how the
/// connection correlates an inbound message with the caller waiting on it.
///
/// # Examples
///
/// ```
/// use vstream::chunk::MessageId;
/// let id = MessageId::new(42);
/// assert_eq!(id.get(), 42);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct MessageId(u64);

impl MessageId {
    /// Create a new identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self { Self(value) }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

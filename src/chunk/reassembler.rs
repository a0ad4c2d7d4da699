//! Inbound helper that stitches chunks back into complete messages.
//!
//! [`Reassembler`] mirrors the outbound [`Chunker`](crate::chunk::Chunker). A
//! first chunk opens a buffer sized to the declared message length; later
//! chunks are copied in at the offset their index implies. Continuations that
//! overtake a predecessor are held until the gap closes, so delivery order
//! does not matter as long as every chunk eventually arrives. Buffers that
//! stall past the reassembly timeout are purged.

use std::{
    collections::{BTreeMap, HashMap, hash_map::Entry},
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use bytes::Bytes;
use log::debug;

use super::{Chunk, ChunkConfig, ChunkIndex, ChunkKind, MessageId, ReassemblyError};

#[derive(Debug)]
struct PartialMessage {
    expected_length: u64,
    expected_chunks: u32,
    buffer: Vec<u8>,
    next_index: u32,
    next_offset: usize,
    received_length: u64,
    held: BTreeMap<u32, Bytes>,
    started_at: Instant,
}

impl PartialMessage {
    fn new(expected_length: usize, expected_chunks: u32, started_at: Instant) -> Self {
        Self {
            expected_length: expected_length as u64,
            expected_chunks,
            buffer: vec![0; expected_length],
            next_index: 0,
            next_offset: 0,
            received_length: 0,
            held: BTreeMap::new(),
            started_at,
        }
    }

    fn is_seen(&self, index: u32) -> bool { index < self.next_index || self.held.contains_key(&index) }

    fn is_complete(&self) -> bool { self.next_index == self.expected_chunks }

    /// Copy an in-order payload at the running offset, then drain any held
    /// successors that became contiguous.
    fn write_in_order(&mut self, payload: &[u8]) -> bool {
        if !self.copy_at_offset(payload) {
            return false;
        }
        while let Some(entry) = self.held.first_entry() {
            if *entry.key() != self.next_index {
                break;
            }
            let next = entry.remove();
            if !self.copy_at_offset(&next) {
                return false;
            }
        }
        true
    }

    fn copy_at_offset(&mut self, payload: &[u8]) -> bool {
        let Some(end) = self.next_offset.checked_add(payload.len()) else {
            return false;
        };
        let Some(slot) = self.buffer.get_mut(self.next_offset..end) else {
            return false;
        };
        slot.copy_from_slice(payload);
        self.next_offset = end;
        self.next_index += 1;
        true
    }
}

/// Container for a fully reassembled message payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReassembledMessage {
    message_id: MessageId,
    payload: Bytes,
}

impl ReassembledMessage {
    /// Construct a new [`ReassembledMessage`].
    #[must_use]
    pub fn new(message_id: MessageId, payload: impl Into<Bytes>) -> Self {
        Self {
            message_id,
            payload: payload.into(),
        }
    }

    /// Identifier shared by the chunks that formed this message.
    #[must_use]
    pub const fn message_id(&self) -> MessageId { self.message_id }

    /// Borrow the reassembled payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Consume the message, returning the payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}

/// Stateful chunk reassembler with timeout-based eviction.
#[derive(Debug)]
pub struct Reassembler {
    max_message_size: NonZeroUsize,
    timeout: Duration,
    buffers: HashMap<MessageId, PartialMessage>,
    orphan_chunks: u64,
}

impl Reassembler {
    /// Create a reassembler bounded by `config`.
    #[must_use]
    pub fn new(config: &ChunkConfig) -> Self {
        Self {
            max_message_size: config.max_message_size(),
            timeout: config.reassembly_timeout(),
            buffers: HashMap::new(),
            orphan_chunks: 0,
        }
    }

    /// Process a chunk using the current time.
    ///
    /// Returns `Ok(Some(_))` when the chunk completes its message and
    /// `Ok(None)` while more chunks are needed.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError`] when the chunk cannot be accepted. Use
    /// [`ReassemblyError::is_fatal`] to decide whether the stream survives.
    pub fn push(&mut self, chunk: Chunk) -> Result<Option<ReassembledMessage>, ReassemblyError> {
        self.push_at(chunk, Instant::now())
    }

    /// Process a chunk using an explicit clock reading.
    ///
    /// # Errors
    ///
    /// See [`push`](Self::push).
    pub fn push_at(
        &mut self,
        chunk: Chunk,
        now: Instant,
    ) -> Result<Option<ReassembledMessage>, ReassemblyError> {
        let header = *chunk.header();
        let message_id = header.message_id();
        let payload = chunk.payload();

        match header.kind() {
            ChunkKind::First {
                chunk_count,
                message_length,
            } => self.open(message_id, chunk_count, message_length, &payload, now),
            ChunkKind::Continuation { index } => self.extend(message_id, index, payload),
        }
    }

    fn open(
        &mut self,
        message_id: MessageId,
        chunk_count: u32,
        message_length: u64,
        payload: &[u8],
        now: Instant,
    ) -> Result<Option<ReassembledMessage>, ReassemblyError> {
        let limit = self.max_message_size.get();
        let expected = usize::try_from(message_length)
            .ok()
            .filter(|len| *len <= limit)
            .ok_or(ReassemblyError::MessageTooLarge {
                message_id,
                declared: message_length,
                limit,
            })?;

        let mut partial = PartialMessage::new(expected, chunk_count, now);
        partial.received_length = payload.len() as u64;
        if !partial.write_in_order(payload) {
            return Err(ReassemblyError::LengthOverflow {
                message_id,
                expected: message_length,
                attempted: payload.len() as u64,
            });
        }

        match self.buffers.entry(message_id) {
            Entry::Occupied(mut stale) => {
                debug!("resetting stale reassembly buffer: message_id={message_id}");
                stale.insert(partial);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(partial);
            }
        }
        self.complete_if_ready(message_id)
    }

    fn extend(
        &mut self,
        message_id: MessageId,
        index: ChunkIndex,
        payload: Bytes,
    ) -> Result<Option<ReassembledMessage>, ReassemblyError> {
        let Some(partial) = self.buffers.get_mut(&message_id) else {
            self.orphan_chunks += 1;
            return Err(ReassemblyError::UnknownMessage { message_id, index });
        };

        let raw = index.get();
        if raw >= partial.expected_chunks {
            let expected = partial.expected_chunks;
            self.buffers.remove(&message_id);
            return Err(ReassemblyError::IndexOutOfRange {
                message_id,
                index,
                expected,
            });
        }
        if partial.is_seen(raw) {
            return Err(ReassemblyError::DuplicateChunk { message_id, index });
        }

        let attempted = partial.received_length + payload.len() as u64;
        if attempted > partial.expected_length {
            let expected = partial.expected_length;
            self.buffers.remove(&message_id);
            return Err(ReassemblyError::LengthOverflow {
                message_id,
                expected,
                attempted,
            });
        }
        partial.received_length = attempted;

        if raw == partial.next_index {
            if !partial.write_in_order(&payload) {
                let expected = partial.expected_length;
                self.buffers.remove(&message_id);
                return Err(ReassemblyError::LengthOverflow {
                    message_id,
                    expected,
                    attempted,
                });
            }
        } else {
            partial.held.insert(raw, payload);
        }
        self.complete_if_ready(message_id)
    }

    fn complete_if_ready(
        &mut self,
        message_id: MessageId,
    ) -> Result<Option<ReassembledMessage>, ReassemblyError> {
        let Entry::Occupied(entry) = self.buffers.entry(message_id) else {
            return Ok(None);
        };
        if !entry.get().is_complete() {
            return Ok(None);
        }
        let partial = entry.remove();
        if partial.received_length != partial.expected_length {
            return Err(ReassemblyError::LengthMismatch {
                message_id,
                expected: partial.expected_length,
                received: partial.received_length,
            });
        }
        Ok(Some(ReassembledMessage::new(message_id, partial.buffer)))
    }

    /// Remove partial messages older than the reassembly timeout.
    ///
    /// Returns the identifiers of messages that were evicted.
    pub fn purge_expired(&mut self) -> Vec<MessageId> { self.purge_expired_at(Instant::now()) }

    /// Remove partial messages older than the reassembly timeout using an
    /// explicit clock reading.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<MessageId> {
        let mut evicted = Vec::new();
        let timeout = self.timeout;

        self.buffers.retain(|message_id, partial| {
            let expired = now.saturating_duration_since(partial.started_at) >= timeout;
            if expired {
                evicted.push(*message_id);
            }
            !expired
        });

        evicted
    }

    /// Discard every partial message without delivering it.
    pub fn clear(&mut self) { self.buffers.clear(); }

    /// Number of partial messages currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.buffers.len() }

    /// Continuation chunks dropped because no first chunk opened a buffer.
    #[must_use]
    pub const fn orphan_chunks(&self) -> u64 { self.orphan_chunks }
}

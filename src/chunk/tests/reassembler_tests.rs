//! Tests for inbound reassembly ordering, orphan handling and eviction.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use bytes::Bytes;

use super::{chunker_with_size, payload};
use crate::chunk::{
    Chunk,
    ChunkHeader,
    ChunkIndex,
    ChunkKind,
    HeaderCodec,
    MessageId,
    ProtocolVersion,
    Reassembler,
    ReassemblyError,
};

fn continuation(message_id: u64, index: u32, body: &[u8]) -> Chunk {
    let header = ChunkHeader::continuation(MessageId::new(message_id), ChunkIndex::new(index), body.len());
    let mut bytes = HeaderCodec::new(ProtocolVersion::V1_1, 4096)
        .encode_continuation(header.message_id(), header.index(), body.len())
        .expect("continuation encodes")
        .to_vec();
    bytes.extend_from_slice(body);
    Chunk::new(header, Bytes::from(bytes))
}

#[test]
fn reassembles_in_order_chunks() {
    let (chunker, config) = chunker_with_size(64);
    let body = payload(500);
    let mut reassembler = Reassembler::new(&config);

    let mut chunks = chunker
        .chunk(MessageId::new(1), &body)
        .expect("chunks")
        .into_chunks();
    let last = chunks.pop().expect("at least one chunk");
    for chunk in chunks {
        assert!(reassembler.push(chunk).expect("chunk accepted").is_none());
    }
    let message = reassembler
        .push(last)
        .expect("last chunk accepted")
        .expect("message completes");

    assert_eq!(message.message_id(), MessageId::new(1));
    assert_eq!(message.payload(), body.as_slice());
    assert_eq!(reassembler.buffered_len(), 0);
}

#[test]
fn tolerates_out_of_order_continuations() {
    let (chunker, config) = chunker_with_size(64);
    let body = payload(300);
    let mut reassembler = Reassembler::new(&config);

    let mut chunks = chunker
        .chunk(MessageId::new(2), &body)
        .expect("chunks")
        .into_chunks();
    let first = chunks.remove(0);
    assert!(reassembler.push(first).expect("first accepted").is_none());

    chunks.reverse();
    let mut completed = None;
    for chunk in chunks {
        if let Some(message) = reassembler.push(chunk).expect("chunk accepted") {
            completed = Some(message);
        }
    }
    let message = completed.expect("message completes once every chunk arrived");
    assert_eq!(message.payload(), body.as_slice());
}

#[test]
fn single_chunk_message_completes_immediately() {
    let (chunker, config) = chunker_with_size(64);
    let mut reassembler = Reassembler::new(&config);
    let chunk = chunker
        .chunk(MessageId::new(3), [9_u8, 8, 7])
        .expect("chunks")
        .into_chunks()
        .remove(0);

    let message = reassembler
        .push(chunk)
        .expect("accepted")
        .expect("complete");
    assert_eq!(message.payload(), &[9, 8, 7]);
}

#[test]
fn orphan_chunk_is_dropped_without_disturbing_other_messages() {
    let (chunker, config) = chunker_with_size(64);
    let body = payload(80);
    let mut reassembler = Reassembler::new(&config);
    let mut chunks = chunker
        .chunk(MessageId::new(4), &body)
        .expect("chunks")
        .into_chunks();
    let last = chunks.pop().expect("two chunks");
    assert!(reassembler.push(chunks.remove(0)).expect("first").is_none());

    let err = reassembler
        .push(continuation(99, 1, b"stray"))
        .expect_err("orphan chunk rejected");
    assert_eq!(
        err,
        ReassemblyError::UnknownMessage {
            message_id: MessageId::new(99),
            index: ChunkIndex::new(1),
        }
    );
    assert!(!err.is_fatal());
    assert_eq!(reassembler.orphan_chunks(), 1);

    let message = reassembler
        .push(last)
        .expect("last accepted")
        .expect("message completes");
    assert_eq!(message.payload(), body.as_slice());
}

#[test]
fn late_chunk_after_completion_is_an_orphan() {
    let (chunker, config) = chunker_with_size(64);
    let mut reassembler = Reassembler::new(&config);
    let chunks = chunker
        .chunk(MessageId::new(5), payload(100))
        .expect("chunks")
        .into_chunks();
    let duplicate = chunks[1].clone();
    let mut completions = 0;
    for chunk in chunks {
        if reassembler.push(chunk).expect("accepted").is_some() {
            completions += 1;
        }
    }

    let err = reassembler.push(duplicate).expect_err("late chunk dropped");
    assert!(matches!(err, ReassemblyError::UnknownMessage { .. }));
    assert_eq!(completions, 1);
}

#[test]
fn duplicate_chunk_is_rejected_but_message_survives() {
    let (chunker, config) = chunker_with_size(64);
    let body = payload(200);
    let mut reassembler = Reassembler::new(&config);
    let mut chunks = chunker
        .chunk(MessageId::new(6), &body)
        .expect("chunks")
        .into_chunks();
    let tail = chunks.split_off(2);
    for chunk in &chunks {
        assert!(reassembler.push(chunk.clone()).expect("accepted").is_none());
    }

    let err = reassembler
        .push(chunks[1].clone())
        .expect_err("duplicate rejected");
    assert_eq!(
        err,
        ReassemblyError::DuplicateChunk {
            message_id: MessageId::new(6),
            index: ChunkIndex::new(1),
        }
    );
    assert_eq!(err.aborted_message(), None);

    let mut completed = None;
    for chunk in tail {
        completed = reassembler.push(chunk).expect("accepted");
    }
    assert_eq!(completed.expect("complete").payload(), body.as_slice());
}

#[test]
fn index_beyond_announced_count_aborts_message() {
    let (chunker, config) = chunker_with_size(64);
    let mut reassembler = Reassembler::new(&config);
    let first = chunker
        .chunk(MessageId::new(7), payload(80))
        .expect("chunks")
        .into_chunks()
        .remove(0);
    assert!(reassembler.push(first).expect("first").is_none());

    let err = reassembler
        .push(continuation(7, 5, b"x"))
        .expect_err("index out of range");
    assert_eq!(err.aborted_message(), Some(MessageId::new(7)));
    assert_eq!(reassembler.buffered_len(), 0);
}

#[test]
fn continuation_growing_past_declared_length_aborts_message() {
    let (chunker, config) = chunker_with_size(64);
    let mut reassembler = Reassembler::new(&config);
    let first = chunker
        .chunk(MessageId::new(8), payload(50))
        .expect("chunks")
        .into_chunks()
        .remove(0);
    assert!(reassembler.push(first).expect("first").is_none());

    let err = reassembler
        .push(continuation(8, 1, &payload(20)))
        .expect_err("overflow rejected");
    assert_eq!(
        err,
        ReassemblyError::LengthOverflow {
            message_id: MessageId::new(8),
            expected: 50,
            attempted: 60,
        }
    );
}

#[test]
fn oversized_declaration_is_fatal() {
    let config = crate::chunk::ChunkConfig::default()
        .with_max_message_size(NonZeroUsize::new(16).expect("non-zero"));
    let mut reassembler = Reassembler::new(&config);
    let header = ChunkHeader::first(MessageId::new(9), 2, 1_000, 4);
    let chunk = Chunk::new(header, Bytes::from(vec![0_u8; 28]));

    let err = reassembler.push(chunk).expect_err("too large");
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        ReassemblyError::MessageTooLarge { declared: 1_000, .. }
    ));
}

#[test]
fn repeated_first_chunk_resets_buffer() {
    let (chunker, config) = chunker_with_size(64);
    let body = payload(80);
    let mut reassembler = Reassembler::new(&config);
    let chunks = chunker
        .chunk(MessageId::new(10), &body)
        .expect("chunks")
        .into_chunks();

    assert!(reassembler.push(chunks[0].clone()).expect("first").is_none());
    assert!(reassembler.push(chunks[0].clone()).expect("reset").is_none());
    assert_eq!(reassembler.buffered_len(), 1);
    let message = reassembler
        .push(chunks[1].clone())
        .expect("second")
        .expect("complete");
    assert_eq!(message.payload(), body.as_slice());
}

#[test]
fn purges_stalled_buffers_after_timeout() {
    let (chunker, config) = chunker_with_size(64);
    let config = config.with_reassembly_timeout(Duration::from_secs(5));
    let mut reassembler = Reassembler::new(&config);
    let start = Instant::now();
    let first = chunker
        .chunk(MessageId::new(11), payload(100))
        .expect("chunks")
        .into_chunks()
        .remove(0);
    assert!(matches!(first.header().kind(), ChunkKind::First { .. }));
    assert!(reassembler.push_at(first, start).expect("first").is_none());

    assert!(reassembler.purge_expired_at(start + Duration::from_secs(4)).is_empty());
    assert_eq!(
        reassembler.purge_expired_at(start + Duration::from_secs(5)),
        vec![MessageId::new(11)]
    );
    assert_eq!(reassembler.buffered_len(), 0);
}

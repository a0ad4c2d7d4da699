//! Generated round trips through chunker, stream codec and reassembler.

use bytes::BytesMut;
use proptest::{collection::vec, prelude::*};
use tokio_util::codec::{Decoder, Encoder};

use crate::chunk::{
    ChunkCodec,
    ChunkConfig,
    Chunker,
    HeaderCodec,
    MessageId,
    ProtocolVersion,
    Reassembler,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunk_then_reassemble_is_identity(
        body in vec(any::<u8>(), 0..4096),
        chunk_size in 25_usize..512,
        reverse_tail in any::<bool>(),
    ) {
        let config = ChunkConfig::default().with_chunk_size(chunk_size);
        let header = HeaderCodec::new(ProtocolVersion::V1_0, config.max_inbound_chunk().get());
        let chunker = Chunker::new(header, &config);
        let mut codec = ChunkCodec::new(header);
        let mut reassembler = Reassembler::new(&config);

        let mut chunks = chunker
            .chunk(MessageId::new(42), &body)
            .map_err(|err| TestCaseError::fail(format!("chunking failed: {err}")))?
            .into_chunks();
        prop_assert_eq!(chunks.len(), body.len().div_ceil(chunk_size - 24).max(1));
        if reverse_tail && chunks.len() > 2 {
            chunks[1..].reverse();
        }

        let mut wire = BytesMut::new();
        for chunk in chunks {
            codec
                .encode(chunk, &mut wire)
                .map_err(|err| TestCaseError::fail(format!("encode failed: {err}")))?;
        }

        let mut assembled = None;
        while let Some(chunk) = codec
            .decode(&mut wire)
            .map_err(|err| TestCaseError::fail(format!("decode failed: {err}")))?
        {
            if let Some(message) = reassembler
                .push(chunk)
                .map_err(|err| TestCaseError::fail(format!("reassembly failed: {err}")))?
            {
                prop_assert!(assembled.is_none(), "message completed twice");
                assembled = Some(message);
            }
        }

        let message = assembled
            .ok_or_else(|| TestCaseError::fail("message never completed".to_owned()))?;
        prop_assert_eq!(message.payload(), body.as_slice());
        prop_assert!(wire.is_empty());
        prop_assert_eq!(reassembler.buffered_len(), 0);
    }
}

//! End-to-end request/response round trips against a simulated peer.

use std::collections::BTreeSet;

use rstest::rstest;
use vstream::{
    ChunkConfig,
    Connection,
    ConnectionState,
    ProtocolVersion,
    Response,
    RestVerb,
    chunk::ChunkKind,
    create_request,
};
use vstream_testing::SimulatedPeer;

fn body(len: usize) -> Vec<u8> { (0..len).map(|i| (i % 251) as u8).collect() }

#[tokio::test]
async fn fifty_kilobyte_body_is_chunked_and_echoed_back() {
    let (stream, peer) = SimulatedPeer::echo().with_chunk_size(1000).spawn();
    let connection = Connection::builder()
        .chunk_config(ChunkConfig::default().with_chunk_size(1000))
        .connect_stream(stream)
        .await
        .expect("connect");

    let sent = body(50_000);
    let request = create_request(RestVerb::Put, "/_api/document").with_body(sent.clone());
    let encoded_len = request.encode().expect("encode").len();
    let response = connection.send_request(request).await.expect("response");

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.body().as_ref(), sent.as_slice());

    let observed = peer.observed();
    assert_eq!(observed.len(), 1);
    let seen = &observed[0];
    assert_eq!(seen.message_length, encoded_len);
    assert_eq!(seen.request.body().len(), 50_000);

    // 976 payload bytes per chunk; the envelope header pushes the message
    // just past 51 full pieces.
    assert_eq!(seen.chunks.len(), 52);
    let ChunkKind::First {
        chunk_count,
        message_length,
    } = seen.chunks[0].kind()
    else {
        panic!("first chunk on the wire must carry the message length");
    };
    assert_eq!(chunk_count, 52);
    assert_eq!(message_length, encoded_len as u64);

    let indices: BTreeSet<u32> = seen.chunks.iter().map(|h| h.index().get()).collect();
    assert_eq!(indices, (0..52).collect());
    assert!(seen.chunks.iter().all(|h| h.chunk_length() <= 1000));
}

#[tokio::test]
async fn empty_request_fits_one_chunk() {
    let (stream, peer) = SimulatedPeer::new(|_| Some(Response::new(204))).spawn();
    let connection = Connection::builder()
        .connect_stream(stream)
        .await
        .expect("connect");

    let response = connection
        .send_request(create_request(RestVerb::Delete, "/_api/collection/tmp"))
        .await
        .expect("response");
    assert_eq!(response.status_code(), 204);
    assert!(response.body().is_empty());

    let observed = peer.observed();
    assert_eq!(observed[0].chunks.len(), 1);
    assert_eq!(observed[0].request.verb(), RestVerb::Delete);
}

#[rstest]
#[case(ProtocolVersion::V1_0)]
#[case(ProtocolVersion::V1_1)]
#[tokio::test]
async fn request_fields_reach_the_peer(#[case] version: ProtocolVersion) {
    let (stream, peer) = SimulatedPeer::new(|request| {
        let echoed = request.parameters().get("q").cloned().unwrap_or_default();
        Some(
            Response::new(200)
                .with_meta("x-database", request.database())
                .with_body(echoed),
        )
    })
    .spawn();
    let connection = Connection::builder()
        .version(version)
        .connect_stream(stream)
        .await
        .expect("connect");

    let response = connection
        .send_request(
            create_request(RestVerb::Get, "/_api/simple")
                .with_database("inventory")
                .with_parameter("q", "widgets")
                .with_meta("accept", "application/x-velocypack"),
        )
        .await
        .expect("response");

    assert_eq!(response.meta()["x-database"], "inventory");
    assert_eq!(response.body().as_ref(), b"widgets");
    let seen = &peer.observed()[0];
    assert_eq!(seen.request.meta()["accept"], "application/x-velocypack");
    assert_eq!(seen.request.path(), "/_api/simple");
}

#[tokio::test]
async fn multi_chunk_response_is_reassembled() {
    let large = body(20_000);
    let reply = large.clone();
    let (stream, _peer) = SimulatedPeer::new(move |_| Some(Response::new(200).with_body(reply.clone())))
        .with_chunk_size(300)
        .spawn();
    let connection = Connection::builder()
        .connect_stream(stream)
        .await
        .expect("connect");

    let response = connection
        .send_request(create_request(RestVerb::Get, "/_api/export"))
        .await
        .expect("response");
    assert_eq!(response.body().as_ref(), large.as_slice());
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn tcp_round_trip() {
    let (addr, peer) = SimulatedPeer::echo().spawn_tcp().await.expect("bind");
    let connection = Connection::builder()
        .connect(addr)
        .await
        .expect("connect");

    let response = connection
        .send_request(create_request(RestVerb::Post, "/echo").with_body("ping"))
        .await
        .expect("response");
    assert_eq!(response.body().as_ref(), b"ping");

    connection.close();
    peer.join().await.expect("peer finished cleanly");
}

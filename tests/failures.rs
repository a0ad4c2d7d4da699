//! Failure paths: unreachable endpoints, lost peers, timeouts and stray ids.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use vstream::{Connection, ConnectionState, Error, ErrorCode, RestVerb, create_request};
use vstream_testing::SimulatedPeer;

#[tokio::test]
async fn unreachable_endpoint_reports_could_not_connect() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let failures = Arc::new(Mutex::new(Vec::new()));
    let result = Connection::builder()
        .connect_retries(2, Duration::from_millis(5))
        .connect_timeout(Duration::from_millis(200))
        .on_failure({
            let failures = Arc::clone(&failures);
            move |error, reason| {
                failures
                    .lock()
                    .expect("lock")
                    .push((*error, reason.to_owned()));
            }
        })
        .connect(addr)
        .await;

    assert_eq!(result.err(), Some(Error::CouldNotConnect));
    let failures = failures.lock().expect("lock");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, Error::CouldNotConnect);
    assert!(failures[0].1.contains("3 attempts"), "{}", failures[0].1);
}

#[tokio::test]
async fn lost_peer_fails_pending_requests() {
    let (stream, peer) = SimulatedPeer::silent().spawn();
    let connection = Connection::builder()
        .connect_stream(stream)
        .await
        .expect("connect");

    let pending = tokio::spawn({
        let connection = connection.clone();
        async move {
            connection
                .send_request(create_request(RestVerb::Get, "/hang"))
                .await
        }
    });
    while peer.observed().is_empty() {
        tokio::task::yield_now().await;
    }
    peer.abort();

    assert_eq!(pending.await.expect("join"), Err(Error::ConnectionClosed));
    connection.closed().await;
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(connection.last_error(), ErrorCode::ConnectionClosed);

    let late = connection
        .send_request(create_request(RestVerb::Get, "/after"))
        .await;
    assert_eq!(late, Err(Error::ConnectionClosed));
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_requests_out() {
    let (stream, _peer) = SimulatedPeer::silent().spawn();
    let connection = Connection::builder()
        .request_timeout(Some(Duration::from_secs(3)))
        .connect_stream(stream)
        .await
        .expect("connect");

    let result = connection
        .send_request(create_request(RestVerb::Get, "/slow"))
        .await;
    assert_eq!(result, Err(Error::Timeout));
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.last_error(), ErrorCode::NoError);
}

#[tokio::test(start_paused = true)]
async fn mismatched_response_ids_are_dropped() {
    let (stream, peer) = SimulatedPeer::echo().with_mismatched_ids().spawn();
    let connection = Connection::builder()
        .request_timeout(Some(Duration::from_secs(1)))
        .connect_stream(stream)
        .await
        .expect("connect");

    let result = connection
        .send_request(create_request(RestVerb::Get, "/mismatch"))
        .await;
    assert_eq!(result, Err(Error::Timeout));
    assert_eq!(peer.observed().len(), 1);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

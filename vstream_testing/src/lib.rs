//! Test support for `vstream`.
//!
//! Provides a simulated server peer that speaks the chunked protocol over an
//! in-memory duplex stream or a localhost TCP socket, plus log capture
//! fixtures.
//!
//! ```rust
//! use vstream::{Connection, RestVerb, create_request};
//! use vstream_testing::SimulatedPeer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (stream, _peer) = SimulatedPeer::echo().spawn();
//! let connection = Connection::builder()
//!     .connect_stream(stream)
//!     .await
//!     .expect("connect");
//! let response = connection
//!     .send_request(create_request(RestVerb::Post, "/echo").with_body("hi"))
//!     .await
//!     .expect("response");
//! assert_eq!(response.body().as_ref(), b"hi");
//! # }
//! ```

pub mod logging;
pub mod peer;

pub use logging::{LoggerHandle, logger};
pub use peer::{Handler, ObservedRequest, PeerHandle, SimulatedPeer};

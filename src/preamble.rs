//! Connection preamble naming the protocol version.
//!
//! Before any chunk is exchanged the client writes an ASCII line such as
//! `VST/1.1\r\n\r\n`. The server uses it to pick the chunk header layout for
//! the rest of the stream.

use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::chunk::ProtocolVersion;

/// Length of every preamble in bytes.
pub const PREAMBLE_LEN: usize = 11;

const PREAMBLE_V1_0: &[u8; PREAMBLE_LEN] = b"VST/1.0\r\n\r\n";
const PREAMBLE_V1_1: &[u8; PREAMBLE_LEN] = b"VST/1.1\r\n\r\n";

/// Errors raised while exchanging the preamble.
#[derive(Debug, Error)]
pub enum PreambleError {
    /// I/O error writing the preamble.
    #[error("failed to write preamble: {0}")]
    Write(#[source] io::Error),
    /// I/O error reading the preamble.
    #[error("failed to read preamble: {0}")]
    Read(#[source] io::Error),
    /// The bytes received name no known version.
    #[error("unrecognised preamble {0:?}")]
    Unrecognised(Vec<u8>),
}

/// Preamble bytes announcing `version`.
#[must_use]
pub const fn preamble_bytes(version: ProtocolVersion) -> &'static [u8; PREAMBLE_LEN] {
    match version {
        ProtocolVersion::V1_0 => PREAMBLE_V1_0,
        ProtocolVersion::V1_1 => PREAMBLE_V1_1,
    }
}

/// Write the preamble for `version` and flush it.
///
/// # Errors
///
/// Returns [`PreambleError::Write`] if the transport rejects the bytes.
pub async fn write_preamble<W>(writer: &mut W, version: ProtocolVersion) -> Result<(), PreambleError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(preamble_bytes(version))
        .await
        .map_err(PreambleError::Write)?;
    writer.flush().await.map_err(PreambleError::Write)
}

/// Read a preamble from `reader` and return the version it names.
///
/// Used by servers and test peers accepting client connections.
///
/// # Errors
///
/// Returns [`PreambleError::Read`] on I/O failure, including a stream that
/// ends early, and [`PreambleError::Unrecognised`] for unknown bytes.
pub async fn read_preamble<R>(reader: &mut R) -> Result<ProtocolVersion, PreambleError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0_u8; PREAMBLE_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(PreambleError::Read)?;
    match &buf {
        PREAMBLE_V1_0 => Ok(ProtocolVersion::V1_0),
        PREAMBLE_V1_1 => Ok(ProtocolVersion::V1_1),
        other => Err(PreambleError::Unrecognised(other.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tokio::io::{AsyncWriteExt, duplex};

    use super::{PreambleError, preamble_bytes, read_preamble, write_preamble};
    use crate::chunk::ProtocolVersion;

    #[rstest]
    #[case(ProtocolVersion::V1_0)]
    #[case(ProtocolVersion::V1_1)]
    #[tokio::test]
    async fn preamble_names_its_version(#[case] version: ProtocolVersion) {
        let (mut client, mut server) = duplex(64);
        write_preamble(&mut client, version).await.expect("write");
        assert_eq!(read_preamble(&mut server).await.expect("read"), version);
        assert!(preamble_bytes(version).starts_with(version.to_string().as_bytes()));
    }

    #[tokio::test]
    async fn unknown_preamble_is_rejected() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"HTTP/1.1\r\n\r\n").await.expect("write");
        assert!(matches!(
            read_preamble(&mut server).await,
            Err(PreambleError::Unrecognised(_))
        ));
    }

    #[tokio::test]
    async fn short_preamble_is_a_read_error() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"VST/").await.expect("write");
        drop(client);
        assert!(matches!(
            read_preamble(&mut server).await,
            Err(PreambleError::Read(_))
        ));
    }
}

use std::io;
use std::time::Duration;

use crate::config::Target;
use crate::protocol::{self, record::DecodeError};


/// Errors returned by a FastCGI [`Client`](crate::Client) and its
/// [`Driver`](crate::Driver).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport to the FastCGI responder could not be established.
    #[error("failed to connect to FastCGI responder at {target}")]
    Connect {
        /// The target that was dialed.
        target: Target,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The connection broke, or was closed, before the request completed.
    #[error("FastCGI connection is broken")]
    ConnectionBroken,
    /// The request did not complete within the configured timeout and was
    /// deregistered from its connection.
    #[error("FastCGI request {request_id} abandoned after {timeout:?}")]
    Abandoned {
        /// The ID the request was issued with.
        request_id: u16,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// A record was malformed, or outbound content could not be framed.
    #[error(transparent)]
    Protocol(#[from] protocol::Error),
    /// Writing to the connection or to a caller-provided sink failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Io(e) => Self::Io(e),
            DecodeError::Protocol(e) => Self::Protocol(e),
        }
    }
}

impl Error {
    /// Tests whether this error means the connection can no longer be used.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::ConnectionBroken)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let connect = Error::Connect { target: Target::tcp("localhost", 9000), source: refused };
        assert!(connect.is_connection_error());
        assert!(Error::ConnectionBroken.is_connection_error());

        let abandoned = Error::Abandoned { request_id: 3, timeout: Duration::from_secs(1) };
        assert!(!abandoned.is_connection_error());
        assert!(!Error::from(protocol::Error::OversizedContent(70_000)).is_connection_error());
        assert!(!Error::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_connection_error());
    }

    #[test]
    fn decode_errors() {
        let eof = DecodeError::Io(io::ErrorKind::UnexpectedEof.into());
        assert!(matches!(Error::from(eof), Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
        let version = DecodeError::Protocol(protocol::Error::UnknownVersion(2));
        assert!(matches!(Error::from(version), Error::Protocol(protocol::Error::UnknownVersion(2))));
    }
}

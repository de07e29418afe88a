use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;


/// Tunables for a FastCGI [`Client`](crate::Client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The number of request registrations that may be queued for the reader
    /// loop before issuing new requests waits.
    pub register_capacity: NonZeroUsize,
    /// The number of response chunks buffered per request before the reader
    /// loop waits for the request's caller to consume them.
    pub response_capacity: NonZeroUsize,
    /// The maximum time a request may take. `None` waits indefinitely.
    ///
    /// Only enforced with the `rt` feature.
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Sets [`Config::register_capacity`].
    #[inline]
    #[must_use]
    pub fn with_register_capacity(self, register_capacity: NonZeroUsize) -> Self {
        Self { register_capacity, ..self }
    }

    /// Sets [`Config::response_capacity`].
    #[inline]
    #[must_use]
    pub fn with_response_capacity(self, response_capacity: NonZeroUsize) -> Self {
        Self { response_capacity, ..self }
    }

    /// Sets [`Config::request_timeout`].
    #[inline]
    #[must_use]
    pub fn with_request_timeout(self, request_timeout: Option<Duration>) -> Self {
        Self { request_timeout, ..self }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            register_capacity: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
            response_capacity: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            request_timeout: None,
        }
    }
}


/// The address of a FastCGI responder.
///
/// Parses from `host:port`, `[v6-addr]:port` or `unix:/path/to/socket`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A TCP endpoint.
    Tcp {
        /// A host name or IP address.
        host: String,
        /// The TCP port.
        port: u16,
    },
    /// A Unix domain socket.
    Unix {
        /// The filesystem path of the socket.
        path: PathBuf,
    },
}

impl Target {
    const UNIX_PREFIX: &'static str = "unix:";

    /// Creates a TCP [`Target`].
    #[inline]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp { host: host.into(), port }
    }

    /// Creates a Unix socket [`Target`].
    #[inline]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix { path } => write!(f, "{}{}", Self::UNIX_PREFIX, path.display()),
        }
    }
}


/// Errors from parsing a [`Target`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseTargetError {
    /// The socket path after `unix:` is empty.
    #[error("empty Unix socket path")]
    EmptyPath,
    /// The TCP address has no `:port` suffix.
    #[error("missing port in FastCGI target {0:?}")]
    MissingPort(String),
    /// The port is not a valid TCP port.
    #[error("invalid port in FastCGI target {0:?}")]
    InvalidPort(String),
    /// The host part is empty or has unbalanced brackets.
    #[error("invalid host in FastCGI target {0:?}")]
    InvalidHost(String),
}

impl FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(Self::UNIX_PREFIX) {
            return if path.is_empty() { Err(ParseTargetError::EmptyPath) } else { Ok(Self::unix(path)) };
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(|| ParseTargetError::MissingPort(s.into()))?;
        let port = port.parse().map_err(|_| ParseTargetError::InvalidPort(s.into()))?;
        let host = match host.strip_prefix('[') {
            Some(h) => h.strip_suffix(']').ok_or_else(|| ParseTargetError::InvalidHost(s.into()))?,
            None if host.contains(':') => return Err(ParseTargetError::InvalidHost(s.into())),
            None => host,
        };
        if host.is_empty() {
            return Err(ParseTargetError::InvalidHost(s.into()));
        }
        Ok(Self::tcp(host, port))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.register_capacity.get(), 1024);
        assert_eq!(config.response_capacity.get(), 16);
        assert_eq!(config.request_timeout, None);

        let config = config.with_request_timeout(Some(Duration::from_secs(3)));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.register_capacity.get(), 1024);
    }

    #[test]
    fn parse_target() -> Result<(), ParseTargetError> {
        assert_eq!("127.0.0.1:9000".parse::<Target>()?, Target::tcp("127.0.0.1", 9000));
        assert_eq!("php-fpm:9000".parse::<Target>()?, Target::tcp("php-fpm", 9000));
        assert_eq!("[::1]:9001".parse::<Target>()?, Target::tcp("::1", 9001));
        assert_eq!("unix:/run/php/fpm.sock".parse::<Target>()?, Target::unix("/run/php/fpm.sock"));

        assert_eq!("unix:".parse::<Target>(), Err(ParseTargetError::EmptyPath));
        assert!(matches!("localhost".parse::<Target>(), Err(ParseTargetError::MissingPort(_))));
        assert!(matches!("localhost:http".parse::<Target>(), Err(ParseTargetError::InvalidPort(_))));
        assert!(matches!("localhost:70000".parse::<Target>(), Err(ParseTargetError::InvalidPort(_))));
        assert!(matches!("::1:9000".parse::<Target>(), Err(ParseTargetError::InvalidHost(_))));
        assert!(matches!("[::1:9000".parse::<Target>(), Err(ParseTargetError::InvalidHost(_))));
        assert!(matches!(":9000".parse::<Target>(), Err(ParseTargetError::InvalidHost(_))));
        Ok(())
    }

    #[test]
    fn display_target() -> Result<(), ParseTargetError> {
        for s in ["127.0.0.1:9000", "[::1]:9001", "unix:/tmp/app.sock"] {
            assert_eq!(s.parse::<Target>()?.to_string(), s);
        }
        Ok(())
    }
}

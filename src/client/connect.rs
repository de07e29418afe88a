use std::pin::Pin;

use futures_util::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tracing::{debug, Instrument};

use super::Client;
use crate::config::{Config, Target};
use crate::error::Error;


type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A [`Client`] over a TCP or Unix socket, as returned by [`Client::connect`].
pub type BoxedClient = Client<BoxedWriter>;

async fn open(target: &Target) -> std::io::Result<(BoxedReader, BoxedWriter)> {
    match target {
        Target::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "failed to set TCP_NODELAY");
            }
            let (r, w) = stream.into_split();
            Ok((Box::pin(r.compat()), Box::pin(w.compat_write())))
        },
        #[cfg(unix)]
        Target::Unix { path } => {
            let (r, w) = tokio::net::UnixStream::connect(path).await?.into_split();
            Ok((Box::pin(r.compat()), Box::pin(w.compat_write())))
        },
        #[cfg(not(unix))]
        Target::Unix { .. } => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Unix sockets are not available on this platform",
        )),
    }
}

impl Client<BoxedWriter> {
    /// Connects to a FastCGI responder and spawns the connection's [`Driver`](super::Driver)
    /// onto the current Tokio runtime.
    ///
    /// # Errors
    /// Returns [`Error::Connect`] if the connection cannot be established.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub async fn connect(target: &Target, config: Config) -> Result<Self, Error> {
        let (reader, writer) = open(target).await
            .map_err(|source| Error::Connect { target: target.clone(), source })?;
        debug!(%target, "connected to FastCGI responder");

        let (client, driver) = Self::with_config(reader, writer, config);
        let span = tracing::debug_span!("fastcgi_driver", %target);
        tokio::spawn(driver.run().instrument(span));
        Ok(client)
    }
}

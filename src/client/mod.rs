use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use futures_util::future::{self, Either};
use futures_util::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cgi::Params;
use crate::config::Config;
use crate::error::Error;
use crate::macros::trace;
use crate::protocol::body::{BeginRequest, EndRequest};
use crate::protocol::{record, RecordHeader, RecordType, FCGI_NULL_REQUEST_ID};
use crate::signal::Signal;

#[cfg(feature = "rt")]
mod connect;
mod driver;
#[cfg(test)]
mod test_support;

#[cfg(feature = "rt")]
pub use connect::BoxedClient;
pub use driver::Driver;


/// A chunk of a response, delivered by the [`Driver`] to the issuing caller.
#[derive(Debug)]
enum Frame {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    End(EndRequest),
}

/// A request waiting for its response.
#[derive(Debug)]
struct Pending {
    request_id: u16,
    frames: mpsc::Sender<Frame>,
    /// Whether the caller wants STDERR output.
    stderr: bool,
}

/// Messages from callers to the [`Driver`].
#[derive(Debug)]
enum Ingest {
    Register(Pending),
    /// The caller stopped waiting for this request.
    Abandon(u16),
}


/// The collected output of a FastCGI request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Everything the responder sent on its STDOUT stream.
    pub stdout: Vec<u8>,
    /// Everything the responder sent on its STDERR stream.
    pub stderr: Vec<u8>,
    /// The status the request ended with.
    pub end: EndRequest,
}


struct Output<W> {
    io: W,
    /// Reused for encoding records.
    buf: Vec<u8>,
    /// A record was only partially written.
    dirty: bool,
    closed: bool,
}

struct Inner<W> {
    output: async_lock::Mutex<Output<W>>,
    ingest: mpsc::Sender<Ingest>,
    next_id: AtomicU16,
    broken: Arc<Signal>,
    config: Config,
}

impl<W> Inner<W> {
    fn next_request_id(&self) -> u16 {
        loop {
            // Wraps around at u16::MAX, skipping the management ID
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != FCGI_NULL_REQUEST_ID {
                return id;
            }
        }
    }
}


/// A FastCGI client multiplexing concurrent requests over one connection.
///
/// A [`Client`] owns the writing half of the connection. Its [`Driver`] owns
/// the reading half and must be polled for responses to arrive, see
/// [`Client::new`]. With the `rt` feature, [`Client::connect`] takes care of
/// this.
///
/// Clones share the same connection. Once the connection is broken, every
/// pending and future request fails with [`Error::ConnectionBroken`].
/// Discard the client and connect a new one in that case.
pub struct Client<W> {
    inner: Arc<Inner<W>>,
}

impl<W> Clone for Client<W> {
    #[inline]
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<W> fmt::Debug for Client<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("broken", &self.inner.broken.is_set())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<W: AsyncWrite + Unpin> Client<W> {
    /// Creates a [`Client`] over the two halves of a connection, using the
    /// default [`Config`].
    ///
    /// The returned [`Driver`] reads responses from `reader`. It must be
    /// spawned onto an executor, or otherwise polled alongside the requests.
    pub fn new<R: AsyncRead + Unpin>(reader: R, writer: W) -> (Self, Driver<R>) {
        Self::with_config(reader, writer, Config::default())
    }

    /// Like [`Client::new`], with a custom [`Config`].
    pub fn with_config<R: AsyncRead + Unpin>(reader: R, writer: W, config: Config) -> (Self, Driver<R>) {
        let (ingest, queue) = mpsc::channel(config.register_capacity.get());
        let broken = Arc::new(Signal::default());
        let output = Output { io: writer, buf: Vec::new(), dirty: false, closed: false };
        let inner = Inner {
            output: async_lock::Mutex::new(output),
            ingest,
            next_id: AtomicU16::new(1),
            broken: broken.clone(),
            config,
        };
        (Self { inner: Arc::new(inner) }, Driver::new(reader, queue, broken))
    }

    /// Returns the [`Config`] of this client.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Tests whether the connection is broken. Once broken, it stays broken.
    #[inline]
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.inner.broken.is_set()
    }

    /// Marks the connection as broken and closes its writing half.
    ///
    /// The [`Driver`] stops and every pending request fails with
    /// [`Error::ConnectionBroken`]. Further calls do nothing.
    ///
    /// # Errors
    /// Returns errors from closing the writing half.
    pub async fn close(&self) -> Result<(), Error> {
        if self.inner.broken.set() {
            debug!("closing FastCGI connection");
        }
        let mut out = self.inner.output.lock().await;
        if out.closed {
            return Ok(());
        }
        out.closed = true;
        out.io.close().await?;
        Ok(())
    }

    /// Writes one record under the connection's write lock.
    async fn write_one(&self, rtype: RecordType, request_id: u16, content: &[u8]) -> Result<(), Error> {
        let inner = &*self.inner;
        let mut out = inner.output.lock().await;
        if out.dirty && inner.broken.set() {
            warn!("FastCGI connection poisoned by an interrupted record write");
        }
        if out.closed || inner.broken.is_set() {
            return Err(Error::ConnectionBroken);
        }

        let Output { io, buf, dirty, .. } = &mut *out;
        buf.clear();
        record::encode_into(rtype, request_id, content, buf)?;
        *dirty = true;
        io.write_all(buf.as_slice()).await?;
        io.flush().await?;
        *dirty = false;
        trace!(request_id, ?rtype, bytes = content.len(), "wrote FastCGI record");
        Ok(())
    }

    /// Writes `content` as records of type `rtype` for `request_id`.
    ///
    /// Stream types are split into as many records as needed, followed by
    /// an empty record ending the stream. Other types must fit into a single
    /// record. Records of concurrent writers never interleave.
    ///
    /// # Errors
    /// Returns [`Error::ConnectionBroken`] if the connection is broken or
    /// closed, [`Error::Protocol`] if a non-stream `content` is too large,
    /// and [`Error::Io`] if writing fails.
    pub async fn write_record(&self, rtype: RecordType, request_id: u16, content: &[u8]) -> Result<(), Error> {
        if !rtype.is_stream() {
            return self.write_one(rtype, request_id, content).await;
        }
        for chunk in content.chunks(RecordHeader::MAX_CONTENT_LEN) {
            self.write_one(rtype, request_id, chunk).await?;
        }
        self.write_one(rtype, request_id, &[]).await
    }

    /// Sends the BEGIN_REQUEST record and the PARAMS and STDIN streams.
    async fn send_request(&self, request_id: u16, params: &Params, stdin: &[u8]) -> Result<(), Error> {
        self.write_record(RecordType::BeginRequest, request_id, &BeginRequest::RESPONDER.to_bytes()).await?;
        self.write_record(RecordType::Params, request_id, &params.encode()?).await?;
        self.write_record(RecordType::Stdin, request_id, stdin).await
    }

    /// Queues a request for the [`Driver`], before any of its records are
    /// written.
    async fn register(&self, pending: Pending) -> Result<(), Error> {
        let inner = &*self.inner;
        let send = pin!(inner.ingest.send(Ingest::Register(pending)));
        match future::select(send, pin!(inner.broken.wait())).await {
            Either::Left((Ok(()), _)) => Ok(()),
            _ => Err(Error::ConnectionBroken),
        }
    }

    /// Issues a FastCGI request and streams its response into `stdout` and
    /// `stderr`.
    ///
    /// The request uses the [`Responder`](crate::protocol::Role::Responder)
    /// role and keeps the connection open. `params` become the request's
    /// CGI/1.1 environment, `stdin` its body. STDERR output is discarded if
    /// `stderr` is [`None`]. Both sinks are flushed when the request ends.
    ///
    /// Sending the request and receiving its response run concurrently. With
    /// the `rt` feature and [`Config::request_timeout`] set, the request is
    /// abandoned once the timeout elapses. Dropping the returned future
    /// abandons it as well.
    ///
    /// # Errors
    /// Returns [`Error::ConnectionBroken`] if the connection is or becomes
    /// broken before the request ends, [`Error::Abandoned`] on timeout, and
    /// [`Error::Io`] if writing to the connection or the sinks fails.
    pub async fn request_io<O, E>(
        &self,
        params: &Params,
        stdin: &[u8],
        stdout: &mut O,
        stderr: Option<&mut E>,
    ) -> Result<EndRequest, Error>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let request_id = self.inner.next_request_id();
        let exchange = self.exchange(request_id, params, stdin, stdout, stderr);

        #[cfg(feature = "rt")]
        if let Some(timeout) = self.inner.config.request_timeout {
            return match tokio::time::timeout(timeout, exchange).await {
                Ok(res) => res,
                Err(_) => {
                    debug!(request_id, ?timeout, "FastCGI request timed out");
                    Err(Error::Abandoned { request_id, timeout })
                },
            };
        }
        exchange.await
    }

    async fn exchange<O, E>(
        &self,
        request_id: u16,
        params: &Params,
        stdin: &[u8],
        stdout: &mut O,
        stderr: Option<&mut E>,
    ) -> Result<EndRequest, Error>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        if self.is_broken() {
            return Err(Error::ConnectionBroken);
        }

        let (frames, rx) = mpsc::channel(self.inner.config.response_capacity.get());
        self.register(Pending { request_id, frames, stderr: stderr.is_some() }).await?;
        let mut registration = Registration { ingest: &self.inner.ingest, request_id, done: false };
        trace!(request_id, "issuing FastCGI request");

        let send = self.send_request(request_id, params, stdin);
        let receive = receive(rx, &self.inner.broken, stdout, stderr);
        let ((), end) = future::try_join(pin!(send), pin!(receive)).await?;

        registration.done = true;
        trace!(request_id, app_status = end.app_status, "FastCGI request ended");
        Ok(end)
    }

    /// Issues a FastCGI request and collects its STDOUT and STDERR output.
    ///
    /// # Errors
    /// See [`Client::request_io`].
    pub async fn request(&self, params: &Params, stdin: &[u8]) -> Result<Response, Error> {
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let end = self.request_io(params, stdin, &mut stdout, Some(&mut stderr)).await?;
        Ok(Response { stdout, stderr, end })
    }

    /// Issues a FastCGI request, streaming its STDOUT output into `stdout`
    /// and discarding STDERR output.
    ///
    /// # Errors
    /// See [`Client::request_io`].
    pub async fn request_stdout<O>(&self, params: &Params, stdin: &[u8], stdout: &mut O) -> Result<EndRequest, Error>
    where
        O: AsyncWrite + Unpin + ?Sized,
    {
        self.request_io(params, stdin, stdout, None::<&mut Vec<u8>>).await
    }
}


/// Receives the frames of one request until it ends or the connection breaks.
async fn receive<O, E>(
    mut frames: mpsc::Receiver<Frame>,
    broken: &Signal,
    stdout: &mut O,
    mut stderr: Option<&mut E>,
) -> Result<EndRequest, Error>
where
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    loop {
        let received = {
            let recv = pin!(frames.recv());
            match future::select(recv, pin!(broken.wait())).await {
                Either::Left((frame, _)) => Some(frame),
                Either::Right(_) => None,
            }
        };
        // Frames delivered before the connection broke still count
        let frame = match received {
            Some(frame) => frame,
            None => frames.try_recv().ok(),
        };

        match frame {
            Some(Frame::Stdout(data)) => stdout.write_all(&data).await?,
            Some(Frame::Stderr(data)) => {
                if let Some(sink) = stderr.as_deref_mut() {
                    sink.write_all(&data).await?;
                }
            },
            Some(Frame::End(end)) => {
                stdout.flush().await?;
                if let Some(sink) = stderr.as_deref_mut() {
                    sink.flush().await?;
                }
                return Ok(end);
            },
            None => return Err(Error::ConnectionBroken),
        }
    }
}


/// Deregisters a request from the [`Driver`] unless it completed.
struct Registration<'a> {
    ingest: &'a mpsc::Sender<Ingest>,
    request_id: u16,
    done: bool,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let request_id = self.request_id;
        if self.ingest.try_send(Ingest::Abandon(request_id)).is_ok() {
            debug!(request_id, "abandoned FastCGI request");
        } else {
            trace!(request_id, "could not queue abandoned FastCGI request");
        }
    }
}

use std::collections::HashMap;
use std::fmt;
use std::future::IntoFuture;
use std::pin::pin;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, Either, FutureExt};
use futures_util::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Frame, Ingest, Pending};
use crate::error::Error;
use crate::macros::trace;
use crate::protocol::body::{EndRequest, UnknownType};
use crate::protocol::{Record, RecordType};
use crate::signal::Signal;


/// The reading half of a FastCGI connection.
///
/// The [`Driver`] decodes the responder's records and routes them to the
/// requests issued by its [`Client`](super::Client). It runs until the
/// connection fails or the client is closed, and must be spawned onto an
/// executor or polled alongside the requests. Awaiting it directly is
/// equivalent to [`Driver::run`].
///
/// When the [`Driver`] stops, or is dropped, the connection is broken.
pub struct Driver<R> {
    reader: R,
    queue: mpsc::Receiver<Ingest>,
    broken: Arc<Signal>,
    active: HashMap<u16, Pending>,
}

impl<R> fmt::Debug for Driver<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Driver")
            .field("active", &self.active.len())
            .field("broken", &self.broken.is_set())
            .finish_non_exhaustive()
    }
}

impl<R> Drop for Driver<R> {
    fn drop(&mut self) {
        self.broken.set();
    }
}

impl<R: AsyncRead + Unpin> Driver<R> {
    pub(super) fn new(reader: R, queue: mpsc::Receiver<Ingest>, broken: Arc<Signal>) -> Self {
        Self { reader, queue, broken, active: HashMap::new() }
    }

    /// Reads and dispatches records until the connection fails or is closed.
    ///
    /// Afterwards the connection is broken and all pending requests fail.
    ///
    /// # Errors
    /// Returns the error that broke the connection. A closed [`Client`](super::Client)
    /// results in `Ok(())`.
    pub async fn run(mut self) -> Result<(), Error> {
        let res = self.read_loop().await;
        match &res {
            Ok(()) => debug!("FastCGI connection closed"),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("FastCGI responder closed the connection");
            },
            Err(e) => warn!(error = %e, "FastCGI connection failed"),
        }
        self.shutdown();
        res
    }

    async fn read_loop(&mut self) -> Result<(), Error> {
        loop {
            let record = {
                let read = pin!(Record::read(&mut self.reader));
                match future::select(pin!(self.broken.wait()), read).await {
                    Either::Left(_) => return Ok(()),
                    Either::Right((res, _)) => res?,
                }
            };
            // Requests are queued before their first record is written
            self.drain_queue();
            self.dispatch(record).await?;
        }
    }

    fn drain_queue(&mut self) {
        while let Ok(ingest) = self.queue.try_recv() {
            match ingest {
                Ingest::Register(pending) => {
                    let request_id = pending.request_id;
                    if self.active.insert(request_id, pending).is_some() {
                        warn!(request_id, "FastCGI request ID reused while still in flight");
                    }
                },
                Ingest::Abandon(request_id) => {
                    // The ID may already belong to a newer request
                    if self.active.get(&request_id).is_some_and(|p| p.frames.is_closed()) {
                        self.active.remove(&request_id);
                        debug!(request_id, "deregistered abandoned FastCGI request");
                    }
                },
            }
        }
    }

    async fn dispatch(&mut self, record: Record) -> Result<(), Error> {
        let Record { header, content } = record;
        let request_id = header.request_id;
        if header.rtype == RecordType::Unknown {
            match UnknownType::from_slice(&content) {
                Ok(u) => debug!(rtype = u.rtype, "FastCGI responder rejected a record type"),
                Err(e) => debug!(error = %e, "invalid UNKNOWN_TYPE record"),
            }
            return Ok(());
        }
        if !header.rtype.is_response() {
            trace!(request_id, rtype = ?header.rtype, "ignored FastCGI record");
            return Ok(());
        }

        // Records for finished or foreign requests are dropped unparsed
        let Some(pending) = self.active.get(&request_id) else {
            trace!(request_id, rtype = ?header.rtype, "dropped FastCGI record for unknown request");
            return Ok(());
        };
        let frame = match header.rtype {
            RecordType::Stdout | RecordType::Stderr if content.is_empty() => {
                trace!(request_id, rtype = ?header.rtype, "FastCGI output stream ended");
                return Ok(());
            },
            RecordType::Stdout => Frame::Stdout(content),
            RecordType::Stderr if pending.stderr => Frame::Stderr(content),
            RecordType::EndRequest => Frame::End(EndRequest::from_slice(&content)?),
            _ => return Ok(()),
        };

        let end = matches!(frame, Frame::End(_));
        let delivered = {
            let send = pin!(pending.frames.send(frame));
            match future::select(send, pin!(self.broken.wait())).await {
                Either::Left((res, _)) => res.is_ok(),
                Either::Right(_) => return Ok(()),
            }
        };
        if end || !delivered {
            self.active.remove(&request_id);
        }
        if !delivered {
            debug!(request_id, "FastCGI request caller went away");
        }
        Ok(())
    }

    /// Breaks the connection and fails all pending requests.
    fn shutdown(&mut self) {
        self.broken.set();
        let pending = self.active.len();
        self.active.clear();
        self.queue.close();
        while let Ok(ingest) = self.queue.try_recv() {
            drop(ingest);
        }
        debug!(pending, "FastCGI driver stopped");
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> IntoFuture for Driver<R> {
    type Output = Result<(), Error>;
    type IntoFuture = BoxFuture<'static, Result<(), Error>>;

    fn into_future(self) -> Self::IntoFuture {
        self.run().boxed()
    }
}

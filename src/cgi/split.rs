use std::collections::VecDeque;
use std::fmt;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};

use futures_util::io::{AsyncWrite, AsyncWriteExt};
use futures_util::task::AtomicWaker;

use super::response::parse_header_line;


/// The default number of bytes a [`BodyWriter`] buffers before the headers
/// have been scanned.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Output is buffered for the scanner.
    Buffering,
    /// The scanner is moving leftover buffered bytes into the destination.
    HeadersDone,
    /// Output goes straight to the destination.
    Direct,
}

struct State<D> {
    phase: Phase,
    /// Set once the writer side finished. Never unset.
    closed: bool,
    /// Set if the scanner went away before the writer was closed.
    detached: bool,
    buf: VecDeque<u8>,
    cap: usize,
    dest: Option<D>,
    scanner_waker: AtomicWaker,
    writer_waker: AtomicWaker,
}

type Shared<D> = Arc<Mutex<State<D>>>;

fn lock<D>(shared: &Mutex<State<D>>) -> MutexGuard<'_, State<D>> {
    // State stays consistent even if a destination panicked mid-poll
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "CGI response splitter is closed")
}


/// Splits a CGI/1.1 response stream into its headers and its body.
///
/// The returned [`BodyWriter`] receives the raw response, usually as the
/// STDOUT sink of [`Client::request_io`](crate::Client::request_io). The
/// [`HeaderScanner`] reads the header lines from it. Once the headers are
/// known, [`HeaderScanner::pass_through`] forwards the rest of the response
/// to `dest` without buffering it.
///
/// Both halves must be driven concurrently, e.g. with `join`. The writer
/// applies backpressure while its buffer of [`DEFAULT_CAPACITY`] bytes is
/// full.
pub fn split<D>(dest: D) -> (BodyWriter<D>, HeaderScanner<D>) {
    split_with_capacity(dest, DEFAULT_CAPACITY)
}

/// Like [`split`], but with a custom buffer capacity.
///
/// A single header line must fit into the buffer.
pub fn split_with_capacity<D>(dest: D, cap: usize) -> (BodyWriter<D>, HeaderScanner<D>) {
    let cap = cap.max(1);
    let shared = Arc::new(Mutex::new(State {
        phase: Phase::Buffering,
        closed: false,
        detached: false,
        buf: VecDeque::with_capacity(cap.min(DEFAULT_CAPACITY)),
        cap,
        dest: Some(dest),
        scanner_waker: AtomicWaker::new(),
        writer_waker: AtomicWaker::new(),
    }));
    (BodyWriter { shared: shared.clone() }, HeaderScanner { shared, done: false })
}


/// The writing half of [`split`].
///
/// Writes fail with [`io::ErrorKind::BrokenPipe`] after the writer was
/// closed or the [`HeaderScanner`] was dropped. Dropping the writer closes it.
pub struct BodyWriter<D> {
    shared: Shared<D>,
}

impl<D: AsyncWrite + Unpin> AsyncWrite for BodyWriter<D> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut state = lock(&self.shared);
        if state.closed || state.detached {
            return Poll::Ready(Err(broken_pipe()));
        }

        match state.phase {
            Phase::Buffering => {
                if buf.is_empty() {
                    return Poll::Ready(Ok(0));
                }
                let room = state.cap.saturating_sub(state.buf.len());
                if room == 0 {
                    state.writer_waker.register(cx.waker());
                    return Poll::Pending;
                }
                let n = room.min(buf.len());
                state.buf.extend(&buf[..n]);
                state.scanner_waker.wake();
                Poll::Ready(Ok(n))
            },
            Phase::HeadersDone => {
                state.writer_waker.register(cx.waker());
                Poll::Pending
            },
            Phase::Direct => match state.dest.as_mut() {
                Some(dest) => Pin::new(dest).poll_write(cx, buf),
                None => Poll::Ready(Err(broken_pipe())),
            },
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        let mut state = lock(&self.shared);
        match (state.phase, state.dest.as_mut()) {
            (Phase::Direct, Some(dest)) => Pin::new(dest).poll_flush(cx),
            _ => Poll::Ready(Ok(())),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        let mut state = lock(&self.shared);
        if state.closed {
            return Poll::Ready(Ok(()));
        }
        if let (Phase::Direct, Some(dest)) = (state.phase, state.dest.as_mut()) {
            ready!(Pin::new(dest).poll_flush(cx))?;
        }
        state.closed = true;
        state.scanner_waker.wake();
        Poll::Ready(Ok(()))
    }
}

impl<D> Drop for BodyWriter<D> {
    fn drop(&mut self) {
        let mut state = lock(&self.shared);
        state.closed = true;
        state.scanner_waker.wake();
    }
}

impl<D> fmt::Debug for BodyWriter<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = lock(&self.shared);
        f.debug_struct("BodyWriter")
            .field("phase", &state.phase)
            .field("closed", &state.closed)
            .field("buffered", &state.buf.len())
            .finish_non_exhaustive()
    }
}


/// The reading half of [`split`].
///
/// Header lines are consumed straight from the writer's buffer, so whatever
/// the scanner has not read yet is exactly what
/// [`pass_through`](HeaderScanner::pass_through) forwards to the destination.
pub struct HeaderScanner<D> {
    shared: Shared<D>,
    /// The blank line or the end of the response was reached.
    done: bool,
}

impl<D> HeaderScanner<D> {
    fn poll_line(&mut self, cx: &mut Context) -> Poll<io::Result<Option<String>>> {
        let mut state = lock(&self.shared);
        let end = match state.buf.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None if state.closed && state.buf.is_empty() => return Poll::Ready(Ok(None)),
            None if state.closed => state.buf.len(),
            None if state.buf.len() >= state.cap => {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "CGI response header line exceeds the buffer capacity",
                )));
            },
            None => {
                state.scanner_waker.register(cx.waker());
                return Poll::Pending;
            },
        };

        let line: Vec<u8> = state.buf.drain(..end).collect();
        state.writer_waker.wake();
        Poll::Ready(Ok(Some(String::from_utf8_lossy(&line).trim().to_owned())))
    }

    /// Reads the next line of the response, with surrounding whitespace
    /// (including the line terminator) removed.
    ///
    /// Returns [`None`] once the writer is closed and everything was read.
    ///
    /// # Errors
    /// Fails with [`io::ErrorKind::InvalidData`] if a line does not fit into
    /// the buffer.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        poll_fn(|cx| self.poll_line(cx)).await
    }

    /// Reads the next `Name: Value` header.
    ///
    /// Malformed lines are skipped. Returns [`None`] at the blank line
    /// separating headers and body, at the end of the response, and on every
    /// call after either.
    ///
    /// # Errors
    /// See [`HeaderScanner::next_line`].
    pub async fn next_header(&mut self) -> io::Result<Option<(String, String)>> {
        while !self.done {
            let line = match self.next_line().await? {
                Some(line) if !line.is_empty() => line,
                _ => {
                    self.done = true;
                    break;
                },
            };
            match parse_header_line(&line) {
                Some((name, value)) => return Ok(Some((name.to_owned(), value.to_owned()))),
                None => tracing::debug!(line = %line, "skipped malformed CGI response header"),
            }
        }
        Ok(None)
    }

    /// Reads all remaining headers.
    ///
    /// # Errors
    /// See [`HeaderScanner::next_line`].
    pub async fn read_headers(&mut self) -> io::Result<Vec<(String, String)>> {
        let mut headers = Vec::new();
        while let Some(h) = self.next_header().await? {
            headers.push(h);
        }
        Ok(headers)
    }

    /// Reads all remaining headers into an [`http::HeaderMap`], separating
    /// out the CGI `Status` header.
    ///
    /// # Errors
    /// See [`HeaderScanner::next_line`].
    #[cfg(feature = "http")]
    pub async fn read_header_map(&mut self) -> io::Result<(Option<http::StatusCode>, http::HeaderMap)> {
        let headers = self.read_headers().await?;
        Ok(super::header_map(headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))))
    }
}

impl<D: AsyncWrite + Unpin> HeaderScanner<D> {
    /// Switches the writer to direct passthrough and waits for it to finish.
    ///
    /// Buffered bytes the scanner did not consume are written to the
    /// destination first. Writes arriving meanwhile wait, and continue
    /// directly into the destination afterwards. Once the [`BodyWriter`] is
    /// closed or dropped, the destination is flushed and returned.
    ///
    /// # Errors
    /// Errors from writing to or flushing the destination are returned
    /// unchanged. The writer then fails with [`io::ErrorKind::BrokenPipe`].
    pub async fn pass_through(self) -> io::Result<D> {
        let (pending, dest) = {
            let mut state = lock(&self.shared);
            state.phase = Phase::HeadersDone;
            (std::mem::take(&mut state.buf), state.dest.take())
        };
        let mut dest = dest.ok_or_else(broken_pipe)?;

        let (front, back) = pending.as_slices();
        dest.write_all(front).await?;
        dest.write_all(back).await?;

        {
            let mut state = lock(&self.shared);
            state.dest = Some(dest);
            state.phase = Phase::Direct;
            state.writer_waker.wake();
        }

        poll_fn(|cx| {
            let mut state = lock(&self.shared);
            if state.closed {
                Poll::Ready(())
            } else {
                state.scanner_waker.register(cx.waker());
                Poll::Pending
            }
        }).await;

        let dest = lock(&self.shared).dest.take();
        let mut dest = dest.ok_or_else(broken_pipe)?;
        dest.flush().await?;
        Ok(dest)
    }
}

impl<D> Drop for HeaderScanner<D> {
    fn drop(&mut self) {
        let mut state = lock(&self.shared);
        if !state.closed {
            state.detached = true;
            state.writer_waker.wake();
        }
    }
}

impl<D> fmt::Debug for HeaderScanner<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = lock(&self.shared);
        f.debug_struct("HeaderScanner")
            .field("phase", &state.phase)
            .field("done", &self.done)
            .field("buffered", &state.buf.len())
            .finish_non_exhaustive()
    }
}

use std::collections::HashMap;
use std::io;

use futures_util::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

use super::{Client, Driver};
use crate::config::Config;
use crate::protocol::body::{BeginRequest, EndRequest};
use crate::protocol::{nv, record, ProtocolStatus, Record, RecordType};


pub(super) type TestReader = Compat<ReadHalf<DuplexStream>>;
pub(super) type TestWriter = Compat<WriteHalf<DuplexStream>>;
pub(super) type TestClient = Client<TestWriter>;

/// Creates a client connected to an in-process [`MockResponder`].
pub(super) fn connected(config: Config) -> (TestClient, Driver<TestReader>, MockResponder<TestReader, TestWriter>) {
    let (near, far) = tokio::io::duplex(16 * 1024);
    let (r, w) = tokio::io::split(near);
    let (client, driver) = Client::with_config(r.compat(), w.compat_write(), config);
    let (r, w) = tokio::io::split(far);
    (client, driver, MockResponder::new(r.compat(), w.compat_write()))
}


/// A request as seen by the responder.
#[derive(Debug, Default)]
pub(super) struct Received {
    pub(super) request_id: u16,
    pub(super) params: Vec<(String, String)>,
    pub(super) stdin: Vec<u8>,
    /// Content lengths of the STDIN records, including the terminator.
    pub(super) stdin_records: Vec<usize>,
    params_raw: Vec<u8>,
    params_done: bool,
}

impl Received {
    pub(super) fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}


/// The responder end of a FastCGI connection, driven by the test.
pub(super) struct MockResponder<R, W> {
    reader: R,
    writer: W,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> MockResponder<R, W> {
    pub(super) fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads records until `n` requests have been received completely.
    ///
    /// Requests are returned in the order their STDIN stream ended.
    pub(super) async fn read_requests(&mut self, n: usize) -> io::Result<Vec<Received>> {
        let mut partial: HashMap<u16, Received> = HashMap::new();
        let mut done = Vec::with_capacity(n);
        while done.len() < n {
            let Record { header, content } = Record::read(&mut self.reader).await
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let id = header.request_id;
            match header.rtype {
                RecordType::BeginRequest => {
                    assert_eq!(BeginRequest::from_slice(&content).ok(), Some(BeginRequest::RESPONDER));
                    let prev = partial.insert(id, Received { request_id: id, ..Received::default() });
                    assert!(prev.is_none(), "request {id} began twice");
                },
                RecordType::Params => {
                    let req = partial.get_mut(&id).expect("PARAMS before BEGIN_REQUEST");
                    assert!(!req.params_done, "PARAMS after end of stream");
                    if content.is_empty() {
                        req.params_done = true;
                        req.params = nv::NVIter::new(&req.params_raw)
                            .map(|(n, v)| (String::from_utf8_lossy(n).into(), String::from_utf8_lossy(v).into()))
                            .collect();
                    } else {
                        req.params_raw.extend_from_slice(&content);
                    }
                },
                RecordType::Stdin => {
                    let req = partial.get_mut(&id).expect("STDIN before BEGIN_REQUEST");
                    assert!(req.params_done, "STDIN before end of PARAMS");
                    req.stdin_records.push(content.len());
                    req.stdin.extend_from_slice(&content);
                    if content.is_empty() {
                        done.extend(partial.remove(&id));
                    }
                },
                other => panic!("unexpected {other:?} record from client"),
            }
        }
        Ok(done)
    }

    pub(super) async fn read_request(&mut self) -> io::Result<Received> {
        let mut reqs = self.read_requests(1).await?;
        reqs.pop().ok_or_else(|| io::ErrorKind::UnexpectedEof.into())
    }

    pub(super) async fn send_raw(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await
    }

    pub(super) async fn send(&mut self, rtype: RecordType, request_id: u16, content: &[u8]) -> io::Result<()> {
        let rec = record::encode(rtype, request_id, content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.send_raw(&rec).await
    }

    pub(super) async fn stdout(&mut self, request_id: u16, data: &[u8]) -> io::Result<()> {
        self.send(RecordType::Stdout, request_id, data).await
    }

    pub(super) async fn stderr(&mut self, request_id: u16, data: &[u8]) -> io::Result<()> {
        self.send(RecordType::Stderr, request_id, data).await
    }

    /// Ends both output streams and the request.
    pub(super) async fn end(&mut self, request_id: u16, app_status: u32) -> io::Result<()> {
        self.stdout(request_id, b"").await?;
        self.stderr(request_id, b"").await?;
        let end = EndRequest { app_status, protocol_status: ProtocolStatus::RequestComplete };
        self.send_raw(&end.to_record(request_id)).await
    }

    /// Answers one request with `body` and exit status 0.
    pub(super) async fn respond(&mut self, request_id: u16, body: &[u8]) -> io::Result<()> {
        self.stdout(request_id, body).await?;
        self.end(request_id, 0).await
    }
}

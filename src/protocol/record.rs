use std::io;

use futures_util::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::{Error as ProtocolError, RecordHeader, RecordType};


/// Errors that may occur while decoding a record from a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The stream failed or ended before a record was complete.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The stream carried a malformed record.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl DecodeError {
    /// Tests whether the stream simply ended at a record boundary or in the
    /// middle of a record.
    #[inline]
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}


/// A complete FastCGI record with its padding removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The header of this record.
    pub header: RecordHeader,
    /// The payload of this record, `header.content_length` bytes long.
    pub content: Vec<u8>,
}

impl Record {
    /// Reads the next record of a known type from `r`.
    ///
    /// Records with a type byte unknown to this crate are consumed whole and
    /// skipped. The content and the padding of a record are read in one
    /// contiguous read.
    ///
    /// # Errors
    /// Returns [`DecodeError::Io`] if the stream fails or ends early, and
    /// [`DecodeError::Protocol`] if a header specifies an unknown version.
    pub async fn read<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<Self, DecodeError> {
        loop {
            let mut head = [0; RecordHeader::LEN];
            r.read_exact(&mut head).await?;

            let header = match RecordHeader::from_bytes(head) {
                Ok(h) => h,
                Err(ProtocolError::UnknownRecordType(rtype)) => {
                    let len = usize::from(u16::from_be_bytes([head[4], head[5]])) + usize::from(head[6]);
                    let mut skip = vec![0; len];
                    r.read_exact(&mut skip).await?;
                    debug!(rtype, bytes = len, "skipped FastCGI record of unknown type");
                    continue;
                },
                Err(e) => return Err(e.into()),
            };

            let mut content = vec![0; header.body_len()];
            r.read_exact(&mut content).await?;
            content.truncate(header.content_length.into());
            return Ok(Self { header, content });
        }
    }
}


/// Appends an encoded record to `out`: the header, `content` and zero padding
/// up to the next multiple of 8 bytes.
///
/// # Errors
/// Returns [`ProtocolError::OversizedContent`] if `content` does not fit into
/// a single record. Nothing is appended in that case.
pub fn encode_into(rtype: RecordType, request_id: u16, content: &[u8], out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let len = u16::try_from(content.len()).map_err(|_| ProtocolError::OversizedContent(content.len()))?;
    let mut header = RecordHeader::new(rtype, request_id);
    header.set_lengths(len);

    out.reserve(RecordHeader::LEN + header.body_len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(content);
    out.extend_from_slice(header.padding_bytes());
    Ok(())
}

/// Encodes a record into a new buffer. See [`encode_into`].
///
/// # Errors
/// Returns [`ProtocolError::OversizedContent`] if `content` does not fit into
/// a single record.
pub fn encode(rtype: RecordType, request_id: u16, content: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    encode_into(rtype, request_id, content, &mut out)?;
    Ok(out)
}


#[cfg(test)]
mod tests {
    use std::iter::repeat_with;
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        repeat_with(|| fastrand::u8(..)).take(len).collect()
    }

    #[tokio::test]
    async fn roundtrip() -> Result<(), DecodeError> {
        let lens = [0, 1, 7, 8, 9, 1000, RecordHeader::MAX_CONTENT_LEN - 1, RecordHeader::MAX_CONTENT_LEN];
        for len in lens.into_iter().chain(repeat_with(|| fastrand::usize(..=RecordHeader::MAX_CONTENT_LEN)).take(10)) {
            let content = payload(len);
            let request_id = fastrand::u16(1..);
            let wire = encode(RecordType::Stdout, request_id, &content)?;
            assert_eq!(wire.len() % 8, 0, "record with {len} content bytes is not 8-byte aligned");

            let rec = Record::read(&mut &wire[..]).await?;
            assert_eq!(rec.header.rtype, RecordType::Stdout);
            assert_eq!(rec.header.request_id, request_id);
            assert_eq!(rec.content, content);
        }
        Ok(())
    }

    #[test]
    fn oversized() {
        let content = vec![0; RecordHeader::MAX_CONTENT_LEN + 1];
        let mut out = vec![1, 2, 3];
        let res = encode_into(RecordType::Stdin, 1, &content, &mut out);
        assert!(matches!(res, Err(ProtocolError::OversizedContent(65536))));
        assert_eq!(out, [1, 2, 3]);
    }

    #[tokio::test]
    async fn sequence() -> Result<(), DecodeError> {
        let mut wire = Vec::new();
        encode_into(RecordType::Stdout, 3, b"Status: 200\r\n", &mut wire)?;
        // Unknown record type 0x42 with 3 content and 5 padding bytes
        wire.extend_from_slice(&[1, 0x42, 0, 3, 0, 3, 5, 0, 9, 9, 9, 0, 0, 0, 0, 0]);
        encode_into(RecordType::EndRequest, 3, &[0; 8], &mut wire)?;

        let mut r = &wire[..];
        let first = Record::read(&mut r).await?;
        assert_eq!(first.content, b"Status: 200\r\n");
        let second = Record::read(&mut r).await?;
        assert_eq!(second.header.rtype, RecordType::EndRequest);
        assert_eq!(second.content, [0; 8]);
        assert!(r.is_empty());

        let end = Record::read(&mut r).await;
        assert!(matches!(end, Err(ref e) if e.is_eof()));
        Ok(())
    }

    #[tokio::test]
    async fn malformed() -> Result<(), DecodeError> {
        const BAD_VERSION: [u8; 8] = [2, 6, 0, 1, 0, 0, 0, 0];
        let res = Record::read(&mut &BAD_VERSION[..]).await;
        assert!(matches!(res, Err(DecodeError::Protocol(ProtocolError::UnknownVersion(2)))));

        let mut wire = encode(RecordType::Stdout, 1, b"truncated")?;
        wire.truncate(12);
        let res = Record::read(&mut &wire[..]).await;
        assert!(matches!(res, Err(ref e) if e.is_eof()));

        let res = Record::read(&mut &wire[..5]).await;
        assert!(matches!(res, Err(ref e) if e.is_eof()));
        Ok(())
    }
}

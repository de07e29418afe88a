/// Types representing the bodies of fixed-size FastCGI records.
pub mod body;
mod fields;
/// An encoder and decoder for FastCGI name-value pairs.
pub mod nv;
/// Framing of complete FastCGI records.
pub mod record;
/// An encoder and decoder for FastCGI's variable-length integers.
pub mod varint;

pub use fields::*;
pub use record::Record;


/// The fixed FastCGI request ID for management records.
pub const FCGI_NULL_REQUEST_ID: u16 = 0;


/// Error types that may occur while processing FastCGI protocol elements.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The FastCGI version field specifies an unknown version identifier.
    #[error("unknown FastCGI protocol version {0}")]
    UnknownVersion(u8),
    /// The FastCGI record type field specifies an unknown record type.
    #[error("unknown FastCGI record type {0}")]
    UnknownRecordType(u8),
    /// The FastCGI request role field specifies an unknown role identifier.
    #[error("unknown FastCGI role {0}")]
    UnknownRole(u16),
    /// The FastCGI request flags contain at least one unknown flag bit.
    #[error("unknown FastCGI request flags {0:#010b}")]
    UnknownFlags(u8),
    /// The FastCGI response protocol status specifies an unknown status.
    #[error("unknown FastCGI protocol status {0}")]
    UnknownStatus(u8),

    /// A fixed-size record body has the wrong length.
    #[error("{rtype:?} FastCGI record has body length {len}, expected 8")]
    InvalidBodyLength {
        /// The type of the offending record.
        rtype: RecordType,
        /// The length of the received body.
        len: usize,
    },
    /// The content does not fit into a single FastCGI record and must be
    /// split up by the caller.
    #[error("{0} bytes exceed the maximum FastCGI record content length")]
    OversizedContent(usize),
    /// The input value is too large to be encoded as a FastCGI VarInt.
    #[error("input is too large to be encoded as a FastCGI VarInt")]
    InvalidVarInt,
}


/// A FastCGI record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordHeader {
    /// The FastCGI version of this record.
    pub version: Version,
    /// The type of this record, defining its payload.
    pub rtype: RecordType,
    /// The ID of the request this record belongs to.
    pub request_id: u16,
    /// The length of this record's payload.
    pub content_length: u16,
    /// The amount of padding following this record.
    pub padding_length: u8,
}

impl RecordHeader {
    /// The number of bytes in the wire format of a [`RecordHeader`].
    pub const LEN: usize = 8;

    /// The largest payload a single record can carry.
    pub const MAX_CONTENT_LEN: usize = u16::MAX as usize;

    /// Creates a new [`RecordHeader`] with [`Version::V1`] and all
    /// lengths set to 0.
    ///
    /// Use `RecordHeader::set_lengths` afterwards if the record has a body.
    #[inline]
    #[must_use]
    pub fn new(rtype: RecordType, request_id: u16) -> Self {
        Self { version: Version::V1, rtype, request_id, content_length: 0, padding_length: 0 }
    }

    /// Sets `content_length` and the matching `padding_length`.
    ///
    /// Up to 7 bytes of padding are used such that
    /// `content_length + padding_length` is a multiple of 8.
    #[inline]
    pub fn set_lengths(&mut self, content_length: u16) {
        self.content_length = content_length;
        #[allow(clippy::cast_possible_truncation)]
        let padding = (content_length.wrapping_neg() & 7) as u8;
        self.padding_length = padding;
    }

    /// Returns the number of body bytes (payload and padding) following
    /// this header on the wire.
    #[inline]
    #[must_use]
    pub fn body_len(self) -> usize {
        usize::from(self.content_length) + usize::from(self.padding_length)
    }

    /// Tests whether this [`RecordHeader`] represents a management record.
    #[inline]
    #[must_use]
    pub fn is_management(self) -> bool {
        self.rtype.is_management() && self.request_id == FCGI_NULL_REQUEST_ID
    }

    /// Returns a slice of `self.padding_length` zero bytes to be used as padding.
    #[inline]
    #[must_use]
    pub fn padding_bytes(self) -> &'static [u8] {
        static PADDING: [u8; u8::MAX as usize] = [0; u8::MAX as usize];
        &PADDING[..self.padding_length.into()]
    }

    /// Parses the input bytes into a FastCGI [`RecordHeader`].
    ///
    /// # Errors
    /// Returns an error if the version or the record type is unknown. The
    /// version is checked first.
    pub fn from_bytes(data: [u8; Self::LEN]) -> Result<Self, Error> {
        Ok(Self {
            version: Version::try_from(data[0])?,
            rtype: RecordType::try_from(data[1])?,
            request_id: u16::from_be_bytes([data[2], data[3]]),
            content_length: u16::from_be_bytes([data[4], data[5]]),
            padding_length: data[6],
        })
    }

    /// Encodes the [`RecordHeader`] into its binary wire format.
    #[inline]
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut buf = [0; Self::LEN];
        buf[0] = self.version.into();
        buf[1] = self.rtype.into();
        buf[2..4].copy_from_slice(&self.request_id.to_be_bytes());
        buf[4..6].copy_from_slice(&self.content_length.to_be_bytes());
        buf[6] = self.padding_length;
        buf
    }
}


#[cfg(test)]
mod tests {
    use std::iter::repeat_with;
    use strum::IntoEnumIterator;
    use super::*;

    #[test]
    fn header_roundtrip() -> Result<(), Error> {
        for rtype in RecordType::iter() {
            let orig = RecordHeader {
                version: Version::V1, rtype, request_id: fastrand::u16(..),
                content_length: fastrand::u16(..), padding_length: fastrand::u8(..),
            };
            let rt = RecordHeader::from_bytes(orig.to_bytes())?;
            assert_eq!(orig, rt);
        }
        Ok(())
    }

    #[test]
    fn header_spec() -> Result<(), Error> {
        const STDOUT: [u8; 8] = [0x01, 0x06, 0x00, 0x2a, 0x01, 0x03, 0x05, 0x00];
        let head = RecordHeader::from_bytes(STDOUT)?;
        assert_eq!(head.version, Version::V1);
        assert_eq!(head.rtype, RecordType::Stdout);
        assert_eq!(head.request_id, 42);
        assert_eq!(head.content_length, 259);
        assert_eq!(head.padding_length, 5);
        assert_eq!(head.body_len(), 264);
        assert_eq!(head.to_bytes(), STDOUT);
        Ok(())
    }

    #[test]
    fn header_invalid() {
        const BAD_VERSION: [u8; 8] = [0x02, 0x7a, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        let bad_version = RecordHeader::from_bytes(BAD_VERSION);
        assert!(matches!(bad_version, Err(Error::UnknownVersion(2))));

        const BAD_RTYPE: [u8; 8] = [0x01, 0x7a, 0xdb, 0x58, 0x1b, 0x4b, 0x87, 0x6b];
        let bad_rtype = RecordHeader::from_bytes(BAD_RTYPE);
        assert!(matches!(bad_rtype, Err(Error::UnknownRecordType(0x7a))));
    }

    #[test]
    fn is_mgmt() {
        let mut head = RecordHeader::new(RecordType::GetValuesResult, FCGI_NULL_REQUEST_ID);
        assert!(head.is_management());
        head.request_id = fastrand::u16(1..);
        assert!(!head.is_management());

        let head = RecordHeader::new(RecordType::EndRequest, FCGI_NULL_REQUEST_ID);
        assert!(!head.is_management());
    }

    #[test]
    fn padding() {
        for len in [0u16, 1, 7, 8, 9, 255, 65528, u16::MAX] {
            let mut head = RecordHeader::new(RecordType::Stdin, 1);
            head.set_lengths(len);
            assert!(head.padding_length < 8);
            assert_eq!(head.body_len() % 8, 0, "record body of {len} bytes is not 8-byte aligned");
            assert!(head.padding_bytes().iter().all(|&b| b == 0));
        }

        for len in repeat_with(|| fastrand::u16(..)).take(50) {
            let mut head = RecordHeader::new(RecordType::Params, 6893);
            head.set_lengths(len);
            assert_eq!(usize::from(head.padding_length), (8 - usize::from(len) % 8) % 8);
        }
    }
}

use super::Error as ProtocolError;
use super::{ProtocolStatus, RecordHeader, RecordType, RequestFlags, Role};


/// The length of every fixed-size record body.
pub const LEN: usize = 8;

/// The length of a complete record carrying a fixed-size body.
pub const RECORD_LEN: usize = RecordHeader::LEN + LEN;

/// Extracts a fixed-size body from the content of a record of type `rtype`.
fn fixed(rtype: RecordType, content: &[u8]) -> Result<[u8; LEN], ProtocolError> {
    content.try_into().map_err(|_| ProtocolError::InvalidBodyLength { rtype, len: content.len() })
}

/// Prepends a record header to a fixed-size body.
fn frame(rtype: RecordType, request_id: u16, body: [u8; LEN]) -> [u8; RECORD_LEN] {
    let mut head = RecordHeader::new(rtype, request_id);
    #[allow(clippy::cast_possible_truncation)]
    head.set_lengths(LEN as u16);
    let mut buf = [0; RECORD_LEN];
    buf[..RecordHeader::LEN].copy_from_slice(&head.to_bytes());
    buf[RecordHeader::LEN..].copy_from_slice(&body);
    buf
}


/// The body of a [`RecordType::Unknown`] FastCGI record.
///
/// A responder sends this to report a record type it does not understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownType {
    /// The type of the unknown record.
    pub rtype: u8,
}

impl UnknownType {
    /// Parses the content of a [`RecordType::Unknown`] record.
    ///
    /// # Errors
    /// Returns an error if `content` is not exactly 8 bytes long.
    pub fn from_slice(content: &[u8]) -> Result<Self, ProtocolError> {
        let data = fixed(RecordType::Unknown, content)?;
        Ok(Self { rtype: data[0] })
    }

    /// Encodes the [`UnknownType`] record body into its binary wire format.
    #[inline]
    #[must_use]
    pub fn to_bytes(self) -> [u8; LEN] {
        let mut buf = [0; LEN];
        buf[0] = self.rtype;
        buf
    }
}


/// The body of a [`RecordType::BeginRequest`] FastCGI record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequest {
    /// The role of the FastCGI application in this request.
    pub role: Role,
    /// The control flags for this request.
    pub flags: RequestFlags,
}

impl BeginRequest {
    /// The body sent by this crate: a [`Role::Responder`] request on a
    /// connection that stays open afterwards.
    pub const RESPONDER: Self = Self { role: Role::Responder, flags: RequestFlags::KeepConn };

    /// Parses the content of a [`RecordType::BeginRequest`] record.
    ///
    /// # Errors
    /// Returns an error if `content` is not exactly 8 bytes long, or if the
    /// role or flags are unknown.
    pub fn from_slice(content: &[u8]) -> Result<Self, ProtocolError> {
        let data = fixed(RecordType::BeginRequest, content)?;
        Ok(Self {
            role: Role::try_from(u16::from_be_bytes([data[0], data[1]]))?,
            flags: RequestFlags::try_from(data[2])?,
        })
    }

    /// Encodes the [`BeginRequest`] record body into its binary wire format.
    #[must_use]
    pub fn to_bytes(self) -> [u8; LEN] {
        let mut buf = [0; LEN];
        buf[..2].copy_from_slice(&u16::to_be_bytes(self.role.into()));
        buf[2] = self.flags.into();
        buf
    }

    /// Encodes a complete [`RecordType::BeginRequest`] record.
    #[inline]
    #[must_use]
    pub fn to_record(self, request_id: u16) -> [u8; RECORD_LEN] {
        frame(RecordType::BeginRequest, request_id, self.to_bytes())
    }
}


/// The body of a [`RecordType::EndRequest`] FastCGI record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRequest {
    /// The application's response status code, as would be set via exit(3)
    /// in regular CGI.
    pub app_status: u32,
    /// The protocol status code for this response.
    pub protocol_status: ProtocolStatus,
}

impl EndRequest {
    /// Parses the content of a [`RecordType::EndRequest`] record.
    ///
    /// # Errors
    /// Returns an error if `content` is not exactly 8 bytes long, or if the
    /// protocol status is unknown.
    pub fn from_slice(content: &[u8]) -> Result<Self, ProtocolError> {
        let data = fixed(RecordType::EndRequest, content)?;
        Ok(Self {
            app_status: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            protocol_status: ProtocolStatus::try_from(data[4])?,
        })
    }

    /// Encodes the [`EndRequest`] record body into its binary wire format.
    #[must_use]
    pub fn to_bytes(self) -> [u8; LEN] {
        let mut buf = [0; LEN];
        buf[..4].copy_from_slice(&u32::to_be_bytes(self.app_status));
        buf[4] = self.protocol_status.into();
        buf
    }

    /// Encodes a complete [`RecordType::EndRequest`] record.
    #[inline]
    #[must_use]
    pub fn to_record(self, request_id: u16) -> [u8; RECORD_LEN] {
        frame(RecordType::EndRequest, request_id, self.to_bytes())
    }
}

use std::fmt;

use super::Error as ProtocolError;


/// Implements the conversions between a wire-level enum and its integer
/// representation. Parsing fails with the given [`ProtocolError`] variant.
macro_rules! wire_enum {
    ($name:ident: $repr:ty => $err:ident) => {
        impl TryFrom<$repr> for $name {
            type Error = ProtocolError;

            #[doc = concat!("Parses a [`", stringify!($repr), "`] as a FastCGI [`", stringify!($name), "`].")]
            ///
            /// # Errors
            /// Returns an error if the value is not defined by FastCGI.
            #[inline]
            fn try_from(v: $repr) -> Result<Self, Self::Error> {
                Self::from_repr(v.into()).ok_or(ProtocolError::$err(v))
            }
        }

        impl From<$name> for $repr {
            #[inline]
            fn from(v: $name) -> Self {
                v as Self
            }
        }
    };
}


/// A validated FastCGI version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
pub enum Version {
    /// FastCGI Version 1
    V1 = 1,
}
wire_enum!(Version: u8 => UnknownVersion);


/// A validated FastCGI role identifier.
///
/// This crate only ever sends [`Role::Responder`] requests. The other roles
/// exist so that foreign `BeginRequest` bodies can be decoded.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
#[cfg_attr(test, derive(strum::EnumIter))]
pub enum Role {
    Responder = 1,
    Authorizer = 2,
    Filter = 3,
}
wire_enum!(Role: u16 => UnknownRole);


bitflags::bitflags! {
    /// A validated set of FastCGI request flags.
    #[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestFlags: u8 {
        /// Keep the connection open after processing this request.
        const KeepConn = 1;
    }
}

impl TryFrom<u8> for RequestFlags {
    type Error = ProtocolError;

    /// Parses a [`u8`] as a FastCGI [`RequestFlags`] set.
    ///
    /// # Errors
    /// Returns an error if the [`u8`] contains undefined flag bits.
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::from_bits(v).ok_or(ProtocolError::UnknownFlags(v & !Self::all().bits()))
    }
}

impl From<RequestFlags> for u8 {
    #[inline]
    fn from(v: RequestFlags) -> Self {
        v.bits()
    }
}

impl fmt::Debug for RequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RequestFlags({:#03b})", self.bits())
    }
}


/// A validated FastCGI response protocol status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
#[cfg_attr(test, derive(strum::EnumIter))]
pub enum ProtocolStatus {
    /// The request completed successfully.
    RequestComplete = 0,
    /// The responder refused a second, multiplexed request on this connection.
    CantMpxConn = 1,
    /// The responder is already handling its maximum number of requests.
    Overloaded = 2,
    /// The responder does not implement the requested role.
    UnknownRole = 3,
}
wire_enum!(ProtocolStatus: u8 => UnknownStatus);

impl ProtocolStatus {
    /// Tests whether the responder actually processed the request.
    #[inline]
    #[must_use]
    pub fn is_complete(self) -> bool {
        self == Self::RequestComplete
    }
}


/// A validated FastCGI record type.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
#[cfg_attr(test, derive(strum::EnumIter))]
pub enum RecordType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    Unknown = 11,
}
wire_enum!(RecordType: u8 => UnknownRecordType);

impl RecordType {
    /// Tests whether this [`RecordType`] represents a management record.
    #[inline]
    #[must_use]
    pub fn is_management(self) -> bool {
        use RecordType::*;
        matches!(self, GetValues | GetValuesResult | Unknown)
    }

    /// Tests whether this [`RecordType`] represents a stream record.
    ///
    /// Streams are terminated by an empty record of the same type.
    #[inline]
    #[must_use]
    pub fn is_stream(self) -> bool {
        use RecordType::*;
        matches!(self, Params | Stdin | Stdout | Stderr | Data)
    }

    /// Tests whether a responder sends records of this type back to
    /// the client for a specific request.
    #[inline]
    #[must_use]
    pub fn is_response(self) -> bool {
        use RecordType::*;
        matches!(self, Stdout | Stderr | EndRequest)
    }
}


#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;
    use super::*;

    #[test]
    fn no_reqflag_overlap() {
        let mut seen = RequestFlags::empty();
        for f in RequestFlags::all() {
            assert!(!seen.intersects(f), "{f:?} overlaps with {seen:?}");
            seen.insert(f);
        }
    }

    #[test]
    fn reqflag_unknown() {
        assert_eq!(RequestFlags::try_from(1).ok(), Some(RequestFlags::KeepConn));
        assert!(matches!(RequestFlags::try_from(0b101), Err(ProtocolError::UnknownFlags(0b100))));
    }

    #[test]
    fn wire_values() {
        for rtype in RecordType::iter() {
            let raw = u8::from(rtype);
            assert!((1..=11).contains(&raw));
            assert_eq!(RecordType::try_from(raw).ok(), Some(rtype));
        }
        assert!(matches!(RecordType::try_from(0), Err(ProtocolError::UnknownRecordType(0))));

        for role in Role::iter() {
            assert_eq!(Role::try_from(u16::from(role)).ok(), Some(role));
        }
        assert_eq!(u16::from(Role::Responder), 1);

        for status in ProtocolStatus::iter() {
            assert_eq!(ProtocolStatus::try_from(u8::from(status)).ok(), Some(status));
            assert_eq!(status.is_complete(), status == ProtocolStatus::RequestComplete);
        }
        assert!(matches!(ProtocolStatus::try_from(9), Err(ProtocolError::UnknownStatus(9))));
    }

    #[test]
    fn classification() {
        use RecordType::*;
        let streams: Vec<_> = RecordType::iter().filter(|r| r.is_stream()).collect();
        assert_eq!(streams, [Params, Stdin, Stdout, Stderr, Data]);
        let responses: Vec<_> = RecordType::iter().filter(|r| r.is_response()).collect();
        assert_eq!(responses, [EndRequest, Stdout, Stderr]);
    }
}

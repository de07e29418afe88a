use std::fmt;

use super::Error as ProtocolError;


/// A length prefix of a FastCGI name-value pair, variably encoded in
/// either 1 or 4 bytes.
///
/// Values up to 127 use a single byte. Larger values use 4 big-endian bytes
/// with the topmost bit set, which limits them to 31 bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VarInt(u32);

impl VarInt {
    /// The bit indicating whether the 4-byte encoding is used.
    const LONG_BIT: u32 = 1 << 31;
    /// The largest value using the 1-byte encoding.
    const SHORT_MAX: u32 = 127;
    /// The maximum value a [`VarInt`] can encode.
    pub const MAX: Self = VarInt(Self::LONG_BIT - 1);

    /// Returns the number of bytes in the encoding of this [`VarInt`].
    #[inline]
    #[must_use]
    pub fn encoded_len(self) -> usize {
        if self.0 <= Self::SHORT_MAX { 1 } else { 4 }
    }

    /// Decodes a [`VarInt`] from the start of `data`.
    ///
    /// Returns the value together with the number of bytes it occupied, or
    /// [`None`] if `data` ends before the encoding is complete.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<(Self, usize)> {
        let first = *data.first()?;
        if u32::from(first) <= Self::SHORT_MAX {
            return Some((Self(first.into()), 1));
        }
        let long: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Some((Self(u32::from_be_bytes(long) & !Self::LONG_BIT), 4))
    }

    /// Appends the encoding of this [`VarInt`] to `out`.
    ///
    /// Returns the number of bytes written.
    pub fn encode(self, out: &mut Vec<u8>) -> usize {
        if self.0 <= Self::SHORT_MAX {
            #[allow(clippy::cast_possible_truncation)]
            out.push(self.0 as u8);
            1
        } else {
            out.extend_from_slice(&(self.0 | Self::LONG_BIT).to_be_bytes());
            4
        }
    }

    /// Converts the [`VarInt`] into a [`usize`], saturating at [`usize::MAX`].
    #[inline]
    #[must_use]
    pub fn to_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl From<VarInt> for u32 {
    #[inline]
    fn from(v: VarInt) -> Self {
        v.0
    }
}

impl From<u8> for VarInt {
    #[inline]
    fn from(v: u8) -> Self {
        Self(v.into())
    }
}

impl From<u16> for VarInt {
    #[inline]
    fn from(v: u16) -> Self {
        Self(v.into())
    }
}

impl TryFrom<u32> for VarInt {
    type Error = ProtocolError;

    /// Converts a [`u32`] into a [`VarInt`], unless it needs more than 31 bits.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidVarInt`] for values above [`VarInt::MAX`].
    #[inline]
    fn try_from(v: u32) -> Result<Self, Self::Error> {
        if v & Self::LONG_BIT == 0 { Ok(Self(v)) } else { Err(ProtocolError::InvalidVarInt) }
    }
}

impl TryFrom<usize> for VarInt {
    type Error = ProtocolError;

    /// Converts a length into a [`VarInt`], unless it needs more than 31 bits.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidVarInt`] for values above [`VarInt::MAX`].
    #[inline]
    fn try_from(v: usize) -> Result<Self, Self::Error> {
        u32::try_from(v).map_err(|_| ProtocolError::InvalidVarInt)?.try_into()
    }
}

impl fmt::Display for VarInt {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}


#[cfg(test)]
mod tests {
    use std::iter::repeat_with;
    use super::*;

    #[test]
    fn convert() {
        assert!(matches!(VarInt::try_from(378u32), Ok(VarInt(378))));
        assert!(matches!(VarInt::try_from(45828usize), Ok(VarInt(45828))));
        assert!(matches!(VarInt::try_from(u32::MAX), Err(ProtocolError::InvalidVarInt)));
        assert!(matches!(VarInt::try_from(1usize << 31), Err(ProtocolError::InvalidVarInt)));
        assert_eq!(VarInt::try_from(VarInt::MAX.0).ok(), Some(VarInt::MAX));
    }

    #[test]
    fn roundtrip() {
        let rand_v = repeat_with(|| fastrand::u32(..=VarInt::MAX.0)).take(200);
        let edges = [0, 1, 62, 126, 127, 128, 178, 251, 6819, VarInt::MAX.0];
        let mut buf = Vec::with_capacity(4);
        for v in rand_v.chain(edges) {
            let orig = VarInt(v);
            buf.clear();
            let len = orig.encode(&mut buf);
            assert_eq!(len, buf.len());
            assert_eq!(len, orig.encoded_len());
            assert_eq!(len, if v <= 127 { 1 } else { 4 }, "wrong encoding width for {v}");
            if len == 4 {
                assert_ne!(buf[0] & 0x80, 0, "long encoding of {v} lacks the marker bit");
            }
            assert_eq!(VarInt::decode(&buf), Some((orig, len)));
        }
    }

    #[test]
    fn parse_spec() {
        const SHORT: &[u8] = &[96, 0xff];
        const LONG: &[u8] = &[0x80 | 0x11, 0xda, 0xef, 0x31, 0x00];
        assert_eq!(VarInt::decode(SHORT), Some((VarInt(96), 1)));
        assert_eq!(VarInt::decode(LONG), Some((VarInt(0x11da_ef31), 4)));
        assert_eq!(VarInt::decode(&[0x80, 0, 0, 0x80]), Some((VarInt(128), 4)));
    }

    #[test]
    fn parse_truncated() {
        const LONG: &[u8] = &[0x80 | 0x11, 0xda, 0xef, 0x31];
        for len in 0..4 {
            assert_eq!(VarInt::decode(&LONG[..len]), None, "decoded {:?}", &LONG[..len]);
        }
    }
}

use super::varint::VarInt;
use super::Error as ProtocolError;


/// An iterator decoding complete name-value pairs from a PARAMS payload.
///
/// Iteration stops at the first pair that is truncated. The undecoded
/// remainder is available through [`NVIter::remainder`].
#[derive(Debug, Clone)]
pub struct NVIter<'a> {
    data: &'a [u8],
}

impl<'a> NVIter<'a> {
    /// Creates a new [`NVIter`] over the referenced input bytes.
    #[inline]
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Returns the input bytes not yet decoded.
    #[inline]
    #[must_use]
    pub fn remainder(&self) -> &'a [u8] {
        self.data
    }

    fn decode(data: &'a [u8]) -> Option<((&'a [u8], &'a [u8]), &'a [u8])> {
        let (name_len, a) = VarInt::decode(data)?;
        let (value_len, b) = VarInt::decode(&data[a..])?;
        let pair = &data[a + b..];
        let (name_len, value_len) = (name_len.to_usize(), value_len.to_usize());
        let total = name_len.checked_add(value_len).filter(|&t| t <= pair.len())?;
        Some(((&pair[..name_len], &pair[name_len..total]), &pair[total..]))
    }
}

impl<'a> Iterator for NVIter<'a> {
    /// The name-value pair returned by the iterator.
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (pair, rest) = Self::decode(self.data)?;
        self.data = rest;
        Some(pair)
    }
}

impl std::iter::FusedIterator for NVIter<'_> {}


/// Returns the number of bytes [`write`] produces for a name-value pair.
///
/// # Errors
/// Returns [`ProtocolError::InvalidVarInt`] if the name or value is too long.
pub fn encoded_len(name: &[u8], value: &[u8]) -> Result<usize, ProtocolError> {
    let prefix = VarInt::try_from(name.len())?.encoded_len() + VarInt::try_from(value.len())?.encoded_len();
    Ok(prefix + name.len() + value.len())
}

/// Appends an encoded name-value pair to `out`.
///
/// Returns the number of bytes appended. Nothing is appended on error.
///
/// # Errors
/// Returns [`ProtocolError::InvalidVarInt`] if the name or value is too long.
pub fn write(name: &[u8], value: &[u8], out: &mut Vec<u8>) -> Result<usize, ProtocolError> {
    let name_len = VarInt::try_from(name.len())?;
    let value_len = VarInt::try_from(value.len())?;
    let start = out.len();
    out.reserve(name_len.encoded_len() + value_len.encoded_len() + name.len() + value.len());
    name_len.encode(out);
    value_len.encode(out);
    out.extend_from_slice(name);
    out.extend_from_slice(value);
    Ok(out.len() - start)
}

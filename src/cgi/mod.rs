use std::fmt;

use compact_str::CompactString;

use crate::protocol::{self, nv};

mod names;
mod response;
mod split;

pub use names::StaticVarName;
pub use StaticVarName::*;
pub use response::parse_header_line;
#[cfg(feature = "http")]
pub use response::{header_map, parse_status};
pub use split::{split, split_with_capacity, BodyWriter, HeaderScanner, DEFAULT_CAPACITY};


/// The CGI/1.1 environment of a FastCGI request, sent as its PARAMS stream.
///
/// Variables keep their insertion order. CGI/1.1 variable names are
/// case-insensitive (RFC 3875, Section 4.1), so inserting a name that only
/// differs in case from an existing one replaces its value. The spelling of
/// the first insertion is kept.
///
/// Names and values are stored in [`CompactString`]s, which keeps most
/// variable names inline without a heap allocation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Params {
    vars: Vec<(CompactString, CompactString)>,
}

impl Params {
    /// Creates an empty environment.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Sets a variable, returning its previous value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<CompactString>) -> Option<CompactString> {
        let name = name.as_ref();
        let value = value.into();
        match self.position(name) {
            Some(idx) => Some(std::mem::replace(&mut self.vars[idx].1, value)),
            None => {
                self.vars.push((name.into(), value));
                None
            },
        }
    }

    /// Sets a variable and returns `self`, for building an environment in
    /// one expression.
    #[inline]
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<CompactString>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the value of a variable.
    #[must_use]
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.position(name.as_ref()).map(|idx| self.vars[idx].1.as_str())
    }

    /// Removes a variable, returning its value.
    pub fn remove(&mut self, name: impl AsRef<str>) -> Option<CompactString> {
        self.position(name.as_ref()).map(|idx| self.vars.remove(idx).1)
    }

    /// Tests whether a variable is set.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.position(name.as_ref()).is_some()
    }

    /// Returns an iterator over all variables in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &str)> + '_ {
        self.vars.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Encodes all variables as FastCGI name-value pairs.
    ///
    /// The result is the unframed content of the PARAMS stream.
    ///
    /// # Errors
    /// Returns [`protocol::Error::InvalidVarInt`] if a name or value exceeds
    /// the maximum FastCGI length.
    pub fn encode(&self) -> Result<Vec<u8>, protocol::Error> {
        let mut len = 0;
        for (n, v) in &self.vars {
            len += nv::encoded_len(n.as_bytes(), v.as_bytes())?;
        }
        let mut out = Vec::with_capacity(len);
        for (n, v) in &self.vars {
            nv::write(n.as_bytes(), v.as_bytes(), &mut out)?;
        }
        Ok(out)
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<N: AsRef<str>, V: Into<CompactString>> Extend<(N, V)> for Params {
    fn extend<T: IntoIterator<Item = (N, V)>>(&mut self, iter: T) {
        for (n, v) in iter {
            self.insert(n, v);
        }
    }
}

impl<N: AsRef<str>, V: Into<CompactString>> FromIterator<(N, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        params.extend(iter);
        params
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        let mut params = Params::new().with(REQUEST_METHOD, "GET").with("query_string", "a=b");
        assert_eq!(params.get("request_method"), Some("GET"));
        assert_eq!(params.get(QUERY_STRING), Some("a=b"));

        let old = params.insert("Query_String", "x=1");
        assert_eq!(old.as_deref(), Some("a=b"));
        assert_eq!(params.len(), 2);
        assert_eq!(params.iter().collect::<Vec<_>>(), [("REQUEST_METHOD", "GET"), ("query_string", "x=1")]);

        assert_eq!(params.remove(REQUEST_METHOD).as_deref(), Some("GET"));
        assert!(!params.contains("REQUEST_METHOD"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn encode_pairs() -> Result<(), protocol::Error> {
        let params: Params = [(SCRIPT_FILENAME, "/srv/index.php"), (QUERY_STRING, "")].into_iter().collect();
        let wire = params.encode()?;

        let decoded: Vec<_> = nv::NVIter::new(&wire).collect();
        assert_eq!(decoded, [(&b"SCRIPT_FILENAME"[..], &b"/srv/index.php"[..]), (&b"QUERY_STRING"[..], &b""[..])]);
        assert!(Params::new().encode()?.is_empty());
        Ok(())
    }
}

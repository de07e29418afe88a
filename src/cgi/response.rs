/// Splits a CGI/1.1 response header line into its name and value.
///
/// Surrounding whitespace is trimmed from both parts. Returns [`None`] for
/// lines without a colon or with an empty name.
#[must_use]
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name, value.trim()))
}


/// Parses the value of a CGI/1.1 `Status` header, such as `404 Not Found`.
///
/// Only the numeric code is considered, the reason phrase is ignored.
#[cfg(feature = "http")]
#[must_use]
pub fn parse_status(value: &str) -> Option<http::StatusCode> {
    let code = value.trim_start().split(' ').next()?;
    http::StatusCode::from_bytes(code.as_bytes()).ok()
}

/// Converts CGI/1.1 response headers into an [`http::HeaderMap`].
///
/// The `Status` header is removed from the map and returned separately.
/// Pairs that are not valid HTTP headers are skipped.
#[cfg(feature = "http")]
pub fn header_map<'a, I>(headers: I) -> (Option<http::StatusCode>, http::HeaderMap)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    use http::header::{HeaderName, HeaderValue};

    let mut status = None;
    let mut map = http::HeaderMap::new();
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("status") {
            status = parse_status(value);
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(n), Ok(v)) => { map.append(n, v); },
            _ => tracing::debug!(name, "skipped invalid CGI response header"),
        }
    }
    (status, map)
}

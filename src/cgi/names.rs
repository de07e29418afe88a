use std::fmt;


/// Well-known CGI/1.1 variable names a FastCGI client commonly sends.
///
/// The variants are exported as constants from the [`cgi`](crate::cgi)
/// module and can be used anywhere [`Params`](super::Params) takes a name.
/// HTTP request headers are passed as `HTTP_*` variables, with the header
/// name uppercased and `-` replaced by `_`.
#[allow(missing_docs, non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr, strum::EnumString)]
#[cfg_attr(test, derive(strum::EnumIter))]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum StaticVarName {
    // RFC 3875, Section 4.1
    AUTH_TYPE,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    GATEWAY_INTERFACE,
    PATH_INFO,
    PATH_TRANSLATED,
    QUERY_STRING,
    REMOTE_ADDR,
    REMOTE_HOST,
    REMOTE_IDENT,
    REMOTE_USER,
    REQUEST_METHOD,
    SCRIPT_NAME,
    SERVER_NAME,
    SERVER_PORT,
    SERVER_PROTOCOL,
    SERVER_SOFTWARE,

    // Expected by PHP-FPM and friends, see nginx/conf/fastcgi_params
    SCRIPT_FILENAME,
    REQUEST_URI,
    DOCUMENT_URI,
    DOCUMENT_ROOT,
    REQUEST_SCHEME,
    REMOTE_PORT,
    SERVER_ADDR,
    REDIRECT_STATUS,
    HTTPS,

    // Frequently forwarded request headers
    HTTP_ACCEPT,
    HTTP_ACCEPT_ENCODING,
    HTTP_ACCEPT_LANGUAGE,
    HTTP_AUTHORIZATION,
    HTTP_COOKIE,
    HTTP_HOST,
    HTTP_REFERER,
    HTTP_USER_AGENT,
    HTTP_X_FORWARDED_FOR,
    HTTP_X_FORWARDED_PROTO,
    HTTP_X_REQUEST_ID,
}

impl AsRef<str> for StaticVarName {
    #[inline]
    fn as_ref(&self) -> &str {
        self.into()
    }
}

impl fmt::Debug for StaticVarName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self.as_ref(), f)
    }
}

impl fmt::Display for StaticVarName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self.as_ref(), f)
    }
}

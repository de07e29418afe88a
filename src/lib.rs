//! A client for the FastCGI protocol that multiplexes concurrent requests
//! over a single connection to a responder such as PHP-FPM.
//!
//! [`Client`] writes requests, its [`Driver`] reads the responses and routes
//! them back to the waiting callers. [`cgi::split`] separates a response's
//! CGI headers from its body while streaming the body to a destination.
//!
//! The core is runtime-agnostic and works with any
//! [`futures_util::io::AsyncRead`] and [`futures_util::io::AsyncWrite`]
//! halves. The `rt` feature (enabled by default) adds [`Client::connect`] for
//! Tokio, as well as request timeouts.

// TODO(docs): #![deny(missing_docs)]
#![deny(unsafe_code, single_use_lifetimes, unused_lifetimes)]
#![warn(keyword_idents, let_underscore_drop, unreachable_pub, unused_import_braces)]

#![deny(clippy::suspicious, clippy::cargo)]
#![deny(clippy::exit, clippy::semicolon_inside_block, clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::multiple_crate_versions)]
#![allow(clippy::enum_glob_use, clippy::items_after_statements)]


pub(crate) mod macros;
mod signal;

// See: https://fastcgi-archives.github.io/FastCGI_Specification.html
pub mod protocol;

/// Helpers for CGI/1.1 request environments and responses.
pub mod cgi;

mod client;
mod config;
mod error;

#[cfg(feature = "rt")]
pub use client::BoxedClient;
pub use client::{Client, Driver, Response};
pub use config::{Config, ParseTargetError, Target};
pub use error::Error;

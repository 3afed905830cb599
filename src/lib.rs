//! Embeddable HTTP/1 front-end core for a management agent.
//!
//! This crate owns the part of an HTTP server that is hard to get right:
//! TLS-vs-plaintext detection on accept, strictly bounded request-line and
//! header parsing, keep-alive-style connection reuse driven by the
//! *response* side rather than by this crate, and a two-stage handler
//! dispatch chain. Response framing, TLS handshakes, and concrete resource
//! producers (static files, templates, ...) are deliberately left to the
//! host application.
#![recursion_limit = "100"]

extern crate futures;
extern crate httparse;
extern crate tokio_core;
extern crate tokio_io;
#[macro_use(quick_error)]
extern crate quick_error;
#[macro_use]
extern crate log;
#[macro_use]
extern crate matches;
extern crate url;
extern crate sha1;
extern crate serde_json;
#[cfg(unix)]
extern crate libc;

pub mod server;
mod enums;
mod headers;
mod cookie;
mod accept;
mod websocket;
#[cfg(unix)]
mod ancillary;
mod tls;

pub use enums::{Version, Method, Status};
pub use headers::HeaderMap;
pub use cookie::parse_cookie;
pub use accept::parse_accept_list;
pub use websocket::WebsocketAccept;
#[cfg(unix)]
pub use ancillary::{peek_with_ancillary, FirstByte};
pub use tls::{TlsAcceptor, Certificate};
pub use server::{
    Server, ServerConfig, Flags,
    ListenerSet, ClientStream,
    StreamHandler, ResourceHandler, StreamHandled,
    ResponseGateway, Done,
    Peer, Transport,
    Error,
};

//! The embeddable HTTP/1 front-end: listeners, the per-connection state
//! machine, request parsing and policy, and handler dispatch.

mod connection;
mod dispatch;
mod error;
mod facade;
mod gateway;
mod listener;
mod parser;
mod redirect;
mod simple_error_page;

pub use self::connection::{ConnectionFSM, Peer, Transport};
pub use self::dispatch::{DispatchCore, Dispatched, ResourceHandler, StreamHandled, StreamHandler};
pub use self::error::Error;
pub use self::facade::{Flags, RunningServer, Server, ServerConfig};
pub use self::gateway::{Done, ResponseGateway};
pub use self::listener::{ClientStream, ListenerSet};
pub use self::parser::{ParseResult, ParsedRequest, RequestParser};
pub use self::redirect::RedirectPolicy;

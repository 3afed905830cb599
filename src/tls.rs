//! The TLS boundary.
//!
//! This crate detects whether an accepted connection is TLS or plaintext
//! (by peeking the first byte — see `ancillary::peek_with_ancillary` and
//! `ConnectionFSM`) and, for TLS connections, hands the raw stream off to a
//! caller-supplied acceptor. Certificate loading, the handshake itself, and
//! cipher/protocol-version choice are all somebody else's problem: the host
//! application picks a TLS library (`native-tls`, `rustls`, ...) and wires
//! it in through this trait.
//!
//! `Certificate` is an opaque handle this crate threads through
//! `ServerConfig` without ever looking inside it.

use std::fmt;
use std::io;

use tokio_core::net::TcpStream;
use futures::Future;

/// An opaque reference to a loaded certificate (and its private key).
///
/// This crate never inspects the contents; it exists so `ServerConfig` has
/// something concrete to hold and pass to a `TlsAcceptor` without pulling in
/// any particular TLS crate's certificate type.
pub struct Certificate(Box<fmt::Debug + Send>);

impl Certificate {
    /// Wrap a certificate handle produced by the host application's TLS
    /// library of choice.
    pub fn new<T: fmt::Debug + Send + 'static>(inner: T) -> Certificate {
        Certificate(Box::new(inner))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Certificate({:?})", self.0)
    }
}

/// A future yielding a wrapped, handshake-complete TLS stream.
///
/// `Io` is whatever concrete stream type the acceptor produces (e.g. a
/// `native_tls::TlsStream<TcpStream>` wrapped in a tokio adapter); this
/// crate only needs it to implement `tokio_io::AsyncRead + AsyncWrite`.
pub type AcceptFuture<Io> = Box<Future<Item = Io, Error = io::Error>>;

/// Host-supplied TLS handshake provider.
///
/// Implementations wrap a concrete TLS library's acceptor (for example
/// `tokio-tls`'s `TlsAcceptor` or `tokio-rustls`'s `TlsAcceptor`). This
/// crate calls `accept` exactly once per connection that peeked as TLS
/// (first byte `0x16`, the TLS handshake record type), after having
/// already consumed nothing from the stream.
pub trait TlsAcceptor: Send + 'static {
    /// The wrapped stream type produced once the handshake completes.
    type Io: ::tokio_io::AsyncRead + ::tokio_io::AsyncWrite + 'static;

    /// Begin a TLS handshake over `stream` using `cert`.
    fn accept(&self, stream: TcpStream, cert: &Certificate) -> AcceptFuture<Self::Io>;
}

use std::io;

quick_error! {
    /// Errors that can terminate a connection's event-loop future.
    ///
    /// Most of the error handling this crate does (malformed requests,
    /// disallowed methods, oversized buffers, ...) is modelled as data
    /// (`ParseResult`, `delayed_reply`) rather than as this `Error` type --
    /// see spec.md section 7. This type is reserved for the handful of
    /// cases that really are exceptional at the I/O layer.
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
        Tls(err: io::Error) {
            description("TLS handshake error")
            display("TLS handshake error: {}", err)
        }
    }
}

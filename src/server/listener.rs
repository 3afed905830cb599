//! Owns bound sockets and turns accepted streams into first turns.
//!
//! Three origins are supported, mirroring `cockpit_web_server_add_inet_listener`,
//! `cockpit_web_server_add_fd_listener` and the loopback self-connect trick
//! `test-webserver.c` uses to drive the server without a real socket:
//! a bound TCP address, an inherited listening file descriptor (socket
//! activation), and an in-process connected pair for tests and internal
//! RPC.

use std::io;
use std::net::{self, IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;

use futures::Stream;
use tokio_core::net::{TcpListener, TcpStream};
use tokio_core::reactor::Handle;

#[cfg(unix)]
use std::os::unix::io::{FromRawFd, RawFd};

/// The client end of an in-process connected pair, as handed back by
/// `connect_inprocess`. The server end is fed straight into the accept
/// callback, exactly as if it had come off a real listener.
pub type ClientStream = TcpStream;

pub struct ListenerSet {
    handle: Handle,
    listeners: Vec<TcpListener>,
}

impl ListenerSet {
    pub fn new(handle: Handle) -> ListenerSet {
        ListenerSet { handle: handle, listeners: Vec::new() }
    }

    /// Bind an inet listener. `address=None` binds all interfaces;
    /// `port=0` asks the OS for an ephemeral port. Returns the bound port.
    pub fn add_inet(&mut self, address: Option<&str>, port: u16) -> io::Result<u16> {
        let ip = match address {
            Some(a) => a.parse().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "invalid inet address")
            })?,
            None => IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        };
        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(&addr, &self.handle)?;
        let bound_port = listener.local_addr()?.port();
        self.listeners.push(listener);
        Ok(bound_port)
    }

    /// Adopt an already-bound, already-listening file descriptor (for
    /// example one handed down by a process supervisor doing socket
    /// activation).
    #[cfg(unix)]
    pub fn add_fd(&mut self, fd: RawFd) -> io::Result<()> {
        let std_listener = unsafe { net::TcpListener::from_raw_fd(fd) };
        let addr = std_listener.local_addr()?;
        let listener = TcpListener::from_listener(std_listener, &addr, &self.handle)?;
        self.listeners.push(listener);
        Ok(())
    }

    /// Create a connected TCP pair without touching any externally visible
    /// port, and hand the server end to `on_accept` exactly as a real
    /// listener would. Returns the client end for the caller (tests, or
    /// an internal RPC client) to drive.
    ///
    /// Implemented as a loopback self-connect rather than a Unix
    /// socketpair: tokio-core 0.1 has no Unix stream type of its own, and
    /// pulling in `tokio-uds` for this alone would be a stack deviation
    /// nothing else in this crate needs.
    pub fn connect_inprocess<F>(&self, on_accept: F) -> io::Result<ClientStream>
        where F: FnOnce(TcpStream, SocketAddr)
    {
        let std_listener = net::TcpListener::bind("127.0.0.1:0")?;
        let addr = std_listener.local_addr()?;
        let std_client = net::TcpStream::connect(&addr)?;
        let (std_server, peer) = std_listener.accept()?;
        let server = TcpStream::from_stream(std_server, &self.handle)?;
        on_accept(server, peer);
        TcpStream::from_stream(std_client, &self.handle)
    }

    /// Begin accepting on every registered listener. Consumes the set:
    /// before this call, bound sockets exist but nothing is read off them.
    pub fn start<F>(self, on_accept: F)
        where F: Fn(TcpStream, SocketAddr) + 'static
    {
        let on_accept = Rc::new(on_accept);
        for listener in self.listeners {
            let on_accept = on_accept.clone();
            let fut = listener.incoming().for_each(move |(stream, addr)| {
                on_accept(stream, addr);
                Ok(())
            }).map_err(|err| warn!("listener accept loop stopped: {}", err));
            self.handle.spawn(fut);
        }
    }
}

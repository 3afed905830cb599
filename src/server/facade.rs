//! The `Server` facade: construction, listener/handler registration, and
//! lifecycle (`start`/`stop`).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use futures::Future;
use futures::sync::oneshot;
use tokio_core::net::TcpStream;
use tokio_core::reactor::Handle;

use server::connection::{ConnectionConfig, ConnectionFSM, Peer};
use server::dispatch::{DispatchCore, ResourceHandler, StreamHandler};
use server::listener::{ClientStream, ListenerSet};
use tls::{Certificate, TlsAcceptor};

/// Bitset of behavior switches, mirroring `cockpit_web_server_new`'s flags
/// argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// The Server sits behind a TLS-terminating proxy: connections it
    /// sees are plaintext, but the response component should still report
    /// `https` as the externally visible scheme.
    pub const FOR_TLS_PROXY: Flags = Flags(1);
    /// Plaintext connections that are not on a loopback address get
    /// redirected to `https://` (see `RedirectPolicy`).
    pub const REDIRECT_TLS: Flags = Flags(2);

    pub fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ::std::ops::BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Fine-grained, process-wide configuration, built the same way the
/// teacher crate builds its own protocol `Config`: a `&mut self` builder
/// finished off with `done()`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    request_timeout: Duration,
    request_maximum: usize,
    url_root: String,
    ssl_exception_prefix: String,
    flags: Flags,
}

impl ServerConfig {
    /// Defaults mirror `cockpit_webserver_request_timeout` (30s) and
    /// `cockpit_webserver_request_maximum` (8192 bytes).
    pub fn new() -> ServerConfig {
        ServerConfig {
            request_timeout: Duration::from_secs(30),
            request_maximum: 8192,
            url_root: String::new(),
            ssl_exception_prefix: String::new(),
            flags: Flags::NONE,
        }
    }

    pub fn request_timeout(&mut self, secs: u64) -> &mut Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }

    pub fn request_maximum(&mut self, bytes: usize) -> &mut Self {
        self.request_maximum = bytes;
        self
    }

    pub fn url_root(&mut self, root: &str) -> &mut Self {
        self.url_root = ::server::dispatch::canon_url_root(root);
        self
    }

    pub fn ssl_exception_prefix(&mut self, prefix: &str) -> &mut Self {
        self.ssl_exception_prefix = prefix.to_string();
        self
    }

    pub fn flags(&mut self, flags: Flags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn done(&mut self) -> Rc<ServerConfig> {
        Rc::new(self.clone())
    }
}

/// Owns listeners, handler registrations, and every live connection.
pub struct Server<A: TlsAcceptor> {
    handle: Handle,
    config: Rc<ServerConfig>,
    certificate: Option<Rc<Certificate>>,
    acceptor: Option<Rc<A>>,
    dispatch: Rc<RefCell<DispatchCore<Peer<A::Io>>>>,
    listeners: ListenerSet,
    /// Each live connection's kill switch, keyed by a monotonic id.
    /// Dropping (or explicitly firing) all of these tears down every
    /// in-flight connection deterministically; each entry is also removed
    /// by its own connection future on completion, so this only ever holds
    /// the connections actually still live, per spec.md's "Server retains a
    /// weak membership set" invariant (the original keeps the analogous
    /// set by `g_hash_table_remove`-ing a finished request,
    /// `cockpitwebserver.c:644`).
    live: Rc<RefCell<HashMap<u64, oneshot::Sender<()>>>>,
    next_id: Rc<Cell<u64>>,
}

impl<A: TlsAcceptor> Server<A> {
    pub fn new(handle: Handle, config: Rc<ServerConfig>,
               certificate: Option<Certificate>, acceptor: Option<A>) -> Server<A> {
        Server {
            listeners: ListenerSet::new(handle.clone()),
            dispatch: Rc::new(RefCell::new(DispatchCore::new(config.url_root.clone()))),
            handle: handle,
            certificate: certificate.map(Rc::new),
            acceptor: acceptor.map(Rc::new),
            config: config,
            live: Rc::new(RefCell::new(HashMap::new())),
            next_id: Rc::new(Cell::new(0)),
        }
    }

    pub fn add_inet(&mut self, address: Option<&str>, port: u16) -> ::std::io::Result<u16> {
        self.listeners.add_inet(address, port)
    }

    #[cfg(unix)]
    pub fn add_fd(&mut self, fd: ::std::os::unix::io::RawFd) -> ::std::io::Result<()> {
        self.listeners.add_fd(fd)
    }

    pub fn connect_inprocess(&self) -> ::std::io::Result<ClientStream> {
        let config = self.connection_config();
        let handle = self.handle.clone();
        let live = self.live.clone();
        let next_id = self.next_id.clone();
        self.listeners.connect_inprocess(move |stream, addr| {
            spawn_connection(&handle, &live, &next_id, stream, addr, config);
        })
    }

    pub fn on_stream<H: StreamHandler<Peer<A::Io>> + 'static>(&mut self, handler: H) {
        self.dispatch.borrow_mut().on_stream(handler);
    }

    pub fn on_resource<H: ResourceHandler<Peer<A::Io>> + 'static>(&mut self, detail: Option<&str>, handler: H) {
        self.dispatch.borrow_mut().on_resource(detail, handler);
    }

    fn connection_config(&self) -> Rc<ConnectionConfig<A>> {
        Rc::new(ConnectionConfig {
            request_timeout: self.config.request_timeout,
            request_maximum: self.config.request_maximum,
            certificate: self.certificate.clone(),
            acceptor: self.acceptor.clone(),
            redirect_tls: self.config.flags.contains(Flags::REDIRECT_TLS),
            for_tls_proxy: self.config.flags.contains(Flags::FOR_TLS_PROXY),
            ssl_exception_prefix: self.config.ssl_exception_prefix.clone(),
            dispatch: self.dispatch.clone(),
            handle: self.handle.clone(),
        })
    }

    /// Begin accepting on every registered listener. Must be called after
    /// all listeners and handlers are registered; connections accepted
    /// before this call do not exist (there is nothing to accept yet,
    /// since listeners are bound but not polled for readiness until now).
    pub fn start(self) -> RunningServer<A> {
        let config = self.connection_config();
        let handle = self.handle.clone();
        let live = self.live.clone();
        let next_id = self.next_id.clone();
        self.listeners.start(move |stream, addr| {
            spawn_connection(&handle, &live, &next_id, stream, addr, config.clone());
        });
        RunningServer { live: live, marker: ::std::marker::PhantomData }
    }
}

/// A started `Server`; holds the live-connection membership set so
/// dropping it tears everything down.
pub struct RunningServer<A: TlsAcceptor> {
    live: Rc<RefCell<HashMap<u64, oneshot::Sender<()>>>>,
    #[allow(dead_code)]
    marker: ::std::marker::PhantomData<A>,
}

impl<A: TlsAcceptor> RunningServer<A> {
    pub fn stop(self) {
        // dropping `self` drops every kill switch, which is exactly `stop`.
    }
}

fn spawn_connection<A: TlsAcceptor>(handle: &Handle, live: &Rc<RefCell<HashMap<u64, oneshot::Sender<()>>>>,
                                     next_id: &Rc<Cell<u64>>, stream: TcpStream, _peer_addr: SocketAddr,
                                     config: Rc<ConnectionConfig<A>>) {
    let local_addr = match stream.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            debug!("could not read local address of accepted connection: {}", e);
            return;
        }
    };
    let fsm = match ConnectionFSM::new(stream, local_addr, config) {
        Ok(fsm) => fsm,
        Err(e) => {
            debug!("could not arm connection timeout: {}", e);
            return;
        }
    };
    let id = next_id.get();
    next_id.set(id + 1);
    let (kill_tx, kill_rx) = oneshot::channel::<()>();
    live.borrow_mut().insert(id, kill_tx);

    let fsm = fsm.map_err(|e| debug!("connection ended: {}", e));
    let guard = kill_rx.then(|_: Result<(), oneshot::Canceled>| Ok::<(), ()>(()));
    let live = live.clone();
    let task = fsm.select(guard).map(|_| ()).map_err(|_| ())
        .then(move |result| {
            // Remove this connection's own entry once it finishes, whether
            // it closed normally, erred, or was killed from the outside --
            // otherwise the set would only ever grow, one `oneshot::Sender`
            // per connection for the life of the server.
            live.borrow_mut().remove(&id);
            result
        });
    handle.spawn(task);
}

//! The handle passed to resource handlers.
//!
//! `ResponseGateway` is deliberately thin: framing, status lines, bodies
//! and content negotiation are the response component's job (an external
//! collaborator per spec.md's Scope). This crate only needs to hand the
//! stream over and listen for the one-shot "done, reusable?" signal that
//! drives whether `ConnectionFSM` starts another turn on the same
//! transport.
//!
//! The transport itself lives in a cell shared between the gateway and
//! `ConnectionFSM`, not inside the one-shot payload: a handler may borrow
//! it to write directly (`write_through`) or take it out entirely
//! (`take_stream`) to drive its own response-component interface, and must
//! leave it back in the cell (`put_stream`) before signalling `done(true)`
//! if it wants the turn to be reusable. `ConnectionFSM` reclaims whatever
//! is left in the cell once `done` fires.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use futures::sync::oneshot;

use headers::HeaderMap;

/// Constructed once per turn that reaches the resource chain.
pub struct ResponseGateway<Io> {
    stream: Rc<RefCell<Option<Io>>>,
    done: RefCell<Option<oneshot::Sender<bool>>>,
    pub original_path: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// Set when the Server was constructed with `FOR_TLS_PROXY`: the
    /// response component should report `https` as its externally visible
    /// scheme even though this particular connection is plaintext.
    pub behind_tls_proxy: bool,
}

/// The other end of the "done" signal; `ConnectionFSM` polls this to learn
/// whether to start another turn on the same transport.
pub type Done = oneshot::Receiver<bool>;

impl<Io> ResponseGateway<Io> {
    /// Returns the gateway, a clone of its transport cell (for the caller
    /// to reclaim the stream once `done` fires), and the `done` receiver.
    pub fn new(stream: Io, original_path: String, path: String, query: Option<String>,
               headers: HeaderMap, behind_tls_proxy: bool)
        -> (ResponseGateway<Io>, Rc<RefCell<Option<Io>>>, Done)
    {
        let (tx, rx) = oneshot::channel();
        let cell = Rc::new(RefCell::new(Some(stream)));
        let gateway = ResponseGateway {
            stream: cell.clone(),
            done: RefCell::new(Some(tx)),
            original_path: original_path,
            path: path,
            query: query,
            headers: headers,
            behind_tls_proxy: behind_tls_proxy,
        };
        (gateway, cell, rx)
    }

    /// Take ownership of the underlying transport. A handler that wants to
    /// write a response through its own response-component interface does
    /// this exactly once; calling it twice (or after the stream has
    /// already been taken, and not yet put back) panics, since that means
    /// two handlers both believed they owned the connection.
    pub fn take_stream(&self) -> Io {
        self.stream.borrow_mut().take()
            .expect("ResponseGateway::take_stream called more than once")
    }

    /// Return a previously-taken transport. Required before `done(true)`
    /// if the handler took the stream and wants the turn reused; skip it
    /// (and let the stream drop) to close instead.
    pub fn put_stream(&self, stream: Io) {
        *self.stream.borrow_mut() = Some(stream);
    }

    /// Write directly through the still-held transport without taking
    /// ownership of it, for handlers simple enough not to need their own
    /// response-component interface.
    pub fn write_through<F>(&self, f: F) -> io::Result<()>
        where F: FnOnce(&mut Io) -> io::Result<()>
    {
        let mut guard = self.stream.borrow_mut();
        let stream = guard.as_mut().expect("ResponseGateway stream already taken");
        f(stream)
    }

    /// Signal completion of this turn. `reusable` says whether the
    /// transport may host another turn. May only be called once per
    /// gateway.
    pub fn done(&self, reusable: bool) {
        let tx = self.done.borrow_mut().take()
            .expect("ResponseGateway::done called more than once");
        // The receiving end (ConnectionFSM) may already have gone away if
        // the connection was dropped out from under the handler; that's
        // not this handler's problem.
        let _ = tx.send(reusable);
    }
}

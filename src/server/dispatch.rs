//! The two-stage handler chain and URL-root/query bookkeeping.
//!
//! Mirrors `cockpitwebserver.c`'s two GSignal extension points
//! (`handle-stream`, `handle-resource`) as a pair of typed handler lists
//! instead, per spec.md's Design Notes: the first handler that claims a
//! request wins, there is no further dynamic dispatch.

use enums::Method;
use headers::HeaderMap;
use server::gateway::ResponseGateway;

/// Outcome of offering a stream to the stream-chain handlers.
pub enum StreamHandled<Io> {
    /// A handler took ownership of `stream` (WebSocket upgrade, raw file
    /// send, ...). Dispatch stops here; the connection no longer belongs
    /// to `ConnectionFSM`.
    Claimed,
    /// No handler wanted it; `stream` and any bytes already read past the
    /// header block are handed back so dispatch can continue to the
    /// resource chain.
    NotClaimed(Io, Vec<u8>),
}

/// A handler that may claim the raw stream outright.
pub trait StreamHandler<Io> {
    fn on_stream(&self, original_path: &str, path: &str, method: &Method,
                 stream: Io, headers: &HeaderMap, pending_input: Vec<u8>)
        -> StreamHandled<Io>;
}

/// A handler that responds through a `ResponseGateway`.
///
/// Returns `true` if it produced (or has started producing) a response;
/// `false` means "not mine", so the next handler (or the default 404) gets
/// a turn.
pub trait ResourceHandler<Io> {
    fn on_resource(&self, path: &str, headers: &HeaderMap,
                   gateway: &ResponseGateway<Io>) -> bool;
}

struct ResourceEntry<Io> {
    detail: Option<String>,
    handler: Box<ResourceHandler<Io>>,
}

/// Owns the registered handler chains and the configured URL root.
pub struct DispatchCore<Io> {
    url_root: String,
    on_stream: Vec<Box<StreamHandler<Io>>>,
    on_resource: Vec<ResourceEntry<Io>>,
}

/// What dispatch decided to do with a turn that reached the resource
/// chain (i.e. nothing claimed the raw stream).
pub enum Dispatched {
    /// A resource handler produced a response.
    Responded,
    /// Nothing claimed it; caller should emit the default 404.
    NotFound,
}

impl<Io> DispatchCore<Io> {
    pub fn new(url_root: String) -> DispatchCore<Io> {
        DispatchCore {
            url_root: canon_url_root(&url_root),
            on_stream: Vec::new(),
            on_resource: Vec::new(),
        }
    }

    pub fn on_stream<H: StreamHandler<Io> + 'static>(&mut self, handler: H) {
        self.on_stream.push(Box::new(handler));
    }

    /// `detail`: `None` registers a catch-all, run after any handler
    /// matching a specific detail.
    pub fn on_resource<H: ResourceHandler<Io> + 'static>(&mut self, detail: Option<&str>, handler: H) {
        self.on_resource.push(ResourceEntry {
            detail: detail.map(|d| d.to_string()),
            handler: Box::new(handler),
        });
    }

    pub fn url_root(&self) -> &str {
        &self.url_root
    }

    /// Strip the configured URL root from `path`. `None` means the path
    /// did not have the root as a prefix; callers turn that into 404.
    pub fn strip_root<'a>(&self, path: &'a str) -> Option<&'a str> {
        strip_prefix_boundary(path, &self.url_root)
    }

    /// Offer `stream` to the stream chain. Stops at the first claim.
    pub fn dispatch_stream(&self, original_path: &str, path: &str, method: &Method,
                            mut stream: Io, headers: &HeaderMap, mut pending: Vec<u8>)
        -> StreamHandled<Io>
    {
        for handler in &self.on_stream {
            match handler.on_stream(original_path, path, method, stream, headers, pending) {
                StreamHandled::Claimed => return StreamHandled::Claimed,
                StreamHandled::NotClaimed(s, p) => {
                    stream = s;
                    pending = p;
                }
            }
        }
        StreamHandled::NotClaimed(stream, pending)
    }

    /// Run the resource chain for `path` (already stripped of the URL
    /// root) against `gateway`. Handlers registered for the path's detail
    /// run before the catch-all.
    pub fn dispatch_resource(&self, path: &str, headers: &HeaderMap,
                              gateway: &ResponseGateway<Io>) -> Dispatched {
        let key = detail_of(path);
        for entry in &self.on_resource {
            if entry.detail.as_ref().map(|d| d.as_str()) == Some(key) {
                if entry.handler.on_resource(path, headers, gateway) {
                    return Dispatched::Responded;
                }
            }
        }
        for entry in &self.on_resource {
            if entry.detail.is_none() {
                if entry.handler.on_resource(path, headers, gateway) {
                    return Dispatched::Responded;
                }
            }
        }
        Dispatched::NotFound
    }
}

/// The first path component, trailing `/` included when one follows it:
/// `/foo/bar` -> `/foo/`, `/foo` -> `/foo`, `/` -> `/`.
pub fn detail_of(path: &str) -> &str {
    if !path.starts_with('/') {
        return path;
    }
    match path[1..].find('/') {
        Some(idx) => &path[..idx + 2],
        None => path,
    }
}

/// Split `path` at the first `?`. The query string does not include the
/// `?` itself.
pub fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.find('?') {
        Some(idx) => (&path[..idx], Some(&path[idx + 1..])),
        None => (path, None),
    }
}

/// Canonicalize a URL root: collapse repeated slashes, drop a trailing
/// slash, and reduce a bare `/` to empty. `canon(canon(r)) == canon(r)`.
pub fn canon_url_root(root: &str) -> String {
    let mut out = String::with_capacity(root.len());
    let mut last_was_slash = false;
    for c in root.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(c);
    }
    if out.ends_with('/') {
        out.pop();
    }
    out
}

fn strip_prefix_boundary<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    if !path.starts_with(prefix) {
        return None;
    }
    match path.as_bytes().get(prefix.len()) {
        None => Some(""),
        Some(&b'/') => Some(&path[prefix.len()..]),
        _ => None,
    }
}

//! Bounded, header-only request parsing.
//!
//! Bodies are never read by this crate (see spec.md's Non-goals): a
//! `Content-Length` of anything but `0` is rejected outright, so the parser
//! only ever has to deal with a request line and a header block.

use httparse;

use enums::{Method, Status, Version};
use headers::HeaderMap;

/// One request, fully parsed out of the connection's read buffer.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    pub version: Version,
    pub path: String,
    pub headers: HeaderMap,
    /// Number of bytes of the input buffer this request consumed (the
    /// request line plus headers, never more). Callers drain exactly this
    /// many bytes before looking for the next request on the same stream.
    pub consumed: usize,
}

#[derive(Debug)]
pub enum ParseResult {
    /// `buf` is a valid prefix of a request; read more and try again.
    NeedMore,
    Complete(ParsedRequest),
    /// A diagnosable rejection; the caller schedules this status as the
    /// turn's delayed reply instead of invoking handlers.
    Reject(Status),
    /// `buf` has grown past the hard limit with no complete header block in
    /// sight. The connection is dropped without a response.
    Overflow,
}

/// Maximum number of headers `httparse` will parse per request. Chosen
/// generously; anything beyond this is almost certainly not a request this
/// crate is meant to serve, and falls out as a structural parse error.
const MAX_HEADERS: usize = 64;

pub struct RequestParser {
    /// `request_maximum` from `ServerConfig`; the hard overflow bound is
    /// `2 * request_max` (see spec.md's Design Notes on the "pipelining
    /// reserve" doubling, kept here as the drop threshold without
    /// endorsing the original reasoning).
    request_max: usize,
}

impl RequestParser {
    pub fn new(request_max: usize) -> RequestParser {
        RequestParser { request_max: request_max }
    }

    pub fn parse(&self, buf: &[u8]) -> ParseResult {
        if buf.len() > 2 * self.request_max {
            return ParseResult::Overflow;
        }

        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut raw_headers);
        let consumed = match req.parse(buf) {
            Ok(httparse::Status::Partial) => return ParseResult::NeedMore,
            Ok(httparse::Status::Complete(n)) => n,
            Err(_) => return ParseResult::Reject(Status::BadRequest),
        };

        let path = match req.path {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => return ParseResult::Reject(Status::BadRequest),
        };

        let mut headers = HeaderMap::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let value = match ::std::str::from_utf8(h.value) {
                Ok(v) => v,
                Err(_) => return ParseResult::Reject(Status::BadRequest),
            };
            headers.insert(h.name.to_string(), value.to_string());
        }

        if let Some(cl) = headers.get("Content-Length") {
            match cl.trim().parse::<u64>() {
                Ok(0) => {}
                Ok(_) => return ParseResult::Reject(Status::RequestEntityTooLarge),
                Err(_) => return ParseResult::Reject(Status::BadRequest),
            }
        }

        let method = Method::from(req.method.unwrap_or(""));
        if !method.is_allowed() {
            return ParseResult::Reject(Status::MethodNotAllowed);
        }

        match headers.get("Host") {
            Some(h) if !h.is_empty() => {}
            _ => return ParseResult::Reject(Status::BadRequest),
        }

        let version = match req.version {
            Some(1) => Version::Http11,
            _ => Version::Http10,
        };

        ParseResult::Complete(ParsedRequest {
            method: method,
            version: version,
            path: path,
            headers: headers,
            consumed: consumed,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{RequestParser, ParseResult};
    use enums::{Method, Status};

    fn parser() -> RequestParser {
        RequestParser::new(8192)
    }

    #[test]
    fn need_more_on_partial_request_line() {
        assert_matches!(parser().parse(b"GET /foo"), ParseResult::NeedMore);
    }

    #[test]
    fn need_more_on_partial_headers() {
        let buf = b"GET /foo HTTP/1.0\r\nHost: x\r\n";
        assert_matches!(parser().parse(buf), ParseResult::NeedMore);
    }

    #[test]
    fn complete_simple_get() {
        let buf = b"GET /foo?x=1 HTTP/1.0\r\nHost: test\r\n\r\n";
        match parser().parse(buf) {
            ParseResult::Complete(req) => {
                assert_eq!(req.method, Method::Get);
                assert_eq!(req.path, "/foo?x=1");
                assert_eq!(req.headers.get("Host"), Some("test"));
                assert_eq!(req.consumed, buf.len());
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn rejects_path_without_leading_slash() {
        // not representable by a real request line, but httparse would
        // choke on this request-target form anyway -- covered by
        // structural rejection instead.
        let buf = b"GET * HTTP/1.0\r\nHost: test\r\n\r\n";
        assert_matches!(parser().parse(buf), ParseResult::Reject(Status::BadRequest));
    }

    #[test]
    fn rejects_missing_host() {
        let buf = b"GET /foo HTTP/1.0\r\n\r\n";
        assert_matches!(parser().parse(buf), ParseResult::Reject(Status::BadRequest));
    }

    #[test]
    fn rejects_empty_host() {
        let buf = b"GET /foo HTTP/1.0\r\nHost: \r\n\r\n";
        assert_matches!(parser().parse(buf), ParseResult::Reject(Status::BadRequest));
    }

    #[test]
    fn rejects_disallowed_method() {
        let buf = b"POST /foo HTTP/1.0\r\nHost: test\r\n\r\n";
        assert_matches!(parser().parse(buf), ParseResult::Reject(Status::MethodNotAllowed));
    }

    #[test]
    fn accepts_zero_content_length() {
        let buf = b"GET /foo HTTP/1.0\r\nHost: test\r\nContent-Length: 0\r\n\r\n";
        assert_matches!(parser().parse(buf), ParseResult::Complete(_));
    }

    #[test]
    fn rejects_nonzero_content_length() {
        let buf = b"GET /foo HTTP/1.0\r\nHost: test\r\nContent-Length: 4\r\n\r\n";
        assert_matches!(parser().parse(buf),
                         ParseResult::Reject(Status::RequestEntityTooLarge));
    }

    #[test]
    fn rejects_malformed_content_length() {
        let buf = b"GET /foo HTTP/1.0\r\nHost: test\r\nContent-Length: abc\r\n\r\n";
        assert_matches!(parser().parse(buf), ParseResult::Reject(Status::BadRequest));
    }

    #[test]
    fn overflow_regardless_of_content() {
        let mut buf = b"GET /foo HTTP/1.0\r\nHost: test\r\n".to_vec();
        buf.extend(vec![b'a'; 2 * 8192]);
        assert_matches!(parser().parse(&buf), ParseResult::Overflow);
    }

    #[test]
    fn byte_at_a_time_matches_whole_buffer_verdict() {
        let buf: &[u8] = b"GET /foo HTTP/1.0\r\nHost: test\r\n\r\n";
        let p = parser();
        let mut partial = Vec::new();
        let mut saw_complete = false;
        for &b in buf {
            partial.push(b);
            match p.parse(&partial) {
                ParseResult::NeedMore => {}
                ParseResult::Complete(_) => {
                    saw_complete = true;
                    assert_eq!(partial.len(), buf.len());
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(saw_complete);
    }
}

use url::percent_encoding::percent_decode;

use headers::HeaderMap;

/// Look up a single cookie by name in a `Cookie` header.
///
/// A match is only accepted when `name` sits at a cookie-name boundary: at
/// the very start of the header value, or immediately after a `;` (with
/// optional ASCII whitespace in between), and is itself immediately
/// followed by `=`. This rules out false substring hits such as looking
/// for `okie2` inside `cookie2=...`.
///
/// The matched value runs up to the next `;` (or the end of the header) and
/// is URL-unescaped (`%HH`). If the escaped bytes do not decode to valid
/// UTF-8, the lookup is treated as "not found" and the failure is logged at
/// debug level — this mirrors `cockpit_web_server_parse_cookie`'s behavior
/// of returning `NULL` (and logging) when `g_uri_unescape_segment` fails.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get("Cookie")?;
    let header = header.as_bytes();
    let needle = name.as_bytes();
    if needle.is_empty() {
        return None;
    }

    let mut cursor = 0;
    while let Some(rel) = find(&header[cursor..], needle) {
        let start = cursor + rel;
        let at_boundary = start == 0 || boundary_before(&header[..start]);
        let after = start + needle.len();

        if at_boundary && header.get(after) == Some(&b'=') {
            let value_start = after + 1;
            let value_end = find(&header[value_start..], b";")
                .map(|p| value_start + p)
                .unwrap_or(header.len());
            let raw = &header[value_start..value_end];
            return match percent_decode(raw).decode_utf8() {
                Ok(decoded) => Some(decoded.into_owned()),
                Err(_) => {
                    debug!("invalid cookie encoding for {:?}", name);
                    None
                }
            };
        }

        cursor = after;
    }
    None
}

/// True if the nearest non-whitespace byte before the match, scanning
/// backwards, is a `;`. Walking all the way back to the header's own start
/// without finding one is *not* a boundary (only literal position 0 is,
/// handled by the caller).
fn boundary_before(prefix: &[u8]) -> bool {
    match prefix.iter().rposition(|&b| !is_ascii_space(b)) {
        Some(idx) => prefix[idx] == b';',
        None => false,
    }
}

fn is_ascii_space(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\r' || b == b'\n'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

#[cfg(test)]
mod test {
    use headers::HeaderMap;
    use super::parse_cookie;

    fn headers(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("Cookie".into(), cookie.into());
        h
    }

    #[test]
    fn simple() {
        let h = headers("foo=bar");
        assert_eq!(parse_cookie(&h, "foo"), Some("bar".into()));
    }

    #[test]
    fn multiple() {
        let h = headers("foo=bar; baz=qux");
        assert_eq!(parse_cookie(&h, "foo"), Some("bar".into()));
        assert_eq!(parse_cookie(&h, "baz"), Some("qux".into()));
    }

    #[test]
    fn overlapping_names() {
        let h = headers("cookie2=abc");
        assert_eq!(parse_cookie(&h, "okie2"), None);
        assert_eq!(parse_cookie(&h, "cookie2"), Some("abc".into()));
    }

    #[test]
    fn no_header() {
        let h = HeaderMap::new();
        assert_eq!(parse_cookie(&h, "foo"), None);
    }

    #[test]
    fn decode_percent() {
        let h = headers("foo=a%20b%2Fc");
        assert_eq!(parse_cookie(&h, "foo"), Some("a b/c".into()));
    }

    #[test]
    fn decode_bad_is_not_found() {
        // a lone high continuation byte is not valid UTF-8 once decoded
        let h = headers("foo=%ff%fe");
        assert_eq!(parse_cookie(&h, "foo"), None);
    }

    #[test]
    fn boundary_requires_semicolon_or_start() {
        let h = headers("notfoo=1; foo=2");
        assert_eq!(parse_cookie(&h, "foo"), Some("2".into()));
        assert_eq!(parse_cookie(&h, "foo=1"), None);
    }
}

/// Parse a quality-ordered header list such as `Accept-Language`.
///
/// Entries are split on `,`; each may carry an optional `;q=<float>`
/// parameter (missing `q` defaults to `1`, negative values clamp to `0`).
/// Entries with `q <= 0` are dropped. The remainder is stable-sorted
/// descending by `q` (ties keep their original order), lower-cased and
/// trimmed. If `default` is given it is seeded into the candidate list
/// with `q = 0.1` before sorting, so it only wins over entries the client
/// explicitly declined (`q <= 0.1`).
///
/// After sorting, a second pass appends "base form" entries: for every
/// surviving value containing `-` (e.g. `en-us`), the substring before the
/// first `-` (`en`) is appended at the end. The returned list may contain
/// duplicates; callers treat it as a priority order, not a set.
///
/// Mirrors `cockpit_web_server_parse_accept_list`, fixing its use of
/// `g_ptr_array_sort` (which is not a stable sort, so glib actually
/// scrambles entries of equal quality) with a properly stable sort.
pub fn parse_accept_list(header: &str, default: Option<&str>) -> Vec<String> {
    let mut candidates: Vec<(f64, String)> = Vec::new();

    if let Some(default) = default {
        candidates.push((0.1, default.to_string()));
    }

    for entry in header.split(',') {
        let mut parts = entry.splitn(2, ';');
        let value = parts.next().unwrap_or("");
        let mut q = 1.0f64;
        if let Some(param) = parts.next() {
            let param = param.trim();
            if let Some(rest) = strip_prefix(param, "q=") {
                q = rest.trim().parse().unwrap_or(1.0);
                if q < 0.0 {
                    q = 0.0;
                }
            }
        }
        candidates.push((q, value.to_string()));
    }

    // stable sort descending by q; `sort_by` is documented stable.
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(::std::cmp::Ordering::Equal));

    let mut result = Vec::with_capacity(candidates.len() * 2);
    for &(q, ref value) in &candidates {
        if q > 0.0 {
            result.push(value.trim().to_lowercase());
        }
    }
    for &(q, ref value) in &candidates {
        if q > 0.0 {
            if let Some(dash) = value.find('-') {
                result.push(value[..dash].trim().to_lowercase());
            }
        }
    }
    result
}

fn strip_prefix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::parse_accept_list;

    #[test]
    fn simple() {
        let result = parse_accept_list("en-us,en;q=0.5", None);
        assert_eq!(result, vec!["en-us", "en", "en"]);
    }

    #[test]
    fn drops_zero_quality() {
        let result = parse_accept_list("en;q=0, fr;q=0.8", None);
        assert_eq!(result, vec!["fr"]);
    }

    #[test]
    fn negative_quality_clamps_to_zero_and_is_dropped() {
        let result = parse_accept_list("en;q=-3, fr", None);
        assert_eq!(result, vec!["fr"]);
    }

    #[test]
    fn default_lands_after_natural_high_quality_entries() {
        let result = parse_accept_list("fr;q=0.2", Some("en"));
        assert_eq!(result, vec!["fr", "en"]);
    }

    #[test]
    fn default_wins_over_explicitly_declined_entries() {
        let result = parse_accept_list("fr;q=0.05", Some("en"));
        assert_eq!(result, vec!["en", "fr"]);
    }

    #[test]
    fn stable_on_ties() {
        let result = parse_accept_list("a;q=0.5,b;q=0.5,c;q=0.5", None);
        assert_eq!(result, vec!["a", "b", "c"]);
    }

    #[test]
    fn no_header_value_but_default_present() {
        let result = parse_accept_list("", Some("en"));
        assert!(result.iter().any(|v| v == "en"));
    }
}

use std::ascii::AsciiExt;

/// Case-insensitive mapping from header name to header value.
///
/// Backed by a `Vec` rather than a `HashMap`: request headers are few (a
/// handful at most), so a linear scan with an ASCII case-fold comparison is
/// both simpler and, in practice, no slower than hashing would be. This
/// mirrors the C original's `cockpit_str_case_hash`/`cockpit_str_case_equal`
/// table, minus the hashing, since we never have enough entries for a hash
/// to pay for itself.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap { entries: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> HeaderMap {
        HeaderMap { entries: Vec::with_capacity(cap) }
    }

    /// Insert a header, consuming both name and value.
    ///
    /// Duplicate keys: last write wins, matching a `GHashTable` `insert`
    /// (as opposed to `g_hash_table_add`, which would keep the first).
    pub fn insert(&mut self, name: String, value: String) {
        if let Some(slot) = self.entries.iter_mut()
            .find(|&&mut (ref k, _)| k.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
            return;
        }
        self.entries.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter()
            .find(|&&(ref k, _)| k.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> ::std::slice::Iter<(String, String)> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a (String, String);
    type IntoIter = ::std::slice::Iter<'a, (String, String)>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod test {
    use super::HeaderMap;

    #[test]
    fn case_insensitive_get() {
        let mut h = HeaderMap::new();
        h.insert("Host".into(), "example.com".into());
        assert_eq!(h.get("host"), Some("example.com"));
        assert_eq!(h.get("HOST"), Some("example.com"));
        assert_eq!(h.get("HoSt"), Some("example.com"));
    }

    #[test]
    fn last_write_wins() {
        let mut h = HeaderMap::new();
        h.insert("X-Thing".into(), "1".into());
        h.insert("x-thing".into(), "2".into());
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("X-Thing"), Some("2"));
    }

    #[test]
    fn missing_is_none() {
        let h = HeaderMap::new();
        assert_eq!(h.get("Host"), None);
    }

    #[test]
    fn iterates_in_insertion_order() {
        let mut h = HeaderMap::new();
        h.insert("A".into(), "1".into());
        h.insert("B".into(), "2".into());
        let names: Vec<&str> = h.iter().map(|&(ref k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}

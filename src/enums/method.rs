/// HTTP request method, as parsed from the request line.
///
/// Only `Get` and `Head` are accepted by `RequestParser`; every other
/// value is still representable here (for diagnostics and tests) but
/// causes a `405` rejection before a handler ever sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other(String),
}

impl Method {
    pub fn is_allowed(&self) -> bool {
        matches!(*self, Method::Get | Method::Head)
    }

    pub fn as_str(&self) -> &str {
        match *self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Other(ref s) => s,
        }
    }
}

impl<'a> From<&'a str> for Method {
    fn from(s: &'a str) -> Method {
        match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            s => Method::Other(s.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Method;

    #[test]
    fn from_str() {
        assert_eq!(Method::from("GET"), Method::Get);
        assert_eq!(Method::from("HEAD"), Method::Head);
        assert_eq!(Method::from("POST"), Method::Other("POST".into()));
    }

    #[test]
    fn allowed() {
        assert!(Method::Get.is_allowed());
        assert!(Method::Head.is_allowed());
        assert!(!Method::Other("POST".into()).is_allowed());
    }
}

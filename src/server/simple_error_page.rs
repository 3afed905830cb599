//! Minimal HTML bodies for delayed replies.
//!
//! Framing (status line, headers, `Content-Length`) is the response
//! component's job; this module only produces the body bytes, the same
//! layout the teacher crate's own `SimpleErrorPage` used.

use enums::Status;

const PART1: &'static str = "<!DOCTYPE html>\n<html><head><title>";
const PART2: &'static str = "</title></head><body><h1>";
const PART3: &'static str = "</h1></body></html>\n";

/// Render the default error body for `status`: `<title>` and `<h1>` both
/// read `"<code> <reason>"`.
pub fn render(status: Status) -> String {
    let code = status.code();
    let reason = status.reason();
    format!("{p1}{code} {reason}{p2}{code} {reason}{p3}",
            p1 = PART1, p2 = PART2, p3 = PART3,
            code = code, reason = reason)
}

/// Render a redirect body whose only job is to carry a human-visible link,
/// since the actual redirection is the `Location` header.
pub fn render_redirect(location: &str) -> String {
    format!("{p1}{code} {reason}{p2}\
             Please use <a href=\"{loc}\">{loc}</a>{p3}",
            p1 = PART1, p2 = PART2, p3 = PART3,
            code = Status::MovedPermanently.code(),
            reason = Status::MovedPermanently.reason(),
            loc = location)
}

#[cfg(test)]
mod test {
    use enums::Status;
    use super::{render, render_redirect};

    #[test]
    fn render_includes_code_and_reason() {
        let body = render(Status::NotFound);
        assert!(body.contains("404 Not Found"));
    }

    #[test]
    fn render_redirect_links_to_location() {
        let body = render_redirect("https://h/shell/index.html");
        assert!(body.contains("https://h/shell/index.html"));
        assert!(body.contains("301"));
    }
}

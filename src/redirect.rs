//! Redirect policy: building the follow-up request for a 3xx response.
//!
//! Pure request rewriting, no I/O; the client drives the loop and
//! enforces the hop cap. Method and body rewriting follows RFC 7231 with
//! the pragmatic 301/302 POST→GET compatibility rule; 307/308 preserve
//! both. Cross-origin hops (scheme, host, or port differ) drop
//! `Authorization` and `Cookie`.

use log::debug;

use crate::error::HttpError;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::url::Url;

/// Headers never copied onto a cross-origin redirect.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie"];

/// Build the request for the next hop of a redirect chain.
///
/// Fails with [`HttpError::MissingLocationHeader`] when the 3xx response
/// carries no `Location`.
pub(crate) fn next_request(req: &Request, resp: &Response) -> Result<Request, HttpError> {
    let location = resp.location().ok_or(HttpError::MissingLocationHeader)?;
    let target = req.url().join(location)?;

    let (method, keep_body) = rewrite_method(req.method(), resp.status());
    let cross_origin = is_cross_origin(req.url(), &target);

    debug!(
        "redirect {} -> {} {} (cross_origin={cross_origin})",
        resp.status(),
        method,
        location
    );

    // Host is regenerated for the new URL by request construction.
    let mut next = Request::from_url(method, target);
    for (name, value) in req.headers().iter() {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        if cross_origin && SENSITIVE_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        if !keep_body && name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        next.set_header(name, value);
    }
    if keep_body {
        next.body = req.body.clone();
    }
    next.timeout_ms = req.timeout_ms;
    next.follow_redirects = req.follow_redirects;
    Ok(next)
}

/// Method/body rewriting per hop status.
fn rewrite_method(method: Method, status: u16) -> (Method, bool) {
    match status {
        // see other: always GET, body dropped
        303 => (Method::Get, false),
        // moved permanently / found: POST becomes GET, body dropped
        301 | 302 if method == Method::Post => (Method::Get, false),
        // 307/308 and everything else preserve method and body
        _ => (method, true),
    }
}

/// Origins differ if scheme, host (byte-exact), or port differ; a missing
/// port compares as 0, never as the scheme default.
fn is_cross_origin(from: &Url, to: &Url) -> bool {
    from.scheme() != to.scheme()
        || from.host_raw() != to.host_raw()
        || from.port().unwrap_or(0) != to.port().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect_to(status: u16, location: &str) -> Response {
        let mut resp = Response::new();
        let raw = format!("HTTP/1.1 {status} Redirect\r\nLocation: {location}\r\n\r\n");
        resp.parse_headers(raw.as_bytes()).unwrap();
        resp
    }

    #[test]
    fn see_other_switches_to_get_and_drops_body() {
        let mut req = Request::post("http://a.example/x").unwrap();
        req.set_header("Authorization", "Bearer t");
        req.set_body("payload");

        let resp = redirect_to(303, "http://b.example/y");
        let next = next_request(&req, &resp).unwrap();

        assert_eq!(next.method(), Method::Get);
        assert!(next.body().is_none());
        assert_eq!(next.headers().get("host"), Some("b.example"));
        // cross-origin: sensitive header stripped
        assert_eq!(next.headers().get("authorization"), None);
    }

    #[test]
    fn permanent_post_becomes_get() {
        let mut req = Request::post("http://h/a").unwrap();
        req.set_body("data");
        for status in [301, 302] {
            let next = next_request(&req, &redirect_to(status, "/b")).unwrap();
            assert_eq!(next.method(), Method::Get, "{status}");
            assert!(next.body().is_none(), "{status}");
        }
    }

    #[test]
    fn permanent_get_stays_get() {
        let req = Request::get("http://h/a").unwrap();
        let next = next_request(&req, &redirect_to(301, "/b")).unwrap();
        assert_eq!(next.method(), Method::Get);
        assert_eq!(next.url().path_and_query(), "/b");
    }

    #[test]
    fn temporary_preserves_method_and_body() {
        let mut req = Request::put("http://h/a").unwrap();
        req.set_body("data");
        for status in [307, 308] {
            let next = next_request(&req, &redirect_to(status, "/b")).unwrap();
            assert_eq!(next.method(), Method::Put, "{status}");
            assert_eq!(next.body().unwrap().as_ref(), b"data", "{status}");
        }
    }

    #[test]
    fn same_origin_keeps_sensitive_headers() {
        let mut req = Request::get("http://h/a").unwrap();
        req.set_header("Authorization", "Bearer t");
        req.set_header("Cookie", "k=v");
        let next = next_request(&req, &redirect_to(302, "/b")).unwrap();
        assert_eq!(next.headers().get("authorization"), Some("Bearer t"));
        assert_eq!(next.headers().get("cookie"), Some("k=v"));
    }

    #[test]
    fn port_change_is_cross_origin() {
        let mut req = Request::get("http://h/a").unwrap();
        req.set_header("Cookie", "k=v");
        let next = next_request(&req, &redirect_to(302, "http://h:8080/b")).unwrap();
        assert_eq!(next.headers().get("cookie"), None);
    }

    #[test]
    fn scheme_upgrade_is_cross_origin() {
        let mut req = Request::get("http://h/a").unwrap();
        req.set_header("Authorization", "x");
        let next = next_request(&req, &redirect_to(301, "https://h/a")).unwrap();
        assert_eq!(next.headers().get("authorization"), None);
    }

    #[test]
    fn missing_location_errors() {
        let req = Request::get("http://h/a").unwrap();
        let mut resp = Response::new();
        resp.parse_headers(b"HTTP/1.1 302 Found\r\n\r\n").unwrap();
        assert!(matches!(
            next_request(&req, &resp),
            Err(HttpError::MissingLocationHeader)
        ));
    }

    #[test]
    fn relative_location_resolves_against_current() {
        let req = Request::get("http://h/dir/page").unwrap();
        let next = next_request(&req, &redirect_to(302, "other")).unwrap();
        assert_eq!(next.url().path_and_query(), "/dir/other");
    }

    #[test]
    fn custom_headers_survive_cross_origin() {
        let mut req = Request::get("http://a.example/x").unwrap();
        req.set_header("User-Agent", "x/1.0");
        req.set_header("Accept", "application/json");
        let next = next_request(&req, &redirect_to(302, "http://b.example/y")).unwrap();
        assert_eq!(next.headers().get("user-agent"), Some("x/1.0"));
        assert_eq!(next.headers().get("accept"), Some("application/json"));
    }
}

//! URL semantics specialized for HTTP/1.1 request-targets.
//!
//! A [`Url`] is an immutable `(scheme, authority, path+query)` triple.
//! Schemes compare case-insensitively (stored lowercased), the host keeps
//! bracketed IPv6 literals intact, and the path may be empty (equivalent
//! to `/`). Percent-encoded path/query bytes are forwarded as-is on the
//! wire; only the host is percent-decoded, at connect time.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::error::HttpError;

/// The four HTTP/1.1 request-target forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetForm {
    /// `path?query`, the default for direct requests. Empty path renders `/`.
    Origin,
    /// `scheme://authority/path?query`, for forward-proxy requests.
    Absolute,
    /// `host[:port]`, for CONNECT.
    Authority,
    /// `*`, for server-wide OPTIONS.
    Asterisk,
}

/// Policy for resolving a missing port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPolicy {
    /// Only an explicit port is accepted.
    ExactOnly,
    /// Fall back to 80/443 for the known schemes, fail otherwise.
    DefaultForKnownSchemes,
    /// Like `DefaultForKnownSchemes`, but an unknown scheme fails even
    /// when the port is explicit.
    ErrorOnUnknown,
}

/// A parsed, immutable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    scheme: String,
    host: String,
    port: Option<u16>,
    path_and_query: String,
}

/// Default port for a known scheme, or `None`.
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

impl Url {
    /// Parse an absolute URL.
    ///
    /// Requires `scheme://host`; port, path, query are optional. A
    /// fragment, if present, is dropped (never sent on the wire).
    pub fn parse(input: &str) -> Result<Self, HttpError> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| HttpError::MalformedUrl(input.to_string()))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
        {
            return Err(HttpError::MalformedUrl(input.to_string()));
        }
        let scheme = scheme.to_ascii_lowercase();

        let rest = match rest.find('#') {
            Some(i) => &rest[..i],
            None => rest,
        };
        let (authority, path_and_query) = match rest.find(['/', '?']) {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(HttpError::NoHostInUrl);
        }

        let (host, port) = split_authority(authority, input)?;
        if host.is_empty() {
            return Err(HttpError::NoHostInUrl);
        }

        Ok(Url {
            scheme,
            host: host.to_string(),
            port,
            path_and_query: path_and_query.to_string(),
        })
    }

    /// The lowercased scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host exactly as it appeared in the URL (brackets and percent
    /// escapes preserved).
    pub fn host_raw(&self) -> &str {
        &self.host
    }

    /// The explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path plus query as parsed; may be empty (renders as `/`).
    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    /// Whether the scheme implies TLS (`https` or `wss`).
    pub fn is_secure(&self) -> bool {
        self.scheme == "https" || self.scheme == "wss"
    }

    /// Resolve the effective port under `policy`.
    pub fn port_with(&self, policy: PortPolicy) -> Result<u16, HttpError> {
        let known = default_port(&self.scheme);
        match policy {
            PortPolicy::ExactOnly => self.port.ok_or(HttpError::PortMissing),
            PortPolicy::DefaultForKnownSchemes => match (self.port, known) {
                (Some(p), _) => Ok(p),
                (None, Some(d)) => Ok(d),
                (None, None) => Err(HttpError::UnknownSchemeNoDefault(self.scheme.clone())),
            },
            PortPolicy::ErrorOnUnknown => match known {
                None => Err(HttpError::UnknownSchemeNoDefault(self.scheme.clone())),
                Some(d) => Ok(self.port.unwrap_or(d)),
            },
        }
    }

    /// The host with percent escapes decoded. Bracketed IPv6 literals are
    /// returned intact. Borrows unless escapes are present.
    pub fn host(&self) -> Result<Cow<'_, str>, HttpError> {
        if !self.host.contains('%') || self.host.starts_with('[') {
            return Ok(Cow::Borrowed(&self.host));
        }
        let mut out = Vec::with_capacity(self.host.len());
        let bytes = self.host.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| HttpError::MalformedUrl(self.host.clone()))?;
                out.push(hex);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out)
            .map(Cow::Owned)
            .map_err(|_| HttpError::MalformedUrl(self.host.clone()))
    }

    /// Render the request-target in the chosen form.
    pub fn write_request_target(&self, out: &mut String, form: TargetForm) {
        match form {
            TargetForm::Origin => {
                if self.path_and_query.is_empty() || self.path_and_query.starts_with('?') {
                    out.push('/');
                }
                out.push_str(&self.path_and_query);
            }
            TargetForm::Absolute => {
                out.push_str(&self.scheme);
                out.push_str("://");
                out.push_str(&self.host);
                if let Some(p) = self.port {
                    let _ = write!(out, ":{p}");
                }
                self.write_request_target(out, TargetForm::Origin);
            }
            TargetForm::Authority => {
                out.push_str(&self.host);
                if let Some(p) = self.port {
                    let _ = write!(out, ":{p}");
                }
            }
            TargetForm::Asterisk => out.push('*'),
        }
    }

    /// The request-target as an owned string.
    pub fn request_target(&self, form: TargetForm) -> String {
        let mut s = String::new();
        self.write_request_target(&mut s, form);
        s
    }

    /// Resolve a `Location` header value against this URL.
    ///
    /// Absolute `http://` / `https://` URIs are parsed directly.
    /// `/`-rooted references replace the path, other relative references
    /// resolve against the current path's directory.
    pub fn join(&self, location: &str) -> Result<Url, HttpError> {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Url::parse(location);
        }
        let path_and_query = if location.starts_with('/') {
            location.to_string()
        } else {
            let path = match self.path_and_query.find('?') {
                Some(i) => &self.path_and_query[..i],
                None => &self.path_and_query,
            };
            let dir = match path.rfind('/') {
                Some(i) => &path[..=i],
                None => "/",
            };
            format!("{dir}{location}")
        };
        Ok(Url {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port,
            path_and_query,
        })
    }
}

/// Split `authority` into host and optional port. Handles bracketed IPv6.
fn split_authority<'a>(authority: &'a str, original: &str) -> Result<(&'a str, Option<u16>), HttpError> {
    if let Some(rest) = authority.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| HttpError::MalformedUrl(original.to_string()))?;
        let host = &authority[..end + 2];
        let after = &rest[end + 1..];
        if after.is_empty() {
            return Ok((host, None));
        }
        let port = after
            .strip_prefix(':')
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| HttpError::MalformedUrl(original.to_string()))?;
        return Ok((host, Some(port)));
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| HttpError::MalformedUrl(original.to_string()))?;
            Ok((host, Some(port)))
        }
        None => Ok((authority, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        let u = Url::parse("http://example.com/api/users?page=1").unwrap();
        assert_eq!(u.scheme(), "http");
        assert_eq!(u.host_raw(), "example.com");
        assert_eq!(u.port(), None);
        assert_eq!(u.path_and_query(), "/api/users?page=1");
        assert!(!u.is_secure());
    }

    #[test]
    fn parse_port_and_empty_path() {
        let u = Url::parse("https://example.com:8443").unwrap();
        assert_eq!(u.port(), Some(8443));
        assert_eq!(u.path_and_query(), "");
        assert!(u.is_secure());
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let u = Url::parse("HTTPS://example.com/").unwrap();
        assert_eq!(u.scheme(), "https");
        assert!(u.is_secure());
        assert!(Url::parse("WSS://example.com/").unwrap().is_secure());
    }

    #[test]
    fn parse_ipv6() {
        let u = Url::parse("http://[::1]:8080/x").unwrap();
        assert_eq!(u.host_raw(), "[::1]");
        assert_eq!(u.port(), Some(8080));
        let u = Url::parse("http://[2001:db8::1]/").unwrap();
        assert_eq!(u.host_raw(), "[2001:db8::1]");
        assert_eq!(u.port(), None);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(Url::parse("example.com"), Err(HttpError::MalformedUrl(_))));
        assert!(matches!(Url::parse("http://"), Err(HttpError::NoHostInUrl)));
        assert!(matches!(
            Url::parse("http://host:notaport/"),
            Err(HttpError::MalformedUrl(_))
        ));
    }

    #[test]
    fn fragment_is_dropped() {
        let u = Url::parse("http://example.com/page#section").unwrap();
        assert_eq!(u.path_and_query(), "/page");
    }

    #[test]
    fn port_policies() {
        let plain = Url::parse("http://h/").unwrap();
        assert!(matches!(plain.port_with(PortPolicy::ExactOnly), Err(HttpError::PortMissing)));
        assert_eq!(plain.port_with(PortPolicy::DefaultForKnownSchemes).unwrap(), 80);
        assert_eq!(
            Url::parse("https://h/").unwrap().port_with(PortPolicy::DefaultForKnownSchemes).unwrap(),
            443
        );
        assert_eq!(
            Url::parse("wss://h/").unwrap().port_with(PortPolicy::DefaultForKnownSchemes).unwrap(),
            443
        );

        let odd = Url::parse("gopher://h:70/").unwrap();
        assert_eq!(odd.port_with(PortPolicy::ExactOnly).unwrap(), 70);
        assert!(matches!(
            odd.port_with(PortPolicy::ErrorOnUnknown),
            Err(HttpError::UnknownSchemeNoDefault(_))
        ));
        assert!(matches!(
            Url::parse("gopher://h/").unwrap().port_with(PortPolicy::DefaultForKnownSchemes),
            Err(HttpError::UnknownSchemeNoDefault(_))
        ));
    }

    #[test]
    fn host_percent_decoding() {
        let u = Url::parse("http://ex%61mple.com/").unwrap();
        assert_eq!(u.host().unwrap(), "example.com");
        // no escapes: borrows
        let u = Url::parse("http://example.com/").unwrap();
        assert!(matches!(u.host().unwrap(), Cow::Borrowed(_)));
        // brackets preserved
        let u = Url::parse("http://[::1]/").unwrap();
        assert_eq!(u.host().unwrap(), "[::1]");
    }

    #[test]
    fn origin_form_always_starts_with_slash() {
        for raw in [
            "http://h",
            "http://h/",
            "http://h?q=1",
            "http://h/a/b?q=1",
            "http://h:81/x",
        ] {
            let u = Url::parse(raw).unwrap();
            assert!(u.request_target(TargetForm::Origin).starts_with('/'), "{raw}");
        }
        assert_eq!(
            Url::parse("http://h?q=1").unwrap().request_target(TargetForm::Origin),
            "/?q=1"
        );
    }

    #[test]
    fn absolute_and_authority_forms() {
        let u = Url::parse("http://h/x?y=1").unwrap();
        assert_eq!(u.request_target(TargetForm::Absolute), "http://h/x?y=1");
        assert_eq!(u.request_target(TargetForm::Authority), "h");
        assert_eq!(u.request_target(TargetForm::Asterisk), "*");

        // ports appear only when explicit, never synthesized
        let u = Url::parse("https://h:444/x").unwrap();
        assert_eq!(u.request_target(TargetForm::Absolute), "https://h:444/x");
        assert_eq!(u.request_target(TargetForm::Authority), "h:444");
    }

    #[test]
    fn join_absolute_and_rooted() {
        let base = Url::parse("http://a.example/x/y?q=1").unwrap();
        let abs = base.join("https://b.example/z").unwrap();
        assert_eq!(abs.scheme(), "https");
        assert_eq!(abs.host_raw(), "b.example");
        assert_eq!(abs.path_and_query(), "/z");

        let rooted = base.join("/new?p=2").unwrap();
        assert_eq!(rooted.host_raw(), "a.example");
        assert_eq!(rooted.path_and_query(), "/new?p=2");
    }

    #[test]
    fn join_relative() {
        let base = Url::parse("http://a.example/dir/page?q=1").unwrap();
        let rel = base.join("other").unwrap();
        assert_eq!(rel.path_and_query(), "/dir/other");

        let base = Url::parse("http://a.example").unwrap();
        assert_eq!(base.join("p").unwrap().path_and_query(), "/p");
    }
}

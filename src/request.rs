//! Inbound request representation.
//!
//! The transport layer builds a [`RequestView`] for each inbound request and
//! hands it to the engine. The engine never touches sockets or parsers beyond
//! the query-string helper offered here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// HTTP method of a request or expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
    /// Wildcard used by expectations that accept every method.
    Any,
}

impl HttpMethod {
    /// Whether an expectation configured with `self` accepts `incoming`.
    pub fn accepts(&self, incoming: HttpMethod) -> bool {
        *self == HttpMethod::Any || *self == incoming
    }

    /// Parse a method name, case-insensitive. Unknown names return `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "OPTIONS" => Some(Self::Options),
            "TRACE" => Some(Self::Trace),
            "*" | "ANY" => Some(Self::Any),
            _ => None,
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cookie attached to an inbound request.
///
/// Only the value is guaranteed by HTTP; the remaining attributes are filled
/// in when the transport has them (extended cookie information).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookie {
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
}

impl RequestCookie {
    /// Cookie carrying only a value.
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Transport-supplied view of a single inbound request.
///
/// Header and query lookups preserve multi-valued entries; header names are
/// compared case-insensitively by the matchers.
#[derive(Debug, Clone, Default)]
pub struct RequestView {
    pub method: Option<HttpMethod>,
    pub path: String,
    /// Query parameters in arrival order (a name may repeat).
    pub query: Vec<(String, String)>,
    /// Headers in arrival order (a name may repeat).
    pub headers: Vec<(String, String)>,
    pub cookies: HashMap<String, RequestCookie>,
    pub body: Option<Vec<u8>>,
    /// Declared content type of the body, if any.
    pub content_type: Option<String>,
}

impl RequestView {
    /// Start building a request view for the given method and path.
    pub fn build(method: HttpMethod, path: impl Into<String>) -> RequestViewBuilder {
        RequestViewBuilder {
            view: RequestView {
                method: Some(method),
                path: path.into(),
                ..RequestView::default()
            },
        }
    }

    /// All values for a query parameter, in arrival order.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All values for a header, matched case-insensitively.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The declared content type stripped of parameters, lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(media_type)
    }

    /// One-line summary used in reports and logs.
    pub fn summary(&self) -> String {
        let method = self
            .method
            .map(|m| m.as_str())
            .unwrap_or("<no-method>");
        if self.query.is_empty() {
            format!("{} {}", method, self.path)
        } else {
            let query = self
                .query
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("&");
            format!("{} {} ? {}", method, self.path, query)
        }
    }
}

/// Builder used by transports and tests to assemble a [`RequestView`].
#[derive(Debug, Default)]
pub struct RequestViewBuilder {
    view: RequestView,
}

impl RequestViewBuilder {
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.view.query.push((name.into(), value.into()));
        self
    }

    /// Parse and append all parameters from a raw query string.
    pub fn query_string(mut self, raw: &str) -> Self {
        self.view.query.extend(parse_query_string(raw));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.view.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, cookie: RequestCookie) -> Self {
        self.view.cookies.insert(name.into(), cookie);
        self
    }

    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.view.body = Some(bytes.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.view.content_type = Some(content_type.into());
        self
    }

    pub fn finish(self) -> RequestView {
        self.view
    }
}

/// Strip media-type parameters and normalize case (`Text/Plain; charset=utf-8`
/// becomes `text/plain`).
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Parse a query string into name/value pairs, preserving order and repeats.
pub fn parse_query_string(query: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.push((urlencoding_decode(key), urlencoding_decode(value)));
        } else {
            params.push((urlencoding_decode(part), String::new()));
        }
    }

    params
}

/// Simple URL decoding. Escaped bytes are collected before UTF-8
/// interpretation so multibyte sequences like `%C3%A9` decode correctly.
pub(crate) fn urlencoding_decode(s: &str) -> String {
    let mut bytes = Vec::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    bytes.push(byte);
                    continue;
                }
            }
            bytes.push(b'%');
            bytes.extend_from_slice(hex.as_bytes());
        } else if ch == '+' {
            bytes.push(b' ');
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

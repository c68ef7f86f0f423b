//! Response descriptors and their encoded form.
//!
//! Expectations configure [`ResponseDescriptor`]s; at dispatch time the
//! descriptor is resolved through the codec registry into an
//! [`HttpResponse`] of final bytes for the transport layer.

use crate::codec::CodecRegistry;
use crate::error::EngineError;
use serde_json::Value;

/// A cookie attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Body of a configured response.
#[derive(Debug, Clone, Default)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// Raw bytes sent as-is.
    Bytes(Vec<u8>),
    /// A value resolved through the codec registry's encoder for the content
    /// type at send time.
    Encoded { content_type: String, value: Value },
}

/// A configured response: status, ordered headers, cookies, and a body.
///
/// Header order is insertion order and names may repeat; the engine performs
/// no HTTP validation of caller-supplied values.
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<ResponseCookie>,
    pub body: ResponseBody,
}

impl Default for ResponseDescriptor {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: ResponseBody::Empty,
        }
    }
}

impl ResponseDescriptor {
    /// Empty 200 response.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Empty response with the given status.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Plain-text 200 response.
    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .with_header("Content-Type", "text/plain")
            .with_body(ResponseBody::Bytes(body.into().into_bytes()))
    }

    /// Response whose body is encoded through the codec registry at send
    /// time.
    pub fn encoded(content_type: impl Into<String>, value: Value) -> Self {
        Self::ok().with_body(ResponseBody::Encoded {
            content_type: content_type.into(),
            value,
        })
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Append a header; repeated names produce multi-valued headers.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, cookie: ResponseCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Resolve the descriptor into final bytes.
    ///
    /// A `ResponseBody::Encoded` body requires an encoder for its content
    /// type; a missing or failing encoder is a configuration error for this
    /// request. A Content-Type header is added for encoded bodies when the
    /// caller did not set one.
    pub fn encode(&self, codecs: &CodecRegistry) -> Result<HttpResponse, EngineError> {
        let mut headers = self.headers.clone();
        let body = match &self.body {
            ResponseBody::Empty => Vec::new(),
            ResponseBody::Bytes(bytes) => bytes.clone(),
            ResponseBody::Encoded {
                content_type,
                value,
            } => {
                let encoder =
                    codecs
                        .encoder(content_type)
                        .ok_or_else(|| EngineError::MissingEncoder {
                            content_type: content_type.clone(),
                        })?;
                let bytes = encoder(value).map_err(|source| EngineError::Encode {
                    content_type: content_type.clone(),
                    source,
                })?;
                if !self.has_header("Content-Type") {
                    headers.push(("Content-Type".to_string(), content_type.clone()));
                }
                bytes
            }
        };

        Ok(HttpResponse {
            status: self.status,
            headers,
            cookies: self.cookies.clone(),
            body,
        })
    }
}

/// Fully resolved response handed back to the transport layer.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<ResponseCookie>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body interpreted as UTF-8 text, for assertions and logs.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

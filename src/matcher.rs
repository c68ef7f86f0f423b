//! Request matching primitives.
//!
//! A matcher is a pure predicate over one attribute of an inbound request,
//! paired with a rendered description for failure reports. Matchers never
//! error: an absent attribute or an undecodable body simply evaluates false.
//! An expectation's matcher set is a logical AND; OR semantics are expressed
//! by registering multiple expectations.

use crate::codec::CodecRegistry;
use crate::request::{media_type, HttpMethod, RequestView};
use globset::GlobMatcher;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Matcher over a single string value (header value, query value, cookie
/// attribute).
#[derive(Clone)]
pub enum ValueMatcher {
    /// Matches any value.
    Any,
    /// Exact string match.
    Exact(String),
    /// Regex pattern match.
    Regex(Regex),
    /// Substring match.
    Contains(String),
    /// Caller-supplied predicate with a description for reports.
    Predicate {
        description: String,
        predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    },
}

impl ValueMatcher {
    pub fn exact(value: impl Into<String>) -> Self {
        Self::Exact(value.into())
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::Contains(value.into())
    }

    pub fn predicate(
        description: impl Into<String>,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => value == expected,
            Self::Regex(regex) => regex.is_match(value),
            Self::Contains(needle) => value.contains(needle),
            Self::Predicate { predicate, .. } => predicate(value),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any value".to_string(),
            Self::Exact(expected) => format!("'{}'", expected),
            Self::Regex(regex) => format!("matching /{}/", regex.as_str()),
            Self::Contains(needle) => format!("containing '{}'", needle),
            Self::Predicate { description, .. } => description.clone(),
        }
    }
}

impl fmt::Debug for ValueMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueMatcher({})", self.describe())
    }
}

/// Matcher over the request path.
#[derive(Clone)]
pub enum PathMatcher {
    /// Matches any path.
    Any,
    /// Exact path match.
    Exact(String),
    /// Path prefix match.
    Prefix(String),
    /// Regex pattern match.
    Regex(Regex),
    /// Glob pattern match.
    Glob(GlobMatcher),
    /// Caller-supplied predicate with a description for reports.
    Predicate {
        description: String,
        predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    },
}

impl PathMatcher {
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Compile a glob pattern (e.g. `/api/*/detail`).
    pub fn glob(pattern: &str) -> Result<Self, globset::Error> {
        Ok(Self::Glob(globset::Glob::new(pattern)?.compile_matcher()))
    }

    pub fn predicate(
        description: impl Into<String>,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => path == expected,
            Self::Prefix(prefix) => path.starts_with(prefix),
            Self::Regex(regex) => regex.is_match(path),
            Self::Glob(glob) => glob.is_match(path),
            Self::Predicate { predicate, .. } => predicate(path),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any path".to_string(),
            Self::Exact(expected) => format!("'{}'", expected),
            Self::Prefix(prefix) => format!("starting with '{}'", prefix),
            Self::Regex(regex) => format!("matching /{}/", regex.as_str()),
            Self::Glob(glob) => format!("matching glob '{}'", glob.glob()),
            Self::Predicate { description, .. } => description.clone(),
        }
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathMatcher({})", self.describe())
    }
}

/// Matcher over a named, possibly multi-valued request attribute (query
/// parameter or header).
#[derive(Debug, Clone)]
pub enum ParamMatcher {
    /// The attribute must be present with any value.
    Present,
    /// The attribute must be absent.
    Absent,
    /// At least one value must satisfy the matcher.
    Value(ValueMatcher),
}

impl ParamMatcher {
    pub fn matches(&self, values: &[&str]) -> bool {
        match self {
            Self::Present => !values.is_empty(),
            Self::Absent => values.is_empty(),
            Self::Value(matcher) => values.iter().any(|v| matcher.matches(v)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Present => "present".to_string(),
            Self::Absent => "absent".to_string(),
            Self::Value(matcher) => matcher.describe(),
        }
    }
}

/// Matcher over a named request cookie. Unset fields are not constrained.
#[derive(Debug, Clone, Default)]
pub struct CookieMatcher {
    pub value: Option<ValueMatcher>,
    pub domain: Option<ValueMatcher>,
    pub path: Option<ValueMatcher>,
    pub max_age: Option<i64>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
}

impl CookieMatcher {
    pub fn value(matcher: ValueMatcher) -> Self {
        Self {
            value: Some(matcher),
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, matcher: ValueMatcher) -> Self {
        self.domain = Some(matcher);
        self
    }

    pub fn with_path(mut self, matcher: ValueMatcher) -> Self {
        self.path = Some(matcher);
        self
    }

    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = Some(http_only);
        self
    }

    fn matches(&self, cookie: &crate::request::RequestCookie) -> bool {
        if let Some(matcher) = &self.value {
            if !matcher.matches(&cookie.value) {
                return false;
            }
        }
        if let Some(matcher) = &self.domain {
            match &cookie.domain {
                Some(domain) if matcher.matches(domain) => {}
                _ => return false,
            }
        }
        if let Some(matcher) = &self.path {
            match &cookie.path {
                Some(path) if matcher.matches(path) => {}
                _ => return false,
            }
        }
        if let Some(expected) = self.max_age {
            if cookie.max_age != Some(expected) {
                return false;
            }
        }
        if let Some(expected) = self.secure {
            if cookie.secure != Some(expected) {
                return false;
            }
        }
        if let Some(expected) = self.http_only {
            if cookie.http_only != Some(expected) {
                return false;
            }
        }
        true
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(m) = &self.value {
            parts.push(format!("value {}", m.describe()));
        }
        if let Some(m) = &self.domain {
            parts.push(format!("domain {}", m.describe()));
        }
        if let Some(m) = &self.path {
            parts.push(format!("path {}", m.describe()));
        }
        if let Some(v) = self.max_age {
            parts.push(format!("max-age {}", v));
        }
        if let Some(v) = self.secure {
            parts.push(format!("secure {}", v));
        }
        if let Some(v) = self.http_only {
            parts.push(format!("http-only {}", v));
        }
        if parts.is_empty() {
            "present".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Matcher over a decoded request body.
#[derive(Clone)]
pub enum DecodedMatcher {
    /// Decoded value must equal the expected value.
    Equals(Value),
    /// JSON path expressions and expected values; a null expected value only
    /// requires the path to resolve.
    JsonPath {
        expressions: HashMap<String, Value>,
    },
    /// Caller-supplied predicate over the decoded value.
    Predicate {
        description: String,
        predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
    },
}

impl DecodedMatcher {
    pub fn predicate(
        description: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    fn matches(&self, decoded: &Value) -> bool {
        match self {
            Self::Equals(expected) => decoded == expected,
            Self::JsonPath { expressions } => matches_json_paths(decoded, expressions),
            Self::Predicate { predicate, .. } => predicate(decoded),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Equals(expected) => format!("equal to {}", expected),
            Self::JsonPath { expressions } => {
                let mut paths: Vec<_> = expressions.keys().cloned().collect();
                paths.sort();
                format!("satisfying json paths [{}]", paths.join(", "))
            }
            Self::Predicate { description, .. } => description.clone(),
        }
    }
}

fn matches_json_paths(json: &Value, expressions: &HashMap<String, Value>) -> bool {
    use jsonpath_rust::JsonPath;

    for (path_expr, expected) in expressions {
        let path = match JsonPath::try_from(path_expr.as_str()) {
            Ok(p) => p,
            Err(_) => return false,
        };

        // `find` wraps resolved matches in an array and yields null for a
        // path that does not resolve.
        let results = path.find(json);

        // A null expected value only checks that the path resolves.
        let matches = if expected.is_null() {
            !results.is_null()
        } else {
            match results.as_array() {
                Some(items) => items.iter().any(|item| item == expected),
                None => results == *expected,
            }
        };
        if !matches {
            return false;
        }
    }
    true
}

/// Matcher over the request body, raw or decoded.
#[derive(Clone)]
pub enum BodyMatcher {
    /// Raw bytes must equal exactly; an absent body counts as empty bytes.
    RawBytes(Vec<u8>),
    /// Caller-supplied predicate over the raw bytes.
    RawPredicate {
        description: String,
        predicate: Arc<dyn Fn(&[u8]) -> bool + Send + Sync>,
    },
    /// The request's declared content type must match, the body must decode
    /// through the codec registry, and the decoded value must satisfy the
    /// matcher. Fails closed when no decoder is registered.
    Decoded {
        content_type: String,
        matcher: DecodedMatcher,
    },
}

impl BodyMatcher {
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::RawBytes(bytes.into())
    }

    pub fn raw_predicate(
        description: impl Into<String>,
        predicate: impl Fn(&[u8]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::RawPredicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn decoded(content_type: impl Into<String>, matcher: DecodedMatcher) -> Self {
        Self::Decoded {
            content_type: content_type.into(),
            matcher,
        }
    }

    fn matches(&self, request: &RequestView, codecs: &CodecRegistry) -> bool {
        let body = request.body.as_deref().unwrap_or(&[]);
        match self {
            Self::RawBytes(expected) => body == expected.as_slice(),
            Self::RawPredicate { predicate, .. } => predicate(body),
            Self::Decoded {
                content_type,
                matcher,
            } => {
                let declared = match request.media_type() {
                    Some(declared) => declared,
                    None => return false,
                };
                if declared != media_type(content_type) {
                    return false;
                }
                match codecs.try_decode(&declared, body) {
                    Some(decoded) => matcher.matches(&decoded),
                    None => false,
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::RawBytes(expected) => format!("body is {} raw bytes", expected.len()),
            Self::RawPredicate { description, .. } => format!("body {}", description),
            Self::Decoded {
                content_type,
                matcher,
            } => format!("body ({}) {}", content_type, matcher.describe()),
        }
    }
}

/// One matcher in an expectation's matcher set.
#[derive(Clone)]
pub enum RequestMatcher {
    Method(HttpMethod),
    Path(PathMatcher),
    Query { name: String, matcher: ParamMatcher },
    Header { name: String, matcher: ParamMatcher },
    Cookie { name: String, matcher: CookieMatcher },
    Body(BodyMatcher),
    /// Caller-supplied predicate over the whole request view.
    Predicate {
        description: String,
        predicate: Arc<dyn Fn(&RequestView) -> bool + Send + Sync>,
    },
}

impl RequestMatcher {
    pub fn predicate(
        description: impl Into<String>,
        predicate: impl Fn(&RequestView) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the matcher against a request. Never errors; absent
    /// attributes evaluate false.
    pub fn matches(&self, request: &RequestView, codecs: &CodecRegistry) -> bool {
        match self {
            Self::Method(expected) => match request.method {
                Some(incoming) => expected.accepts(incoming),
                None => *expected == HttpMethod::Any,
            },
            Self::Path(matcher) => matcher.matches(&request.path),
            Self::Query { name, matcher } => matcher.matches(&request.query_values(name)),
            Self::Header { name, matcher } => matcher.matches(&request.header_values(name)),
            Self::Cookie { name, matcher } => match request.cookies.get(name) {
                Some(cookie) => matcher.matches(cookie),
                None => false,
            },
            Self::Body(matcher) => matcher.matches(request, codecs),
            Self::Predicate { predicate, .. } => predicate(request),
        }
    }

    /// Human-readable description for unmatched-request reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Method(expected) => format!("method is {}", expected),
            Self::Path(matcher) => format!("path {}", matcher.describe()),
            Self::Query { name, matcher } => {
                format!("query param '{}' {}", name, matcher.describe())
            }
            Self::Header { name, matcher } => format!("header '{}' {}", name, matcher.describe()),
            Self::Cookie { name, matcher } => format!("cookie '{}' {}", name, matcher.describe()),
            Self::Body(matcher) => matcher.describe(),
            Self::Predicate { description, .. } => description.clone(),
        }
    }
}

impl fmt::Debug for RequestMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestMatcher({})", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestCookie;
    use serde_json::json;

    fn codecs() -> CodecRegistry {
        CodecRegistry::with_defaults()
    }

    #[test]
    fn test_exact_path_matching() {
        let matcher = RequestMatcher::Path(PathMatcher::exact("/api/users"));
        let hit = RequestView::build(HttpMethod::Get, "/api/users").finish();
        let miss = RequestView::build(HttpMethod::Get, "/api/posts").finish();

        assert!(matcher.matches(&hit, &codecs()));
        assert!(!matcher.matches(&miss, &codecs()));
    }

    #[test]
    fn test_prefix_and_glob_path_matching() {
        let prefix = PathMatcher::prefix("/api/");
        assert!(prefix.matches("/api/users"));
        assert!(!prefix.matches("/other"));

        let glob = PathMatcher::glob("/api/*/detail").unwrap();
        assert!(glob.matches("/api/users/detail"));
        assert!(!glob.matches("/api/users"));
    }

    #[test]
    fn test_regex_path_matching() {
        let matcher = PathMatcher::Regex(Regex::new(r"^/users/\d+$").unwrap());
        assert!(matcher.matches("/users/123"));
        assert!(!matcher.matches("/users/abc"));
    }

    #[test]
    fn test_method_matching() {
        let matcher = RequestMatcher::Method(HttpMethod::Get);
        let get = RequestView::build(HttpMethod::Get, "/x").finish();
        let post = RequestView::build(HttpMethod::Post, "/x").finish();

        assert!(matcher.matches(&get, &codecs()));
        assert!(!matcher.matches(&post, &codecs()));

        let any = RequestMatcher::Method(HttpMethod::Any);
        assert!(any.matches(&post, &codecs()));
    }

    #[test]
    fn test_query_matching() {
        let matcher = RequestMatcher::Query {
            name: "page".to_string(),
            matcher: ParamMatcher::Value(ValueMatcher::exact("1")),
        };

        let hit = RequestView::build(HttpMethod::Get, "/x")
            .query("page", "1")
            .finish();
        let miss = RequestView::build(HttpMethod::Get, "/x")
            .query("page", "2")
            .finish();
        let absent = RequestView::build(HttpMethod::Get, "/x").finish();

        assert!(matcher.matches(&hit, &codecs()));
        assert!(!matcher.matches(&miss, &codecs()));
        assert!(!matcher.matches(&absent, &codecs()));
    }

    #[test]
    fn test_repeated_query_param_matches_any_value() {
        let matcher = RequestMatcher::Query {
            name: "tag".to_string(),
            matcher: ParamMatcher::Value(ValueMatcher::exact("b")),
        };
        let view = RequestView::build(HttpMethod::Get, "/x")
            .query("tag", "a")
            .query("tag", "b")
            .finish();

        assert!(matcher.matches(&view, &codecs()));
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let matcher = RequestMatcher::Header {
            name: "authorization".to_string(),
            matcher: ParamMatcher::Present,
        };
        let view = RequestView::build(HttpMethod::Get, "/x")
            .header("Authorization", "Bearer token")
            .finish();

        assert!(matcher.matches(&view, &codecs()));

        let bare = RequestView::build(HttpMethod::Get, "/x").finish();
        assert!(!matcher.matches(&bare, &codecs()));
    }

    #[test]
    fn test_header_absent_matching() {
        let matcher = RequestMatcher::Header {
            name: "X-Debug".to_string(),
            matcher: ParamMatcher::Absent,
        };
        let bare = RequestView::build(HttpMethod::Get, "/x").finish();
        let with = RequestView::build(HttpMethod::Get, "/x")
            .header("x-debug", "1")
            .finish();

        assert!(matcher.matches(&bare, &codecs()));
        assert!(!matcher.matches(&with, &codecs()));
    }

    #[test]
    fn test_cookie_matching() {
        let matcher = RequestMatcher::Cookie {
            name: "session".to_string(),
            matcher: CookieMatcher::value(ValueMatcher::exact("abc")).with_secure(true),
        };

        let mut cookie = RequestCookie::value("abc");
        cookie.secure = Some(true);
        let hit = RequestView::build(HttpMethod::Get, "/x")
            .cookie("session", cookie)
            .finish();
        assert!(matcher.matches(&hit, &codecs()));

        let miss = RequestView::build(HttpMethod::Get, "/x")
            .cookie("session", RequestCookie::value("abc"))
            .finish();
        assert!(!matcher.matches(&miss, &codecs()));

        let absent = RequestView::build(HttpMethod::Get, "/x").finish();
        assert!(!matcher.matches(&absent, &codecs()));
    }

    #[test]
    fn test_raw_body_matching() {
        let matcher = RequestMatcher::Body(BodyMatcher::raw(&b"exact"[..]));
        let hit = RequestView::build(HttpMethod::Post, "/x")
            .body(&b"exact"[..])
            .finish();
        let miss = RequestView::build(HttpMethod::Post, "/x")
            .body(&b"other"[..])
            .finish();

        assert!(matcher.matches(&hit, &codecs()));
        assert!(!matcher.matches(&miss, &codecs()));
    }

    #[test]
    fn test_decoded_body_matching() {
        let matcher = RequestMatcher::Body(BodyMatcher::decoded(
            "application/json",
            DecodedMatcher::Equals(json!({"name": "John"})),
        ));

        let hit = RequestView::build(HttpMethod::Post, "/x")
            .content_type("application/json; charset=utf-8")
            .body(&br#"{"name": "John"}"#[..])
            .finish();
        assert!(matcher.matches(&hit, &codecs()));

        let wrong_type = RequestView::build(HttpMethod::Post, "/x")
            .content_type("text/plain")
            .body(&br#"{"name": "John"}"#[..])
            .finish();
        assert!(!matcher.matches(&wrong_type, &codecs()));
    }

    #[test]
    fn test_missing_decoder_fails_closed() {
        let matcher = RequestMatcher::Body(BodyMatcher::decoded(
            "application/xml",
            DecodedMatcher::predicate("anything", |_| true),
        ));
        let view = RequestView::build(HttpMethod::Post, "/x")
            .content_type("application/xml")
            .body(&b"<x/>"[..])
            .finish();

        // No xml decoder registered: non-match, not an error.
        assert!(!matcher.matches(&view, &codecs()));
    }

    #[test]
    fn test_json_path_matching() {
        let mut expressions = HashMap::new();
        expressions.insert("$.user.name".to_string(), json!("John"));
        expressions.insert("$.user.id".to_string(), Value::Null);

        let matcher = RequestMatcher::Body(BodyMatcher::decoded(
            "application/json",
            DecodedMatcher::JsonPath { expressions },
        ));

        let hit = RequestView::build(HttpMethod::Post, "/x")
            .content_type("application/json")
            .body(&br#"{"user": {"name": "John", "id": 7}}"#[..])
            .finish();
        assert!(matcher.matches(&hit, &codecs()));

        let miss = RequestView::build(HttpMethod::Post, "/x")
            .content_type("application/json")
            .body(&br#"{"user": {"name": "Jane", "id": 7}}"#[..])
            .finish();
        assert!(!matcher.matches(&miss, &codecs()));
    }

    #[test]
    fn test_json_path_with_scalar_expected_value() {
        // The path library hands back matches wrapped in an array; a scalar
        // expected value must compare against the elements, not the wrapper.
        let mut expressions = HashMap::new();
        expressions.insert("$.user.name".to_string(), json!("John"));
        let matcher = DecodedMatcher::JsonPath { expressions };

        assert!(matcher.matches(&json!({"user": {"name": "John"}})));
        assert!(!matcher.matches(&json!({"user": {"name": "Jane"}})));
    }

    #[test]
    fn test_json_path_matches_any_of_multiple_results() {
        let mut expressions = HashMap::new();
        expressions.insert("$.users[*].name".to_string(), json!("Jane"));
        let matcher = DecodedMatcher::JsonPath { expressions };

        let json = json!({"users": [{"name": "John"}, {"name": "Jane"}]});
        assert!(matcher.matches(&json));

        let miss = json!({"users": [{"name": "John"}]});
        assert!(!matcher.matches(&miss));
    }

    #[test]
    fn test_whole_request_predicate() {
        let matcher = RequestMatcher::predicate("path and query agree", |req| {
            req.path.contains("users") && !req.query.is_empty()
        });
        let hit = RequestView::build(HttpMethod::Get, "/users")
            .query("page", "1")
            .finish();
        let miss = RequestView::build(HttpMethod::Get, "/users").finish();

        assert!(matcher.matches(&hit, &codecs()));
        assert!(!matcher.matches(&miss, &codecs()));
        assert_eq!(matcher.describe(), "path and query agree");
    }

    #[test]
    fn test_descriptions_render() {
        let matcher = RequestMatcher::Header {
            name: "Accept".to_string(),
            matcher: ParamMatcher::Value(ValueMatcher::exact("text/plain")),
        };
        assert_eq!(matcher.describe(), "header 'Accept' 'text/plain'");

        let body = RequestMatcher::Body(BodyMatcher::decoded(
            "application/json",
            DecodedMatcher::Equals(json!(1)),
        ));
        assert_eq!(body.describe(), "body (application/json) equal to 1");
    }
}

//! Declarative expectation configuration.
//!
//! Covers the serializable subset of the matcher and response surface so test
//! fixtures can be loaded from YAML instead of built in code. Closure-based
//! matchers and response functions are registration-API only.

use crate::expectation::{CallConstraint, ExpectationBuilder, RequestExpectation};
use crate::matcher::{BodyMatcher, DecodedMatcher, ParamMatcher, PathMatcher, ValueMatcher};
use crate::registry::ExpectationRegistry;
use crate::request::HttpMethod;
use crate::response::{ResponseBody, ResponseDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A set of expectation definitions loadable from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    #[serde(default)]
    pub expectations: Vec<ExpectationDefinition>,
}

impl MockConfig {
    /// Load and validate a configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every definition without registering anything.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, definition) in self.expectations.iter().enumerate() {
            definition
                .validate()
                .map_err(|e| anyhow::anyhow!("Expectation {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Register every definition, in declaration order, and return the
    /// handles.
    pub fn apply(
        &self,
        registry: &ExpectationRegistry,
    ) -> anyhow::Result<Vec<Arc<RequestExpectation>>> {
        let mut handles = Vec::with_capacity(self.expectations.len());
        for (i, definition) in self.expectations.iter().enumerate() {
            let expectation = definition
                .to_expectation()
                .map_err(|e| anyhow::anyhow!("Expectation {}: {}", i, e))?;
            handles.push(registry.register(expectation));
        }
        Ok(handles)
    }
}

/// One declarative expectation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectationDefinition {
    /// Optional label used in reports.
    #[serde(default)]
    pub label: Option<String>,

    /// HTTP method; defaults to ANY.
    #[serde(default = "default_method")]
    pub method: HttpMethod,

    #[serde(default)]
    pub path: Option<PathDefinition>,

    /// Query parameter matchers by name.
    #[serde(default)]
    pub query: HashMap<String, ParamDefinition>,

    /// Header matchers by name (case-insensitive at match time).
    #[serde(default)]
    pub headers: HashMap<String, ParamDefinition>,

    #[serde(default)]
    pub body: Option<BodyDefinition>,

    /// Call-count constraint; defaults to exactly once.
    #[serde(default)]
    pub calls: Option<CallsDefinition>,

    /// Responses, one per matching call; more than one configures a
    /// sequence whose last element repeats.
    #[serde(default)]
    pub responses: Vec<ResponseDefinition>,
}

fn default_method() -> HttpMethod {
    HttpMethod::Any
}

impl ExpectationDefinition {
    /// Validate patterns, status codes, and the call constraint.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.to_expectation().map(|_| ())
    }

    /// Build the runtime expectation from the definition.
    pub fn to_expectation(&self) -> anyhow::Result<RequestExpectation> {
        let mut builder = ExpectationBuilder::new(self.method);

        if let Some(label) = &self.label {
            builder = builder.label(label.clone());
        }

        if let Some(path) = &self.path {
            builder = builder.path(path.to_matcher()?);
        }

        for (name, definition) in &self.query {
            builder = builder.query(name.clone(), definition.to_matcher()?);
        }
        for (name, definition) in &self.headers {
            builder = builder.header(name.clone(), definition.to_matcher()?);
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.to_matcher());
        }

        if let Some(calls) = &self.calls {
            builder = builder.calls(calls.to_constraint()?);
        }

        for response in &self.responses {
            builder = builder.respond(response.to_descriptor()?);
        }

        Ok(builder.build())
    }
}

/// Path matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathDefinition {
    /// Exact path match.
    Exact { value: String },
    /// Path prefix match.
    Prefix { value: String },
    /// Regex pattern match.
    Regex { pattern: String },
    /// Glob pattern match.
    Glob { pattern: String },
    /// Any path.
    Any,
}

impl PathDefinition {
    fn to_matcher(&self) -> anyhow::Result<PathMatcher> {
        Ok(match self {
            Self::Exact { value } => PathMatcher::exact(value.clone()),
            Self::Prefix { value } => PathMatcher::prefix(value.clone()),
            Self::Regex { pattern } => PathMatcher::Regex(
                regex::Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?,
            ),
            Self::Glob { pattern } => PathMatcher::glob(pattern)
                .map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))?,
            Self::Any => PathMatcher::Any,
        })
    }
}

/// Query parameter and header matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamDefinition {
    /// Exact value match.
    Exact { value: String },
    /// Regex pattern match.
    Regex { pattern: String },
    /// Value must contain substring.
    Contains { value: String },
    /// Attribute must be present (any value).
    Present,
    /// Attribute must be absent.
    Absent,
}

impl ParamDefinition {
    fn to_matcher(&self) -> anyhow::Result<ParamMatcher> {
        Ok(match self {
            Self::Exact { value } => ParamMatcher::Value(ValueMatcher::exact(value.clone())),
            Self::Regex { pattern } => ParamMatcher::Value(ValueMatcher::Regex(
                regex::Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?,
            )),
            Self::Contains { value } => ParamMatcher::Value(ValueMatcher::contains(value.clone())),
            Self::Present => ParamMatcher::Present,
            Self::Absent => ParamMatcher::Absent,
        })
    }
}

/// Body matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyDefinition {
    /// Exact raw body match.
    Exact { value: String },
    /// Body must contain substring.
    Contains { value: String },
    /// Decoded JSON body must equal the value.
    Json { content: serde_json::Value },
    /// JSON path expressions and expected values.
    JsonPath {
        expressions: HashMap<String, serde_json::Value>,
    },
    /// Body must be empty or absent.
    Empty,
}

impl BodyDefinition {
    fn to_matcher(&self) -> BodyMatcher {
        match self {
            Self::Exact { value } => BodyMatcher::raw(value.clone().into_bytes()),
            Self::Contains { value } => {
                let needle = value.clone();
                BodyMatcher::raw_predicate(format!("containing '{}'", value), move |body| {
                    std::str::from_utf8(body)
                        .map(|text| text.contains(&needle))
                        .unwrap_or(false)
                })
            }
            Self::Json { content } => BodyMatcher::decoded(
                "application/json",
                DecodedMatcher::Equals(content.clone()),
            ),
            Self::JsonPath { expressions } => BodyMatcher::decoded(
                "application/json",
                DecodedMatcher::JsonPath {
                    expressions: expressions.clone(),
                },
            ),
            Self::Empty => BodyMatcher::raw_predicate("is empty", |body| body.is_empty()),
        }
    }
}

/// Call-count constraint: a bare integer means exactly that many calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallsDefinition {
    Exactly(u32),
    Range {
        #[serde(default)]
        min: u32,
        #[serde(default)]
        max: Option<u32>,
    },
}

impl CallsDefinition {
    fn to_constraint(&self) -> anyhow::Result<CallConstraint> {
        match self {
            Self::Exactly(count) => Ok(CallConstraint::exactly(*count)),
            Self::Range {
                min,
                max: Some(max),
            } => CallConstraint::between(*min, *max)
                .map_err(|e| anyhow::anyhow!("Invalid calls range: {}", e)),
            Self::Range { min, max: None } => Ok(CallConstraint::at_least(*min)),
        }
    }
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code.
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers, in order; names may repeat.
    #[serde(default)]
    pub headers: Vec<HeaderDefinition>,

    /// Response body.
    #[serde(default)]
    pub body: Option<ResponseBodyDefinition>,
}

fn default_status() -> u16 {
    200
}

/// One response header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderDefinition {
    pub name: String,
    pub value: String,
}

impl ResponseDefinition {
    fn to_descriptor(&self) -> anyhow::Result<ResponseDescriptor> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }

        let mut descriptor = ResponseDescriptor::status(self.status);
        for header in &self.headers {
            descriptor = descriptor.with_header(header.name.clone(), header.value.clone());
        }
        if let Some(body) = &self.body {
            let has_content_type = self
                .headers
                .iter()
                .any(|h| h.name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                if let Some(content_type) = body.content_type() {
                    descriptor = descriptor.with_header("Content-Type", content_type);
                }
            }
            descriptor = descriptor.with_body(body.to_body()?);
        }
        Ok(descriptor)
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBodyDefinition {
    /// Plain text body.
    Text { content: String },
    /// JSON body, encoded through the codec registry at send time.
    Json { content: serde_json::Value },
    /// Base64 encoded binary.
    Base64 { content: String },
    /// Load from file.
    File { path: String },
}

impl ResponseBodyDefinition {
    fn to_body(&self) -> anyhow::Result<ResponseBody> {
        Ok(match self {
            Self::Text { content } => ResponseBody::Bytes(content.clone().into_bytes()),
            Self::Json { content } => ResponseBody::Encoded {
                content_type: "application/json".to_string(),
                value: content.clone(),
            },
            Self::Base64 { content } => {
                use base64::Engine;
                ResponseBody::Bytes(
                    base64::engine::general_purpose::STANDARD
                        .decode(content)
                        .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))?,
                )
            }
            Self::File { path } => ResponseBody::Bytes(
                std::fs::read(path)
                    .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path, e))?,
            ),
        })
    }

    /// Content type implied by the body kind, when not set explicitly.
    fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Text { .. } => Some("text/plain"),
            // Json bodies get their content type from the encoder.
            Self::Json { .. } => None,
            Self::Base64 { .. } => Some("application/octet-stream"),
            Self::File { .. } => Some("application/octet-stream"),
        }
    }
}

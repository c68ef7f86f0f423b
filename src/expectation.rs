//! Request expectations: matcher set, call constraint, response strategy.

use crate::codec::CodecRegistry;
use crate::error::EngineError;
use crate::matcher::{BodyMatcher, CookieMatcher, ParamMatcher, PathMatcher, RequestMatcher};
use crate::request::{HttpMethod, RequestView};
use crate::response::ResponseDescriptor;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Inclusive `[min, max]` bound on how many times an expectation should
/// match. `max` of `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallConstraint {
    min: u32,
    max: Option<u32>,
}

impl CallConstraint {
    /// Exactly once; the default for new expectations.
    pub fn once() -> Self {
        Self::exactly(1)
    }

    pub fn exactly(count: u32) -> Self {
        Self {
            min: count,
            max: Some(count),
        }
    }

    pub fn at_least(min: u32) -> Self {
        Self { min, max: None }
    }

    pub fn at_most(max: u32) -> Self {
        Self {
            min: 0,
            max: Some(max),
        }
    }

    /// Any call count is acceptable, including zero.
    pub fn any() -> Self {
        Self { min: 0, max: None }
    }

    /// Inclusive range; fails when `min > max`.
    pub fn between(min: u32, max: u32) -> Result<Self, EngineError> {
        if min > max {
            return Err(EngineError::InvalidConstraint { min, max });
        }
        Ok(Self {
            min,
            max: Some(max),
        })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    pub fn is_satisfied_by(&self, actual: u32) -> bool {
        actual >= self.min && self.max.map_or(true, |max| actual <= max)
    }
}

impl Default for CallConstraint {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for CallConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (min, Some(max)) if min == max => write!(f, "exactly {}", min),
            (0, Some(max)) => write!(f, "at most {}", max),
            (min, None) => write!(f, "at least {}", min),
            (min, Some(max)) => write!(f, "between {} and {}", min, max),
        }
    }
}

/// A caller-supplied response function. Failures are surfaced as
/// [`EngineError::UserResponse`], never as a process fault.
pub type ResponseFn = Arc<
    dyn Fn(&RequestView) -> Result<ResponseDescriptor, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// Callback fired after an expectation is marked.
pub type RequestListener = Arc<dyn Fn(&RequestView) + Send + Sync>;

/// How a matched expectation produces its response.
#[derive(Clone)]
pub enum ResponseStrategy {
    /// The same descriptor for every call.
    Static(ResponseDescriptor),
    /// One descriptor per call in order; the last element repeats once the
    /// sequence is exhausted.
    Sequence(Vec<ResponseDescriptor>),
    /// Computed from the request by caller logic.
    Fn(ResponseFn),
}

impl fmt::Debug for ResponseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("ResponseStrategy::Static"),
            Self::Sequence(seq) => write!(f, "ResponseStrategy::Sequence({})", seq.len()),
            Self::Fn(_) => f.write_str("ResponseStrategy::Fn"),
        }
    }
}

/// A registered rule: which requests it matches, how often it should match,
/// and what to respond.
///
/// The matcher set is immutable after construction; only the call counter
/// mutates during traffic, atomically. Expectations remain matchable after
/// their constraint's max is reached; over-matching is reported at
/// verification time, not rejected at dispatch time.
pub struct RequestExpectation {
    label: Option<String>,
    method: HttpMethod,
    matchers: Vec<RequestMatcher>,
    constraint: CallConstraint,
    strategy: ResponseStrategy,
    listeners: Vec<RequestListener>,
    counter: AtomicU32,
}

impl RequestExpectation {
    /// Start building an expectation for the given method.
    pub fn builder(method: HttpMethod) -> ExpectationBuilder {
        ExpectationBuilder::new(method)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn constraint(&self) -> CallConstraint {
        self.constraint
    }

    /// AND of the whole matcher set, including the method. Absent request
    /// attributes evaluate false; this never errors.
    pub fn matches(&self, request: &RequestView, codecs: &CodecRegistry) -> bool {
        self.matchers.iter().all(|m| m.matches(request, codecs))
    }

    /// The configured matchers (for reports).
    pub fn matchers(&self) -> &[RequestMatcher] {
        &self.matchers
    }

    /// Record a match: atomically increment the counter and return its value
    /// prior to the increment. Listeners run after the increment. Two
    /// concurrent callers always receive distinct call indexes.
    pub fn mark(&self, request: &RequestView) -> u32 {
        let prior = self.counter.fetch_add(1, Ordering::Relaxed);
        for listener in &self.listeners {
            listener(request);
        }
        prior
    }

    /// Current call count.
    pub fn call_count(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Produce the descriptor for the call with the given index (the counter
    /// value before it was incremented, as returned by [`mark`](Self::mark)).
    pub fn response_for(
        &self,
        call_index: u32,
        request: &RequestView,
    ) -> Result<ResponseDescriptor, EngineError> {
        match &self.strategy {
            ResponseStrategy::Static(descriptor) => Ok(descriptor.clone()),
            ResponseStrategy::Sequence(sequence) => {
                // Clamp to the last element once the sequence is exhausted.
                let index = (call_index as usize).min(sequence.len().saturating_sub(1));
                match sequence.get(index) {
                    Some(descriptor) => Ok(descriptor.clone()),
                    None => Ok(ResponseDescriptor::status(204)),
                }
            }
            ResponseStrategy::Fn(f) => {
                f(request).map_err(|source| EngineError::UserResponse { source })
            }
        }
    }

    /// Whether the current call count satisfies the constraint.
    pub fn verify(&self) -> bool {
        self.constraint.is_satisfied_by(self.call_count())
    }

    /// Reset the call counter to zero. Used by the registry between runs.
    pub(crate) fn reset_counter(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }

    /// One-line rendering of the matcher set and constraint.
    pub fn describe(&self) -> String {
        let matchers = self
            .matchers
            .iter()
            .map(|m| m.describe())
            .collect::<Vec<_>>()
            .join(", ");
        match &self.label {
            Some(label) => format!("{}: {}, called {}", label, matchers, self.constraint),
            None => format!("{}, called {}", matchers, self.constraint),
        }
    }
}

impl fmt::Debug for RequestExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestExpectation({})", self.describe())
    }
}

/// Builder for [`RequestExpectation`]. The method matcher is always present;
/// everything else is optional. Calling [`respond`](Self::respond) more than
/// once configures a sequenced response, one descriptor per matching call.
pub struct ExpectationBuilder {
    label: Option<String>,
    method: HttpMethod,
    matchers: Vec<RequestMatcher>,
    constraint: CallConstraint,
    responses: Vec<ResponseDescriptor>,
    response_fn: Option<ResponseFn>,
    listeners: Vec<RequestListener>,
}

impl ExpectationBuilder {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            label: None,
            method,
            matchers: vec![RequestMatcher::Method(method)],
            constraint: CallConstraint::default(),
            responses: Vec::new(),
            response_fn: None,
            listeners: Vec::new(),
        }
    }

    /// Optional label used in verification and unmatched reports.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn path(mut self, matcher: PathMatcher) -> Self {
        self.matchers.push(RequestMatcher::Path(matcher));
        self
    }

    pub fn query(mut self, name: impl Into<String>, matcher: ParamMatcher) -> Self {
        self.matchers.push(RequestMatcher::Query {
            name: name.into(),
            matcher,
        });
        self
    }

    pub fn header(mut self, name: impl Into<String>, matcher: ParamMatcher) -> Self {
        self.matchers.push(RequestMatcher::Header {
            name: name.into(),
            matcher,
        });
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, matcher: CookieMatcher) -> Self {
        self.matchers.push(RequestMatcher::Cookie {
            name: name.into(),
            matcher,
        });
        self
    }

    pub fn body(mut self, matcher: BodyMatcher) -> Self {
        self.matchers.push(RequestMatcher::Body(matcher));
        self
    }

    /// Append any matcher, including whole-request predicates.
    pub fn matcher(mut self, matcher: RequestMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn calls(mut self, constraint: CallConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Append a response descriptor. A single call configures a static
    /// response; repeated calls configure a sequence consumed one per match,
    /// repeating the last element once exhausted.
    pub fn respond(mut self, descriptor: ResponseDescriptor) -> Self {
        self.responses.push(descriptor);
        self
    }

    /// Compute the response from the request with caller logic. Replaces any
    /// configured descriptors.
    pub fn respond_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestView) -> Result<ResponseDescriptor, Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        self.response_fn = Some(Arc::new(f));
        self
    }

    /// Register a callback fired after each match is recorded.
    pub fn listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestView) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(f));
        self
    }

    pub fn build(self) -> RequestExpectation {
        let strategy = match (self.response_fn, self.responses) {
            (Some(f), _) => ResponseStrategy::Fn(f),
            // An unconfigured response answers 204 No Content.
            (None, responses) if responses.is_empty() => {
                ResponseStrategy::Static(ResponseDescriptor::status(204))
            }
            (None, mut responses) if responses.len() == 1 => {
                ResponseStrategy::Static(responses.remove(0))
            }
            (None, responses) => ResponseStrategy::Sequence(responses),
        };

        RequestExpectation {
            label: self.label,
            method: self.method,
            matchers: self.matchers,
            constraint: self.constraint,
            strategy,
            listeners: self.listeners,
            counter: AtomicU32::new(0),
        }
    }
}

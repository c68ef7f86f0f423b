//! Ordered expectation registry: registration, resolution, verification.

use crate::codec::CodecRegistry;
use crate::expectation::{CallConstraint, RequestExpectation};
use crate::report;
use crate::request::RequestView;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Outcome of verifying one expectation's call count.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Position in registration order.
    pub index: usize,
    pub label: Option<String>,
    /// Rendered matcher set, for failure reporting.
    pub description: String,
    pub expected: CallConstraint,
    pub actual: u32,
    pub satisfied: bool,
}

/// Registration-ordered collection of expectations.
///
/// Resolution walks the expectations in registration order and returns the
/// first whose full matcher set passes. There is no specificity scoring;
/// precedence is controlled by registration order alone, so authors order
/// general and specific expectations deliberately. Duplicates are legal.
///
/// `register` and `reset` are meant for quiescent setup/teardown phases;
/// `resolve` supports any number of concurrent callers.
pub struct ExpectationRegistry {
    expectations: RwLock<Vec<Arc<RequestExpectation>>>,
    codecs: Arc<CodecRegistry>,
}

impl ExpectationRegistry {
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            expectations: RwLock::new(Vec::new()),
            codecs,
        }
    }

    /// Registry with the stock codecs registered.
    pub fn with_default_codecs() -> Self {
        Self::new(Arc::new(CodecRegistry::with_defaults()))
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Append an expectation and return a handle to it. No de-duplication;
    /// evaluation order is registration order.
    pub fn register(&self, expectation: RequestExpectation) -> Arc<RequestExpectation> {
        let handle = Arc::new(expectation);
        let mut expectations = self.expectations.write().expect("registry poisoned");
        expectations.push(Arc::clone(&handle));
        debug!(
            index = expectations.len() - 1,
            expectation = %handle.describe(),
            "Expectation registered"
        );
        handle
    }

    /// Find the first expectation, in registration order, whose matcher set
    /// fully matches the request. Returns `None` when nothing matches.
    pub fn resolve(&self, request: &RequestView) -> Option<Arc<RequestExpectation>> {
        let expectations = self.expectations.read().expect("registry poisoned");
        expectations
            .iter()
            .find(|e| e.matches(request, &self.codecs))
            .map(Arc::clone)
    }

    /// Snapshot of the registered expectations in registration order.
    pub fn expectations(&self) -> Vec<Arc<RequestExpectation>> {
        self.expectations
            .read()
            .expect("registry poisoned")
            .clone()
    }

    /// Number of registered expectations.
    pub fn len(&self) -> usize {
        self.expectations.read().expect("registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the diagnostic for a request that matched nothing: the request
    /// summary plus every registered expectation and which of its matchers
    /// failed.
    pub fn describe_unmatched(&self, request: &RequestView) -> String {
        report::unmatched_report(request, &self.expectations(), &self.codecs)
    }

    /// Remove all expectations and their counters. Used between test runs;
    /// registered codecs are kept.
    pub fn reset(&self) {
        let mut expectations = self.expectations.write().expect("registry poisoned");
        for expectation in expectations.iter() {
            expectation.reset_counter();
        }
        expectations.clear();
        debug!("Expectation registry reset");
    }

    /// Evaluate every expectation's call constraint, in registration order.
    /// Read-only: counters are not reset.
    pub fn verify_all(&self) -> Vec<VerificationResult> {
        self.expectations()
            .iter()
            .enumerate()
            .map(|(index, expectation)| {
                let actual = expectation.call_count();
                VerificationResult {
                    index,
                    label: expectation.label().map(String::from),
                    description: expectation.describe(),
                    expected: expectation.constraint(),
                    actual,
                    satisfied: expectation.constraint().is_satisfied_by(actual),
                }
            })
            .collect()
    }

    /// Whether every expectation's constraint is satisfied.
    pub fn all_satisfied(&self) -> bool {
        self.expectations().iter().all(|e| e.verify())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{ParamMatcher, PathMatcher, ValueMatcher};
    use crate::request::HttpMethod;
    use crate::response::ResponseDescriptor;

    fn registry() -> ExpectationRegistry {
        ExpectationRegistry::with_default_codecs()
    }

    fn get(path: &str) -> RequestView {
        RequestView::build(HttpMethod::Get, path).finish()
    }

    #[test]
    fn test_resolve_returns_sole_match_regardless_of_order() {
        let registry = registry();
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .label("a")
                .path(PathMatcher::exact("/a"))
                .build(),
        );
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .label("b")
                .path(PathMatcher::exact("/b"))
                .build(),
        );
        registry.register(
            RequestExpectation::builder(HttpMethod::Post)
                .label("c")
                .path(PathMatcher::exact("/b"))
                .build(),
        );

        let resolved = registry.resolve(&get("/b")).unwrap();
        assert_eq!(resolved.label(), Some("b"));
    }

    #[test]
    fn test_first_registered_wins_over_more_specific() {
        let registry = registry();
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .label("wildcard")
                .path(PathMatcher::prefix("/x"))
                .build(),
        );
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .label("exact")
                .path(PathMatcher::exact("/x/y"))
                .build(),
        );

        // Declaration order decides, not matcher precision.
        let resolved = registry.resolve(&get("/x/y")).unwrap();
        assert_eq!(resolved.label(), Some("wildcard"));
    }

    #[test]
    fn test_duplicates_are_legal_and_first_wins() {
        let registry = registry();
        let first = registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .path(PathMatcher::exact("/dup"))
                .build(),
        );
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .path(PathMatcher::exact("/dup"))
                .build(),
        );

        let resolved = registry.resolve(&get("/dup")).unwrap();
        assert!(Arc::ptr_eq(&resolved, &first));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_none_when_nothing_matches() {
        let registry = registry();
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .path(PathMatcher::exact("/known"))
                .build(),
        );
        assert!(registry.resolve(&get("/unknown")).is_none());
    }

    #[test]
    fn test_method_filtering() {
        let registry = registry();
        registry.register(
            RequestExpectation::builder(HttpMethod::Post)
                .path(PathMatcher::exact("/submit"))
                .build(),
        );
        registry.register(
            RequestExpectation::builder(HttpMethod::Any)
                .label("any")
                .path(PathMatcher::exact("/submit"))
                .build(),
        );

        // GET skips the POST expectation and lands on the ANY one.
        let resolved = registry.resolve(&get("/submit")).unwrap();
        assert_eq!(resolved.label(), Some("any"));
    }

    #[test]
    fn test_verify_all_reports_in_registration_order() {
        let registry = registry();
        let first = registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .label("first")
                .path(PathMatcher::exact("/1"))
                .calls(CallConstraint::once())
                .build(),
        );
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .label("second")
                .path(PathMatcher::exact("/2"))
                .calls(CallConstraint::once())
                .build(),
        );

        first.mark(&get("/1"));

        let results = registry.verify_all();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label.as_deref(), Some("first"));
        assert!(results[0].satisfied);
        assert_eq!(results[0].actual, 1);
        assert_eq!(results[1].label.as_deref(), Some("second"));
        assert!(!results[1].satisfied);
        assert_eq!(results[1].actual, 0);

        assert!(!registry.all_satisfied());
    }

    #[test]
    fn test_verification_is_read_only() {
        let registry = registry();
        let handle = registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .path(PathMatcher::exact("/x"))
                .build(),
        );
        handle.mark(&get("/x"));

        registry.verify_all();
        registry.verify_all();
        assert_eq!(handle.call_count(), 1);
    }

    #[test]
    fn test_reset_clears_expectations_and_counters() {
        let registry = registry();
        let handle = registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .path(PathMatcher::exact("/x"))
                .build(),
        );
        handle.mark(&get("/x"));

        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(handle.call_count(), 0);
        assert!(registry.resolve(&get("/x")).is_none());
    }

    #[test]
    fn test_describe_unmatched_names_failed_matchers() {
        let registry = registry();
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .label("hello")
                .path(PathMatcher::exact("/hello"))
                .header(
                    "Accept",
                    ParamMatcher::Value(ValueMatcher::exact("text/plain")),
                )
                .build(),
        );

        let diagnostic = registry.describe_unmatched(&get("/other"));
        assert!(diagnostic.contains("Unmatched Request"));
        assert!(diagnostic.contains("GET /other"));
        assert!(diagnostic.contains("path '/hello'"));
        assert!(diagnostic.contains("header 'Accept'"));
    }

    #[test]
    fn test_concurrent_resolution() {
        let registry = Arc::new(registry());
        registry.register(
            RequestExpectation::builder(HttpMethod::Get)
                .path(PathMatcher::exact("/shared"))
                .respond(ResponseDescriptor::text("hi"))
                .calls(CallConstraint::any())
                .build(),
        );

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    for _ in 0..32 {
                        let resolved = registry.resolve(&get("/shared"));
                        assert!(resolved.is_some());
                    }
                });
            }
        });
    }
}

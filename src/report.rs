//! Diagnostic reports: unmatched requests and verification failures.

use crate::codec::CodecRegistry;
use crate::expectation::RequestExpectation;
use crate::registry::VerificationResult;
use crate::request::RequestView;
use std::fmt::Write;
use std::sync::Arc;

const CHECKMARK: &str = "+";
const CROSS: &str = "X";

// Content types whose bodies render as text in reports.
const TEXT_CONTENT_HINTS: [&str; 3] = ["text/", "/json", "application/x-www-form-urlencoded"];

/// Render the report for a request that matched no expectation: a summary of
/// the request followed by every registered expectation with a pass/fail mark
/// per matcher.
pub fn unmatched_report(
    request: &RequestView,
    expectations: &[Arc<RequestExpectation>],
    codecs: &CodecRegistry,
) -> String {
    let mut out = String::new();

    out.push_str("# Unmatched Request\n\n");
    let _ = writeln!(out, "{}", request.summary());

    if !request.headers.is_empty() {
        out.push_str("Headers:\n");
        for (name, value) in &request.headers {
            let _ = writeln!(out, " - {}: {}", name, value);
        }
    }

    if !request.cookies.is_empty() {
        out.push_str("Cookies:\n");
        let mut names: Vec<_> = request.cookies.keys().collect();
        names.sort();
        for name in names {
            let cookie = &request.cookies[name];
            let _ = writeln!(
                out,
                " - {} ({}, {}): {}",
                name,
                cookie.domain.as_deref().unwrap_or("-"),
                cookie.path.as_deref().unwrap_or("-"),
                cookie.value
            );
        }
    }

    if let Some(content_type) = &request.content_type {
        let _ = writeln!(out, "Content-Type: {}", content_type);
    }

    if let Some(body) = &request.body {
        let _ = writeln!(out, "Content-Length: {}", body.len());
        out.push_str("Content:\n");
        let textual = request
            .content_type
            .as_deref()
            .map(|ct| TEXT_CONTENT_HINTS.iter().any(|hint| ct.contains(hint)))
            .unwrap_or(false);
        if textual {
            let _ = writeln!(out, "  {}", String::from_utf8_lossy(body));
        } else {
            let _ = writeln!(out, "  {:?}", body);
        }
    }

    out.push_str("\n# Expectations\n\n");

    if expectations.is_empty() {
        out.push_str("(none registered)\n");
        return out;
    }

    for (index, expectation) in expectations.iter().enumerate() {
        let matchers = expectation.matchers();
        match expectation.label() {
            Some(label) => {
                let _ = writeln!(
                    out,
                    "Expectation {} '{}' ({} matchers):",
                    index,
                    label,
                    matchers.len()
                );
            }
            None => {
                let _ = writeln!(out, "Expectation {} ({} matchers):", index, matchers.len());
            }
        }

        let mut failed = 0;
        for matcher in matchers {
            if matcher.matches(request, codecs) {
                let _ = writeln!(out, "  {} {}", CHECKMARK, matcher.describe());
            } else {
                let _ = writeln!(out, "  {} {}", CROSS, matcher.describe());
                failed += 1;
            }
        }
        let _ = writeln!(
            out,
            "  ({} matchers: {} matched, {} failed)\n",
            matchers.len(),
            matchers.len() - failed,
            failed
        );
    }

    out
}

/// Render verification results, one line per expectation in registration
/// order, marking expected versus actual call counts.
pub fn verification_report(results: &[VerificationResult]) -> String {
    let mut out = String::new();
    out.push_str("# Verification\n\n");

    for result in results {
        let mark = if result.satisfied { CHECKMARK } else { CROSS };
        let _ = writeln!(
            out,
            "{} Expectation {}: expected {} calls, got {} -> {}",
            mark,
            result.index,
            result.expected,
            result.actual,
            result.description
        );
    }

    let failures = results.iter().filter(|r| !r.satisfied).count();
    let _ = writeln!(
        out,
        "\n({} expectations: {} satisfied, {} failed)",
        results.len(),
        results.len() - failures,
        failures
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::CallConstraint;
    use crate::matcher::{ParamMatcher, PathMatcher, ValueMatcher};
    use crate::request::HttpMethod;

    #[test]
    fn test_unmatched_report_marks_pass_and_fail() {
        let codecs = CodecRegistry::with_defaults();
        let expectation = Arc::new(
            RequestExpectation::builder(HttpMethod::Get)
                .path(PathMatcher::exact("/hello"))
                .header(
                    "Accept",
                    ParamMatcher::Value(ValueMatcher::exact("text/plain")),
                )
                .build(),
        );

        // Path matches, header does not.
        let request = RequestView::build(HttpMethod::Get, "/hello").finish();
        let report = unmatched_report(&request, &[expectation], &codecs);

        assert!(report.contains("+ method is GET"));
        assert!(report.contains("+ path '/hello'"));
        assert!(report.contains("X header 'Accept'"));
        assert!(report.contains("(3 matchers: 2 matched, 1 failed)"));
    }

    #[test]
    fn test_unmatched_report_renders_request_details() {
        let codecs = CodecRegistry::with_defaults();
        let request = RequestView::build(HttpMethod::Post, "/submit")
            .query("page", "1")
            .header("Content-Type", "application/json")
            .content_type("application/json")
            .body(&br#"{"a":1}"#[..])
            .finish();

        let report = unmatched_report(&request, &[], &codecs);
        assert!(report.contains("POST /submit ? page=1"));
        assert!(report.contains("Content-Type: application/json"));
        assert!(report.contains(r#"{"a":1}"#));
        assert!(report.contains("(none registered)"));
    }

    #[test]
    fn test_verification_report_counts_failures() {
        let results = vec![
            VerificationResult {
                index: 0,
                label: None,
                description: "method is GET, called exactly 1".to_string(),
                expected: CallConstraint::once(),
                actual: 1,
                satisfied: true,
            },
            VerificationResult {
                index: 1,
                label: Some("extra".to_string()),
                description: "extra: method is GET, called exactly 1".to_string(),
                expected: CallConstraint::once(),
                actual: 2,
                satisfied: false,
            },
        ];

        let report = verification_report(&results);
        assert!(report.contains("+ Expectation 0: expected exactly 1 calls, got 1"));
        assert!(report.contains("X Expectation 1: expected exactly 1 calls, got 2"));
        assert!(report.contains("(2 expectations: 1 satisfied, 1 failed)"));
    }
}

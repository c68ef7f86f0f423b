//! Transport-facing dispatch engine.
//!
//! The transport hands each inbound request to [`MockEngine::dispatch`] and
//! receives either a fully encoded response or an unmatched outcome with a
//! diagnostic. Dispatch is safe under any number of concurrent callers; the
//! only suspension points are caller-supplied response functions and the
//! proxy forwarder, and no lock is held across either.

use crate::codec::CodecRegistry;
use crate::error::EngineError;
use crate::expectation::RequestExpectation;
use crate::proxy::{ProxyForwarder, ProxyMode};
use crate::registry::{ExpectationRegistry, VerificationResult};
use crate::report;
use crate::request::RequestView;
use crate::response::{HttpResponse, ResponseBody, ResponseDescriptor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of dispatching one request.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// An expectation matched; its response was built and encoded.
    Matched(HttpResponse),
    /// Proxy mode forwarded the request; the upstream response is passed
    /// through uninterpreted.
    Forwarded(HttpResponse),
    /// No expectation matched. The transport decides how to render this
    /// (typically a fixed not-found response); the diagnostic lists every
    /// registered expectation and which matchers failed.
    Unmatched { diagnostic: String },
}

/// The expectation-matching engine for one mock server lifecycle.
///
/// Owns the expectation registry and codec registry; the transport layer
/// holds this by `Arc` and calls [`dispatch`](Self::dispatch) per request.
/// Verification and reset are explicit calls made while no traffic is in
/// flight.
pub struct MockEngine {
    registry: ExpectationRegistry,
    codecs: Arc<CodecRegistry>,
    forwarder: Option<Arc<dyn ProxyForwarder>>,
    proxy_mode: ProxyMode,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
    requests_forwarded: AtomicU64,
}

impl MockEngine {
    /// Engine with the stock codecs and no proxy.
    pub fn new() -> Self {
        Self::with_codecs(Arc::new(CodecRegistry::with_defaults()))
    }

    /// Engine over a caller-owned codec registry.
    pub fn with_codecs(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            registry: ExpectationRegistry::new(Arc::clone(&codecs)),
            codecs,
            forwarder: None,
            proxy_mode: ProxyMode::Off,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            requests_forwarded: AtomicU64::new(0),
        }
    }

    /// Enable proxy mode with the given forwarder.
    pub fn with_forwarder(mut self, forwarder: Arc<dyn ProxyForwarder>, mode: ProxyMode) -> Self {
        self.forwarder = Some(forwarder);
        self.proxy_mode = mode;
        self
    }

    pub fn registry(&self) -> &ExpectationRegistry {
        &self.registry
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Register an expectation; sugar over `registry().register`.
    pub fn register(&self, expectation: RequestExpectation) -> Arc<RequestExpectation> {
        self.registry.register(expectation)
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    pub fn total_forwarded(&self) -> u64 {
        self.requests_forwarded.load(Ordering::Relaxed)
    }

    /// Dispatch one inbound request.
    ///
    /// Resolution walks registration order and the first full match wins. The
    /// match is recorded before the response is built so that sequenced
    /// responses hand each concurrent caller a distinct element. A failing
    /// user response function becomes a 500 response with the cause attached;
    /// a missing encoder aborts this dispatch with a configuration error.
    pub async fn dispatch(&self, request: &RequestView) -> Result<DispatchOutcome, EngineError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        debug!(request = %request.summary(), "Dispatching request");

        if self.proxy_mode == ProxyMode::All {
            if let Some(forwarder) = &self.forwarder {
                return self.forward(forwarder, request).await;
            }
        }

        match self.registry.resolve(request) {
            Some(expectation) => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                let call_index = expectation.mark(request);
                info!(
                    expectation = %expectation.describe(),
                    call = call_index + 1,
                    "Request matched expectation"
                );

                let descriptor = match expectation.response_for(call_index, request) {
                    Ok(descriptor) => descriptor,
                    Err(EngineError::UserResponse { source }) => {
                        warn!(error = %source, "User response function failed");
                        user_error_response(source.as_ref())
                    }
                    Err(other) => return Err(other),
                };

                let response = descriptor.encode(&self.codecs)?;
                Ok(DispatchOutcome::Matched(response))
            }
            None => {
                if self.proxy_mode == ProxyMode::Unmatched {
                    if let Some(forwarder) = &self.forwarder {
                        return self.forward(forwarder, request).await;
                    }
                }

                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                let diagnostic = self.registry.describe_unmatched(request);
                warn!(request = %request.summary(), "No matching expectation");
                Ok(DispatchOutcome::Unmatched { diagnostic })
            }
        }
    }

    async fn forward(
        &self,
        forwarder: &Arc<dyn ProxyForwarder>,
        request: &RequestView,
    ) -> Result<DispatchOutcome, EngineError> {
        self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
        debug!(request = %request.summary(), "Forwarding request to upstream");

        let descriptor = forwarder
            .forward(request)
            .await
            .map_err(|e| EngineError::Proxy(e.to_string()))?;
        let response = descriptor.encode(&self.codecs)?;
        Ok(DispatchOutcome::Forwarded(response))
    }

    /// Verify every expectation's call constraint, in registration order.
    pub fn verify_all(&self) -> Vec<VerificationResult> {
        self.registry.verify_all()
    }

    /// Whether every expectation's constraint is satisfied.
    pub fn all_satisfied(&self) -> bool {
        self.registry.all_satisfied()
    }

    /// Rendered verification report for failure messages.
    pub fn verification_report(&self) -> String {
        report::verification_report(&self.verify_all())
    }

    /// Clear all expectations, their counters, and the engine's own request
    /// counters. Registered codecs are kept.
    pub fn reset(&self) {
        self.registry.reset();
        self.requests_total.store(0, Ordering::Relaxed);
        self.requests_matched.store(0, Ordering::Relaxed);
        self.requests_unmatched.store(0, Ordering::Relaxed);
        self.requests_forwarded.store(0, Ordering::Relaxed);
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn user_error_response(cause: &(dyn std::error::Error + Send + Sync)) -> ResponseDescriptor {
    ResponseDescriptor::status(500)
        .with_header("Content-Type", "text/plain")
        .with_body(ResponseBody::Bytes(
            format!("user response function failed: {}", cause).into_bytes(),
        ))
}

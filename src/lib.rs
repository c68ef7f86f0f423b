//! Standin - programmable HTTP mock server core.
//!
//! A test suite registers expectations (request matchers, a call-count
//! constraint, and a response), points the code under test at the mock's
//! transport, and afterwards verifies that the expected traffic occurred.
//! This crate is the matching and verification engine; the HTTP listener,
//! TLS, and wire transport are collaborators that exchange [`RequestView`]s
//! and [`DispatchOutcome`]s with it.
//!
//! # Features
//!
//! - **Request Matching**: method, path, query params, headers, cookies, and
//!   raw or decoded bodies, including closure-based predicates
//! - **Ordered Resolution**: first registered full match wins; precedence is
//!   controlled by registration order, never by specificity scoring
//! - **Call Verification**: per-expectation call counts checked against
//!   `[min, max]` constraints after traffic settles
//! - **Sequenced Responses**: one descriptor per call, last element repeating
//! - **Codecs**: content-type keyed decode/encode functions for body matching
//!   and response building
//! - **Proxy Mode**: unmatched (or all) requests forwarded to a real upstream
//! - **Declarative Config**: the serializable subset loadable from YAML
//!
//! # Example
//!
//! ```
//! use standin::{
//!     CallConstraint, DispatchOutcome, HttpMethod, MockEngine, ParamMatcher,
//!     PathMatcher, RequestExpectation, RequestView, ResponseDescriptor, ValueMatcher,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = MockEngine::new();
//! engine.register(
//!     RequestExpectation::builder(HttpMethod::Get)
//!         .path(PathMatcher::exact("/hello"))
//!         .header("Accept", ParamMatcher::Value(ValueMatcher::exact("text/plain")))
//!         .calls(CallConstraint::once())
//!         .respond(ResponseDescriptor::text("hi"))
//!         .build(),
//! );
//!
//! let request = RequestView::build(HttpMethod::Get, "/hello")
//!     .header("Accept", "text/plain")
//!     .finish();
//! match engine.dispatch(&request).await.unwrap() {
//!     DispatchOutcome::Matched(response) => assert_eq!(response.body_text(), "hi"),
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! assert!(engine.all_satisfied());
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod expectation;
pub mod matcher;
pub mod proxy;
pub mod registry;
pub mod report;
pub mod request;
pub mod response;

pub use codec::CodecRegistry;
pub use config::MockConfig;
pub use engine::{DispatchOutcome, MockEngine};
pub use error::{CodecError, EngineError};
pub use expectation::{CallConstraint, ExpectationBuilder, RequestExpectation, ResponseStrategy};
pub use matcher::{
    BodyMatcher, CookieMatcher, DecodedMatcher, ParamMatcher, PathMatcher, RequestMatcher,
    ValueMatcher,
};
pub use proxy::{ProxyForwarder, ProxyMode};
pub use registry::{ExpectationRegistry, VerificationResult};
pub use request::{HttpMethod, RequestCookie, RequestView};
pub use response::{HttpResponse, ResponseBody, ResponseCookie, ResponseDescriptor};

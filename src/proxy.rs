//! Proxy forwarding collaborator contract.
//!
//! In proxy mode the engine yields requests it will not answer itself to a
//! forwarder and passes its response through uninterpreted. The actual
//! upstream transport lives outside the core; this module only defines the
//! seam.

use crate::request::RequestView;
use crate::response::ResponseDescriptor;
use async_trait::async_trait;

/// Which requests are handed to the forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyMode {
    /// Never forward.
    #[default]
    Off,
    /// Forward only requests no expectation matches.
    Unmatched,
    /// Forward every request without consulting expectations.
    All,
}

/// Forwards a request to a real upstream and returns its response.
///
/// May block on network I/O; the engine never holds a lock across this call.
#[async_trait]
pub trait ProxyForwarder: Send + Sync {
    async fn forward(
        &self,
        request: &RequestView,
    ) -> Result<ResponseDescriptor, Box<dyn std::error::Error + Send + Sync>>;
}

//! Liveness request/reply over the broker.
//!
//! Hackspace monitoring publishes `STATUS` on a request topic and expects
//! every service to answer `Running: <name>` on the response topic. This
//! is a plain request/reply: nothing is cached and nothing reaches the
//! viewers.

use std::sync::Arc;

use tracing::{debug, warn};

/// The request payload that triggers a reply.
pub const STATUS_SENTINEL: &str = "STATUS";

/// Failure to hand an outbound message to the broker client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to publish to {topic}: {reason}")]
pub struct PublishError {
    /// Topic the message was meant for.
    pub topic: String,
    /// Why the broker client refused it.
    pub reason: String,
}

/// Outbound side of the broker connection.
///
/// Implementations must queue the message and return immediately; they
/// are called from the broker's own dispatch path.
pub trait BrokerPublisher: Send + Sync {
    /// Queue `payload` for delivery on `topic`.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// Answers `STATUS` requests with `Running: <name>`.
pub struct StatusResponder {
    request_topic: String,
    response_topic: String,
    reply: String,
    publisher: Arc<dyn BrokerPublisher>,
}

impl std::fmt::Debug for StatusResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusResponder")
            .field("request_topic", &self.request_topic)
            .field("response_topic", &self.response_topic)
            .field("reply", &self.reply)
            .finish_non_exhaustive()
    }
}

impl StatusResponder {
    /// Create a responder that replies as `name`.
    pub fn new(
        request_topic: impl Into<String>,
        response_topic: impl Into<String>,
        name: &str,
        publisher: Arc<dyn BrokerPublisher>,
    ) -> Self {
        Self {
            request_topic: request_topic.into(),
            response_topic: response_topic.into(),
            reply: format!("Running: {name}"),
            publisher,
        }
    }

    /// The topic requests arrive on.
    pub fn request_topic(&self) -> &str {
        &self.request_topic
    }

    /// Handle one request payload. Returns whether a reply was published.
    ///
    /// Payloads other than the exact `STATUS` sentinel are ignored.
    pub fn handle(&self, payload: &[u8]) -> bool {
        if payload != STATUS_SENTINEL.as_bytes() {
            debug!(topic = %self.request_topic, "ignoring non-status payload");
            return false;
        }
        match self.publisher.publish(&self.response_topic, &self.reply) {
            Ok(()) => {
                debug!(topic = %self.response_topic, reply = %self.reply, "status reply sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "status reply failed");
                false
            }
        }
    }
}

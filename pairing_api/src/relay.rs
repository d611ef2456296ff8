//! The relay client contract consumed by the controller.
//!
//! The transport itself lives outside this crate; anything that can publish
//! a message to a topic and manage topic subscriptions can drive a pairing.
//! Inbound messages are fed back through
//! [`PairingController::handle_message`](crate::PairingController::handle_message).

use {async_trait::async_trait, pairing_rpc::domain::Topic, std::time::Duration};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Possible relay client errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay publish failure: {0}")]
    Publish(#[source] BoxError),

    #[error("Relay subscription failure: {0}")]
    Subscription(#[source] BoxError),
}

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Publishes an encrypted message to everyone subscribed to the topic.
    async fn publish(
        &self,
        topic: Topic,
        message: String,
        tag: u32,
        ttl: Duration,
        prompt: bool,
    ) -> Result<(), RelayError>;

    async fn subscribe(&self, topic: Topic) -> Result<(), RelayError>;

    async fn unsubscribe(&self, topic: Topic) -> Result<(), RelayError>;
}

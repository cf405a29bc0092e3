//! Survey-completion payment handler.
//!
//! Watches outbound messages on a conversation's poll: when the content
//! equals the poll's completion sentinel, the participant has finished the
//! survey and a payment request goes out to the configured provider. Every
//! other path is a quiet no-op.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::store::SharedPollStore;

use super::AccountHandler;

/// Payment handler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Payment provider endpoint.
    pub url: String,
    /// Basic-auth credentials for the provider.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Amount to pay out, in the provider's smallest unit.
    #[serde(default)]
    pub amount: u64,
    /// Free-text reason passed to the provider.
    #[serde(default)]
    pub reason: String,
    /// Request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Issues a payment request when a survey participant completes a poll.
pub struct PaymentHandler {
    config: PaymentConfig,
    polls: SharedPollStore,
    client: Client,
}

impl PaymentHandler {
    pub fn new(config: PaymentConfig, polls: SharedPollStore) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;
        Ok(Self {
            config,
            polls,
            client,
        })
    }

    /// Whether `message` is the completion response for its conversation's
    /// poll.
    async fn completes_survey(&self, message: &Message) -> anyhow::Result<bool> {
        let Some(content) = message.content.as_deref() else {
            return Ok(false);
        };
        let Some((conversation_key, _)) = message.conversation_info() else {
            debug!(message_id = %message.message_id, "no conversation resolved, skipping");
            return Ok(false);
        };

        let poll_id = format!("poll-{conversation_key}");
        let Some(poll) = self.polls.poll_config(&poll_id).await? else {
            return Ok(false);
        };
        Ok(poll.survey_completed_response.as_deref() == Some(content))
    }
}

#[async_trait]
impl AccountHandler for PaymentHandler {
    fn name(&self) -> &'static str {
        "payment"
    }

    async fn handle_message(&self, message: &Message) -> anyhow::Result<()> {
        if self.config.url.is_empty() {
            warn!("no URL configured for payment handler, skipping");
            return Ok(());
        }

        if !self.completes_survey(message).await? {
            return Ok(());
        }

        let response = self
            .client
            .get(&self.config.url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .query(&[
                ("msisdn", message.to_addr.as_str()),
                ("amount", &self.config.amount.to_string()),
                ("reason", &self.config.reason),
            ])
            .send()
            .await?;

        info!(
            msisdn = %message.to_addr,
            amount = self.config.amount,
            status = %response.status(),
            "payment request issued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;
    use crate::store::{MemoryStore, PollConfig};
    use std::sync::Arc;

    fn handler(store: &Arc<MemoryStore>, url: &str) -> PaymentHandler {
        PaymentHandler::new(
            PaymentConfig {
                url: url.into(),
                username: "u".into(),
                password: "p".into(),
                amount: 200,
                reason: "survey completed".into(),
                timeout: Duration::from_secs(5),
            },
            store.clone(),
        )
        .unwrap()
    }

    fn message_for(conv_key: Option<&str>, content: Option<&str>) -> Message {
        let mut msg = Message::new(
            "8500",
            "+256700000001",
            content.map(String::from),
            Direction::Outbound,
        );
        if let Some(conv_key) = conv_key {
            msg.set_conversation(conv_key, "survey");
        }
        msg
    }

    #[tokio::test]
    async fn test_completion_sentinel_matches() {
        let store = Arc::new(MemoryStore::new());
        store.put_poll_config(
            "poll-conv-1",
            PollConfig {
                survey_completed_response: Some("Thanks, all done!".into()),
            },
        );
        let handler = handler(&store, "https://pay.example.com/");

        let msg = message_for(Some("conv-1"), Some("Thanks, all done!"));
        assert!(handler.completes_survey(&msg).await.unwrap());

        let msg = message_for(Some("conv-1"), Some("Question 2 of 5"));
        assert!(!handler.completes_survey(&msg).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_pieces_are_no_ops() {
        let store = Arc::new(MemoryStore::new());
        let handler = handler(&store, "https://pay.example.com/");

        // No content.
        let msg = message_for(Some("conv-1"), None);
        assert!(!handler.completes_survey(&msg).await.unwrap());

        // No conversation metadata.
        let msg = message_for(None, Some("Thanks, all done!"));
        assert!(!handler.completes_survey(&msg).await.unwrap());

        // No poll config for the conversation.
        let msg = message_for(Some("conv-1"), Some("Thanks, all done!"));
        assert!(!handler.completes_survey(&msg).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_url_is_a_no_op_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let handler = handler(&store, "");
        let msg = message_for(Some("conv-1"), Some("anything"));
        assert!(handler.handle_message(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_matching_message_sends_nothing() {
        // No poll config seeded: handle_message must return Ok without
        // attempting the HTTP request (the URL would not resolve).
        let store = Arc::new(MemoryStore::new());
        let handler = handler(&store, "http://payment.invalid/");
        let msg = message_for(Some("conv-1"), Some("hello"));
        assert!(handler.handle_message(&msg).await.is_ok());
    }
}

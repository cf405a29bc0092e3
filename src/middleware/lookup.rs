//! Account, batch, and conversation lookup stages.
//!
//! All three stages annotate in every direction (inbound, outbound, and
//! events) and treat "not found" as a normal empty result: a message with
//! no tag, an unassigned tag, or a batch with no live conversation passes
//! through unchanged.

use async_trait::async_trait;
use tracing::warn;

use crate::message::Message;
use crate::store::{SharedConversationStore, SharedTagBatchStore};

use super::{Middleware, MiddlewareError};

/// Resolves the owning account for a message from its tag.
///
/// tag → current batch → batch metadata `user_account` → `go` namespace.
/// Requires the upstream tagging step to have run; untagged messages are
/// left untouched.
pub struct LookupAccountMiddleware {
    tag_batches: SharedTagBatchStore,
}

impl LookupAccountMiddleware {
    pub fn new(tag_batches: SharedTagBatchStore) -> Self {
        Self { tag_batches }
    }

    async fn account_key_for(&self, message: &Message) -> Result<Option<String>, MiddlewareError> {
        let Some(tag) = message.tag() else {
            return Ok(None);
        };
        let Some(batch) = self.tag_batches.current_batch(tag).await? else {
            return Ok(None);
        };
        Ok(batch.user_account().map(String::from))
    }

    async fn annotate(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        if let Some(account_key) = self.account_key_for(&message).await? {
            message.set_user_account(account_key);
        }
        Ok(message)
    }
}

#[async_trait]
impl Middleware for LookupAccountMiddleware {
    fn name(&self) -> &'static str {
        "lookup_account"
    }

    async fn handle_inbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        self.annotate(message).await
    }

    async fn handle_outbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        self.annotate(message).await
    }

    async fn handle_event(&self, event: Message) -> Result<Message, MiddlewareError> {
        self.annotate(event).await
    }
}

/// Resolves the current batch key for a message from its tag.
///
/// Shares the tag → batch lookup with [`LookupAccountMiddleware`] but
/// records the batch key instead of the account.
pub struct LookupBatchMiddleware {
    tag_batches: SharedTagBatchStore,
}

impl LookupBatchMiddleware {
    pub fn new(tag_batches: SharedTagBatchStore) -> Self {
        Self { tag_batches }
    }

    async fn annotate(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        let Some(tag) = message.tag() else {
            return Ok(message);
        };
        if let Some(batch) = self.tag_batches.current_batch(tag).await? {
            message.set_batch_key(batch.key);
        }
        Ok(message)
    }
}

#[async_trait]
impl Middleware for LookupBatchMiddleware {
    fn name(&self) -> &'static str {
        "lookup_batch"
    }

    async fn handle_inbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        self.annotate(message).await
    }

    async fn handle_outbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        self.annotate(message).await
    }

    async fn handle_event(&self, event: Message) -> Result<Message, MiddlewareError> {
        self.annotate(event).await
    }
}

/// Resolves the conversation a message belongs to.
///
/// Hard-depends on both the account and batch lookups: when either key is
/// missing the stage no-ops. Ended conversations are excluded first; among
/// the remainder the most recently started wins, with a warning when more
/// than one candidate is live.
pub struct LookupConversationMiddleware {
    conversations: SharedConversationStore,
}

impl LookupConversationMiddleware {
    pub fn new(conversations: SharedConversationStore) -> Self {
        Self { conversations }
    }

    async fn annotate(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        let (Some(account_key), Some(batch_key)) = (message.user_account(), message.batch_key())
        else {
            return Ok(message);
        };

        let all = self
            .conversations
            .conversations_for_batch(account_key, batch_key)
            .await?;
        let mut live: Vec<_> = all.into_iter().filter(|c| !c.ended).collect();
        if live.is_empty() {
            return Ok(message);
        }

        if live.len() > 1 {
            let keys: Vec<&str> = live.iter().map(|c| c.key.as_str()).collect();
            warn!(
                batch_key,
                conversations = ?keys,
                "multiple live conversations found, going with most recent"
            );
        }
        live.sort_by(|a, b| b.start_timestamp.cmp(&a.start_timestamp));
        let conversation = &live[0];

        message.set_conversation(
            conversation.key.as_str(),
            conversation.conversation_type.as_str(),
        );
        Ok(message)
    }
}

#[async_trait]
impl Middleware for LookupConversationMiddleware {
    fn name(&self) -> &'static str {
        "lookup_conversation"
    }

    async fn handle_inbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        self.annotate(message).await
    }

    async fn handle_outbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        self.annotate(message).await
    }

    async fn handle_event(&self, event: Message) -> Result<Message, MiddlewareError> {
        self.annotate(event).await
    }
}

//! Message envelope and helper metadata.
//!
//! A [`Message`] is the transient unit of work that flows through the
//! middleware stack. Each stage annotates its own metadata namespace and
//! passes the message on:
//!
//! ```text
//! Transport                  Pipeline                        Transport
//! ─────────                  ────────                        ─────────
//!     │                         │                                │
//!     │ Message (tagged)        │                                │
//!     ├────────────────────────>│                                │
//!     │                   ┌─────┴─────┐                          │
//!     │                   │  Lookup   │ go.user_account          │
//!     │                   │  stages   │ go.batch_key             │
//!     │                   └─────┬─────┘ conversations.*          │
//!     │                   ┌─────┴─────┐                          │
//!     │                   │ Opt-out / │ optout.*                 │
//!     │                   │   Debit   │ (ledger side effect)     │
//!     │                   └─────┬─────┘                          │
//!     │                   ┌─────┴─────┐                          │
//!     │                   │ Handlers  │ external side effects    │
//!     │                   └─────┬─────┘                          │
//!     │     annotated Message   │                                │
//!     │<────────────────────────┤                                │
//! ```
//!
//! Metadata lives in typed, optional namespaces rather than free-form
//! string maps, so a stage reading another stage's output gets a struct,
//! not a stringly-typed lookup.

mod tag;

pub use tag::Tag;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of travel through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From a subscriber towards an application.
    Inbound,
    /// From an application towards a subscriber.
    Outbound,
    /// Transport event (ack, delivery report).
    Event,
}

/// Account namespace, written by the account and batch lookup stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoMetadata {
    /// Key of the account that owns the batch this message belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_account: Option<String>,
    /// Key of the batch resolved from the message tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_key: Option<String>,
}

/// Conversation namespace, written by the conversation lookup stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub conversation_key: String,
    pub conversation_type: String,
}

/// Opt-out namespace, written by the opt-out classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptOutMetadata {
    /// Whether the message content matched a configured opt-out keyword.
    pub optout: bool,
    /// The matched keyword, normalized per the classifier's casing config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optout_keyword: Option<String>,
}

/// Per-namespace helper metadata carried by a message.
///
/// Every namespace is optional; a stage that depends on another stage's
/// namespace must tolerate its absence by no-op'ing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go: Option<GoMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversations: Option<ConversationMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optout: Option<OptOutMetadata>,
}

/// A message passing through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id, assigned by the transport.
    #[serde(default = "Uuid::new_v4")]
    pub message_id: Uuid,
    pub from_addr: String,
    pub to_addr: String,
    /// Message body. May be absent (e.g. session events).
    #[serde(default)]
    pub content: Option<String>,
    pub direction: Direction,
    /// When the transport received or created the message.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Routing tag attached by the upstream tagging step, if any.
    #[serde(default)]
    pub tag: Option<Tag>,
    #[serde(default)]
    pub helper_metadata: HelperMetadata,
}

impl Message {
    /// Create a new message with empty metadata.
    pub fn new(
        from_addr: impl Into<String>,
        to_addr: impl Into<String>,
        content: Option<String>,
        direction: Direction,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            from_addr: from_addr.into(),
            to_addr: to_addr.into(),
            content,
            direction,
            timestamp: Utc::now(),
            tag: None,
            helper_metadata: HelperMetadata::default(),
        }
    }

    /// Attach a routing tag.
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// The routing tag attached to this message, if any.
    ///
    /// Pure lookup with no side effects; safe to call any number of times.
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// The resolved account key, if the account lookup stage set one.
    pub fn user_account(&self) -> Option<&str> {
        self.helper_metadata
            .go
            .as_ref()
            .and_then(|go| go.user_account.as_deref())
    }

    /// Set the resolved account key, creating the namespace if needed.
    pub fn set_user_account(&mut self, account_key: impl Into<String>) {
        self.helper_metadata
            .go
            .get_or_insert_with(GoMetadata::default)
            .user_account = Some(account_key.into());
    }

    /// The resolved batch key, if the batch lookup stage set one.
    pub fn batch_key(&self) -> Option<&str> {
        self.helper_metadata
            .go
            .as_ref()
            .and_then(|go| go.batch_key.as_deref())
    }

    /// Set the resolved batch key, creating the namespace if needed.
    pub fn set_batch_key(&mut self, batch_key: impl Into<String>) {
        self.helper_metadata
            .go
            .get_or_insert_with(GoMetadata::default)
            .batch_key = Some(batch_key.into());
    }

    /// The `(conversation_key, conversation_type)` pair, if resolved.
    ///
    /// Static accessor for stages and handlers that need the conversation
    /// without re-deriving it from the stores.
    pub fn conversation_info(&self) -> Option<(&str, &str)> {
        self.helper_metadata.conversations.as_ref().map(|c| {
            (
                c.conversation_key.as_str(),
                c.conversation_type.as_str(),
            )
        })
    }

    /// Set the resolved conversation pair.
    pub fn set_conversation(
        &mut self,
        conversation_key: impl Into<String>,
        conversation_type: impl Into<String>,
    ) {
        self.helper_metadata.conversations = Some(ConversationMetadata {
            conversation_key: conversation_key.into(),
            conversation_type: conversation_type.into(),
        });
    }

    /// Whether the opt-out classifier flagged this message.
    ///
    /// `false` when the classifier has not run.
    pub fn is_opt_out(&self) -> bool {
        self.helper_metadata
            .optout
            .as_ref()
            .map(|o| o.optout)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_account_round_trip() {
        let mut msg = Message::new("+256700000001", "8500", None, Direction::Outbound);
        assert_eq!(msg.user_account(), None);

        msg.set_user_account("acct-1");
        assert_eq!(msg.user_account(), Some("acct-1"));
    }

    #[test]
    fn test_batch_key_does_not_clobber_account() {
        let mut msg = Message::new("+256700000001", "8500", None, Direction::Outbound);
        msg.set_user_account("acct-1");
        msg.set_batch_key("batch-1");

        assert_eq!(msg.user_account(), Some("acct-1"));
        assert_eq!(msg.batch_key(), Some("batch-1"));
    }

    #[test]
    fn test_conversation_info_absent_by_default() {
        let msg = Message::new("a", "b", None, Direction::Inbound);
        assert_eq!(msg.conversation_info(), None);
        assert!(!msg.is_opt_out());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut msg = Message::new(
            "+256700000001",
            "8500",
            Some("hello".into()),
            Direction::Inbound,
        )
        .with_tag(Tag::new("pool-a", "tag-1"));
        msg.set_conversation("conv-1", "survey");

        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();

        assert_eq!(back.message_id, msg.message_id);
        assert_eq!(back.tag(), Some(&Tag::new("pool-a", "tag-1")));
        assert_eq!(back.conversation_info(), Some(("conv-1", "survey")));
    }

    #[test]
    fn test_deserialize_minimal_payload() {
        let json = r#"{"from_addr":"+1","to_addr":"+2","direction":"inbound"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.direction, Direction::Inbound);
        assert!(msg.tag().is_none());
        assert!(msg.content.is_none());
    }
}

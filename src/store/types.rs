//! Entities read from or written to the external stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A send/receive campaign run, created by account-level tooling.
///
/// Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Batch key.
    pub key: String,
    /// Batch metadata. `user_account` carries the owning account key.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Batch {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            metadata: HashMap::new(),
        }
    }

    /// Batch with its owning account recorded in metadata.
    pub fn for_account(key: impl Into<String>, account_key: impl Into<String>) -> Self {
        let mut batch = Self::new(key);
        batch
            .metadata
            .insert("user_account".into(), account_key.into());
        batch
    }

    /// The owning account key, if recorded.
    pub fn user_account(&self) -> Option<&str> {
        self.metadata.get("user_account").map(String::as_str)
    }
}

/// A logical campaign/dialogue instance within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub key: String,
    pub conversation_type: String,
    pub start_timestamp: DateTime<Utc>,
    /// Ended conversations are never selected by the lookup stage.
    pub ended: bool,
}

/// Per-pool configuration.
///
/// `credits_per_message` is stored as a free-form YAML value; the debit
/// stage validates it into a non-negative integer and treats anything else
/// as a configuration error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagPoolMetadata {
    #[serde(flatten)]
    pub values: HashMap<String, serde_yaml::Value>,
}

impl TagPoolMetadata {
    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_yaml::Value) {
        self.values.insert(key.into(), value);
    }
}

/// A contact known to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub key: String,
    /// Free-form per-contact values, e.g. the `opted_out` counter.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Contact {
    pub fn opted_out_count(&self) -> Option<i64> {
        self.extra.get("opted_out").and_then(|v| v.parse().ok())
    }
}

/// A recorded opt-out for a contact address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptOutRecord {
    pub address_type: String,
    pub address: String,
    /// The message that triggered the opt-out.
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Per-conversation survey configuration read by the payment handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollConfig {
    /// Content a participant sends when the survey is complete.
    #[serde(default)]
    pub survey_completed_response: Option<String>,
}

//! Credit debit stage.
//!
//! Outbound messages are paid for before they may be sent: the stage
//! resolves the owning account and tag, reads the pool's per-message cost,
//! and atomically debits the account's ledger. Any failure aborts the send
//! for this message only.

use async_trait::async_trait;
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::message::Message;
use crate::store::{SharedCreditLedger, SharedTagPoolStore};

use super::{Middleware, MiddlewareError};

/// A message could not be paid for.
#[derive(Debug, Error)]
pub enum DebitError {
    /// Outbound message has no resolved account.
    #[error("cannot debit message {message_id}: no user account resolved")]
    NoUser { message_id: Uuid },
    /// Outbound message has no routing tag.
    #[error("cannot debit message {message_id}: no tag attached")]
    NoTag { message_id: Uuid },
    /// Pool configuration is missing or does not specify a valid cost.
    /// Operator-visible configuration error, not a per-message transient.
    #[error("invalid credits_per_message for pool {pool:?}")]
    BadTagPool { pool: String },
    /// The ledger rejected the debit.
    #[error("account {account_key:?} has insufficient credit to debit {amount}")]
    InsufficientCredit { account_key: String, amount: u64 },
}

/// Debits `credits_per_message` from the owning account on every outbound
/// message. Inbound messages and events pass through untouched.
pub struct DebitAccountMiddleware {
    tag_pools: SharedTagPoolStore,
    ledger: SharedCreditLedger,
}

impl DebitAccountMiddleware {
    pub fn new(tag_pools: SharedTagPoolStore, ledger: SharedCreditLedger) -> Self {
        Self { tag_pools, ledger }
    }

    /// Per-message cost for `pool`, validated as a non-negative integer.
    ///
    /// Must run before the ledger is touched so a misconfigured pool never
    /// debits anything.
    async fn credits_per_message(&self, pool: &str) -> Result<u64, MiddlewareError> {
        let bad_pool = || DebitError::BadTagPool {
            pool: pool.to_string(),
        };

        let metadata = self
            .tag_pools
            .pool_metadata(pool)
            .await?
            .ok_or_else(bad_pool)?;
        let value = metadata.get("credits_per_message").ok_or_else(bad_pool)?;
        Ok(parse_credits(value).ok_or_else(bad_pool)?)
    }
}

/// Accepts YAML integers and numeric strings; anything negative or
/// non-numeric is invalid.
fn parse_credits(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl Middleware for DebitAccountMiddleware {
    fn name(&self) -> &'static str {
        "debit_account"
    }

    async fn handle_outbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        let account_key = message
            .user_account()
            .ok_or(DebitError::NoUser {
                message_id: message.message_id,
            })?
            .to_string();
        let tag = message.tag().ok_or(DebitError::NoTag {
            message_id: message.message_id,
        })?;

        let amount = self.credits_per_message(&tag.pool).await?;
        let success = self.ledger.debit(&account_key, amount).await?;
        if !success {
            return Err(DebitError::InsufficientCredit {
                account_key,
                amount,
            }
            .into());
        }

        debug!(account_key, amount, message_id = %message.message_id, "debited account");
        // The debit is a side effect; the message itself is unchanged.
        Ok(message)
    }
}

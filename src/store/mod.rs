//! External store contracts consumed by the pipeline.
//!
//! The pipeline never talks to a concrete database. Each stage receives the
//! store handles it needs through its constructor and only sees the traits
//! below:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Pipeline                             │
//! │  ┌────────┐ ┌──────────────┐ ┌───────┐ ┌────────┐ ┌───────┐ │
//! │  │ Lookup │ │ Conversation │ │ Debit │ │ OptOut │ │ Disp. │ │
//! │  └───┬────┘ └──────┬───────┘ └───┬───┘ └───┬────┘ └───┬───┘ │
//! └──────┼─────────────┼─────────────┼─────────┼──────────┼─────┘
//!        ▼             ▼             ▼         ▼          ▼
//!   TagBatchStore ConversationStore  │    OptOutStore ContactStore
//!                       TagPoolStore + CreditLedger    PollStore
//! ```
//!
//! [`MemoryStore`] implements every contract and backs tests and the CLI
//! harness. Production deployments provide their own implementations over
//! whatever key-value/document store they run.

mod memory;
pub mod types;

pub use memory::MemoryStore;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::message::Tag;

/// Error returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Resolves a tag to the batch currently bound to it.
#[async_trait]
pub trait TagBatchStore: Send + Sync {
    /// The batch currently assigned to `tag`, or `None` if the tag is
    /// unknown or unassigned. Absence is a normal result, not an error.
    async fn current_batch(&self, tag: &Tag) -> StoreResult<Option<Batch>>;
}

/// Back-link query from batches to the conversations that reference them.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All conversations in `account_key`'s namespace that reference
    /// `batch_key`, ended or not.
    async fn conversations_for_batch(
        &self,
        account_key: &str,
        batch_key: &str,
    ) -> StoreResult<Vec<Conversation>>;
}

/// Per-pool configuration store.
#[async_trait]
pub trait TagPoolStore: Send + Sync {
    async fn pool_metadata(&self, pool: &str) -> StoreResult<Option<TagPoolMetadata>>;
}

/// Per-account credit balances.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Atomically debit `amount` credits from `account_key`.
    ///
    /// Returns `true` if the full amount was debited, `false` if the
    /// balance would have gone negative (in which case the balance is
    /// unchanged). Must be atomic with respect to concurrent debits
    /// against the same account.
    async fn debit(&self, account_key: &str, amount: u64) -> StoreResult<bool>;

    /// Add credits to an account, creating it at zero if unknown.
    async fn credit(&self, account_key: &str, amount: u64) -> StoreResult<i64>;

    /// Current balance, or `None` for an unknown account.
    async fn balance(&self, account_key: &str) -> StoreResult<Option<i64>>;
}

/// Contact lookup by address.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn contact_for_address(
        &self,
        address_type: &str,
        address: &str,
    ) -> StoreResult<Option<Contact>>;
}

/// Opt-out records per contact address.
#[async_trait]
pub trait OptOutStore: Send + Sync {
    async fn record_opt_out(&self, record: OptOutRecord) -> StoreResult<()>;

    /// Delete any opt-out for `(address_type, address)`. Deleting a
    /// non-existent record is a no-op.
    async fn delete_opt_out(&self, address_type: &str, address: &str) -> StoreResult<()>;

    async fn opt_out_for(
        &self,
        address_type: &str,
        address: &str,
    ) -> StoreResult<Option<OptOutRecord>>;
}

/// Per-conversation survey configuration.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn poll_config(&self, poll_id: &str) -> StoreResult<Option<PollConfig>>;
}

pub type SharedTagBatchStore = Arc<dyn TagBatchStore>;
pub type SharedConversationStore = Arc<dyn ConversationStore>;
pub type SharedTagPoolStore = Arc<dyn TagPoolStore>;
pub type SharedCreditLedger = Arc<dyn CreditLedger>;
pub type SharedContactStore = Arc<dyn ContactStore>;
pub type SharedOptOutStore = Arc<dyn OptOutStore>;
pub type SharedPollStore = Arc<dyn PollStore>;

/// Store handles shared across the pipeline.
///
/// Passed to the pipeline builder, which hands each stage only the handles
/// it needs. All fields are cheap to clone.
#[derive(Clone)]
pub struct Stores {
    pub tag_batches: SharedTagBatchStore,
    pub conversations: SharedConversationStore,
    pub tag_pools: SharedTagPoolStore,
    pub ledger: SharedCreditLedger,
    pub contacts: SharedContactStore,
    pub opt_outs: SharedOptOutStore,
    pub polls: SharedPollStore,
}

impl Stores {
    /// All handles backed by a single [`MemoryStore`].
    pub fn in_memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let stores = Self {
            tag_batches: store.clone(),
            conversations: store.clone(),
            tag_pools: store.clone(),
            ledger: store.clone(),
            contacts: store.clone(),
            opt_outs: store.clone(),
            polls: store.clone(),
        };
        (stores, store)
    }
}

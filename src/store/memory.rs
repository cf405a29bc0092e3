//! In-memory store implementation.
//!
//! Volatile, thread-safe backing for tests and the CLI harness. Implements
//! every store contract; all data is lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::message::Tag;

use super::types::*;
use super::{
    ContactStore, ConversationStore, CreditLedger, OptOutStore, PollStore, StoreResult,
    TagBatchStore, TagPoolStore,
};

/// In-memory implementation of all store contracts.
///
/// Ledger balances are individual atomics so a debit is a single
/// compare-and-swap loop, never an application-level lock held across
/// reads and writes.
#[derive(Default)]
pub struct MemoryStore {
    tag_batches: RwLock<HashMap<Tag, Batch>>,
    // (account_key, batch_key) -> conversations
    conversations: RwLock<HashMap<(String, String), Vec<Conversation>>>,
    tag_pools: RwLock<HashMap<String, TagPoolMetadata>>,
    balances: RwLock<HashMap<String, Arc<AtomicI64>>>,
    // (address_type, address) -> contact
    contacts: RwLock<HashMap<(String, String), Contact>>,
    opt_outs: RwLock<HashMap<(String, String), OptOutRecord>>,
    polls: RwLock<HashMap<String, PollConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Seeding helpers
    // ---------------------------------------------------------------------

    /// Bind `tag` to `batch` as its current batch.
    pub fn put_current_batch(&self, tag: Tag, batch: Batch) {
        self.tag_batches.write().unwrap().insert(tag, batch);
    }

    /// Add a conversation back-linked from `batch_key` in `account_key`'s
    /// namespace.
    pub fn put_conversation(
        &self,
        account_key: impl Into<String>,
        batch_key: impl Into<String>,
        conversation: Conversation,
    ) {
        self.conversations
            .write()
            .unwrap()
            .entry((account_key.into(), batch_key.into()))
            .or_default()
            .push(conversation);
    }

    pub fn put_pool_metadata(&self, pool: impl Into<String>, metadata: TagPoolMetadata) {
        self.tag_pools.write().unwrap().insert(pool.into(), metadata);
    }

    /// Set an account's balance, replacing any existing value.
    pub fn set_balance(&self, account_key: impl Into<String>, balance: i64) {
        self.balances
            .write()
            .unwrap()
            .insert(account_key.into(), Arc::new(AtomicI64::new(balance)));
    }

    pub fn put_contact(
        &self,
        address_type: impl Into<String>,
        address: impl Into<String>,
        contact: Contact,
    ) {
        self.contacts
            .write()
            .unwrap()
            .insert((address_type.into(), address.into()), contact);
    }

    pub fn put_poll_config(&self, poll_id: impl Into<String>, config: PollConfig) {
        self.polls.write().unwrap().insert(poll_id.into(), config);
    }

    fn balance_cell(&self, account_key: &str) -> Arc<AtomicI64> {
        if let Some(cell) = self.balances.read().unwrap().get(account_key) {
            return cell.clone();
        }
        self.balances
            .write()
            .unwrap()
            .entry(account_key.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone()
    }
}

#[async_trait]
impl TagBatchStore for MemoryStore {
    async fn current_batch(&self, tag: &Tag) -> StoreResult<Option<Batch>> {
        Ok(self.tag_batches.read().unwrap().get(tag).cloned())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn conversations_for_batch(
        &self,
        account_key: &str,
        batch_key: &str,
    ) -> StoreResult<Vec<Conversation>> {
        Ok(self
            .conversations
            .read()
            .unwrap()
            .get(&(account_key.to_string(), batch_key.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TagPoolStore for MemoryStore {
    async fn pool_metadata(&self, pool: &str) -> StoreResult<Option<TagPoolMetadata>> {
        Ok(self.tag_pools.read().unwrap().get(pool).cloned())
    }
}

#[async_trait]
impl CreditLedger for MemoryStore {
    async fn debit(&self, account_key: &str, amount: u64) -> StoreResult<bool> {
        let cell = self.balance_cell(account_key);

        // Amounts beyond i64 can never fit in a balance; a wrapping cast
        // here would turn the debit into a credit.
        let Ok(amount) = i64::try_from(amount) else {
            debug!(account_key, amount, debited = false, "ledger debit");
            return Ok(false);
        };

        // Decrement-if-sufficient: retried CAS, so concurrent debits can
        // never drive the balance negative.
        let debited = cell
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |balance| {
                if balance >= amount {
                    Some(balance - amount)
                } else {
                    None
                }
            })
            .is_ok();

        debug!(account_key, amount, debited, "ledger debit");
        Ok(debited)
    }

    async fn credit(&self, account_key: &str, amount: u64) -> StoreResult<i64> {
        let cell = self.balance_cell(account_key);
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        let updated = cell
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |balance| {
                Some(balance.saturating_add(amount))
            })
            .map(|previous| previous.saturating_add(amount))
            .unwrap_or(i64::MAX);
        Ok(updated)
    }

    async fn balance(&self, account_key: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .balances
            .read()
            .unwrap()
            .get(account_key)
            .map(|cell| cell.load(Ordering::Acquire)))
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn contact_for_address(
        &self,
        address_type: &str,
        address: &str,
    ) -> StoreResult<Option<Contact>> {
        Ok(self
            .contacts
            .read()
            .unwrap()
            .get(&(address_type.to_string(), address.to_string()))
            .cloned())
    }
}

#[async_trait]
impl OptOutStore for MemoryStore {
    async fn record_opt_out(&self, record: OptOutRecord) -> StoreResult<()> {
        let key = (record.address_type.clone(), record.address.clone());
        self.opt_outs.write().unwrap().insert(key, record);
        Ok(())
    }

    async fn delete_opt_out(&self, address_type: &str, address: &str) -> StoreResult<()> {
        self.opt_outs
            .write()
            .unwrap()
            .remove(&(address_type.to_string(), address.to_string()));
        Ok(())
    }

    async fn opt_out_for(
        &self,
        address_type: &str,
        address: &str,
    ) -> StoreResult<Option<OptOutRecord>> {
        Ok(self
            .opt_outs
            .read()
            .unwrap()
            .get(&(address_type.to_string(), address.to_string()))
            .cloned())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn poll_config(&self, poll_id: &str) -> StoreResult<Option<PollConfig>> {
        Ok(self.polls.read().unwrap().get(poll_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_current_batch_lookup() {
        let store = MemoryStore::new();
        let tag = Tag::new("pool-a", "tag-1");
        store.put_current_batch(tag.clone(), Batch::for_account("batch-1", "acct-1"));

        let batch = store.current_batch(&tag).await.unwrap().unwrap();
        assert_eq!(batch.key, "batch-1");
        assert_eq!(batch.user_account(), Some("acct-1"));

        let missing = store
            .current_batch(&Tag::new("pool-a", "other"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_debit_and_balance() {
        let store = MemoryStore::new();
        store.set_balance("acct-1", 5);

        assert!(store.debit("acct-1", 2).await.unwrap());
        assert!(store.debit("acct-1", 2).await.unwrap());
        assert!(!store.debit("acct-1", 2).await.unwrap());
        assert_eq!(store.balance("acct-1").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_debit_beyond_i64_is_rejected() {
        let store = MemoryStore::new();
        store.set_balance("acct-1", 5);

        // Larger than any representable balance: must be rejected, never
        // wrapped into a credit.
        assert!(!store.debit("acct-1", (1u64 << 63) + 5).await.unwrap());
        assert!(!store.debit("acct-1", u64::MAX).await.unwrap());
        assert_eq!(store.balance("acct-1").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_credit_saturates_at_i64_max() {
        let store = MemoryStore::new();
        store.set_balance("acct-1", i64::MAX - 1);

        assert_eq!(store.credit("acct-1", u64::MAX).await.unwrap(), i64::MAX);
        assert_eq!(store.balance("acct-1").await.unwrap(), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_debit_unknown_account() {
        let store = MemoryStore::new();
        assert!(!store.debit("missing", 1).await.unwrap());
        // Zero-amount debit always fits.
        assert!(store.debit("missing", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let store = Arc::new(MemoryStore::new());
        store.set_balance("acct-1", 50);

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.debit("acct-1", 2).await.unwrap()
            }));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap() {
                successes += 1;
            }
        }

        // Exactly the attempts that fit in the balance succeed.
        assert_eq!(successes, 25);
        assert_eq!(store.balance("acct-1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_opt_out_record_and_delete() {
        let store = MemoryStore::new();
        let record = OptOutRecord {
            address_type: "msisdn".into(),
            address: "+256700000001".into(),
            message_id: uuid::Uuid::new_v4(),
            created_at: Utc::now(),
        };
        store.record_opt_out(record).await.unwrap();
        assert!(store
            .opt_out_for("msisdn", "+256700000001")
            .await
            .unwrap()
            .is_some());

        store.delete_opt_out("msisdn", "+256700000001").await.unwrap();
        assert!(store
            .opt_out_for("msisdn", "+256700000001")
            .await
            .unwrap()
            .is_none());

        // Deleting again is a no-op.
        store.delete_opt_out("msisdn", "+256700000001").await.unwrap();
    }
}

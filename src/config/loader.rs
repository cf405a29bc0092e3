use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::handler::HandlerConfig;
use crate::message::Tag;
use crate::store::{Batch, Conversation, MemoryStore};

use super::types::{Config, SeedConfig};

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(normalize) = &self.normalize {
            if normalize.country_code.is_empty()
                || !normalize.country_code.chars().all(|c| c.is_ascii_digit())
            {
                anyhow::bail!(
                    "normalize.country_code must be a non-empty digit string, got {:?}",
                    normalize.country_code
                );
            }
        }

        for (account_key, handlers) in &self.accounts {
            for handler in handlers {
                if let HandlerConfig::Payment(payment) = handler {
                    if payment.url.is_empty() {
                        anyhow::bail!(
                            "payment handler for account '{}' has an empty url",
                            account_key
                        );
                    }
                }
            }
        }

        for binding in &self.seed.tags {
            if binding.pool.is_empty() || binding.tag.is_empty() {
                anyhow::bail!("seed tag bindings need a non-empty pool and tag");
            }
        }

        // The ledger never holds a negative balance; refuse to seed one.
        for (account_key, balance) in &self.seed.balances {
            if *balance < 0 {
                anyhow::bail!(
                    "seed balance for account '{}' is negative: {}",
                    account_key,
                    balance
                );
            }
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

impl SeedConfig {
    /// Load the seed data into an in-memory store.
    pub fn apply(&self, store: &MemoryStore) {
        for (account_key, balance) in &self.balances {
            store.set_balance(account_key.as_str(), *balance);
        }
        for (pool, metadata) in &self.pools {
            store.put_pool_metadata(pool.as_str(), metadata.clone());
        }
        for binding in &self.tags {
            store.put_current_batch(
                Tag::new(binding.pool.as_str(), binding.tag.as_str()),
                Batch::for_account(binding.batch_key.as_str(), binding.user_account.as_str()),
            );
        }
        for conv in &self.conversations {
            store.put_conversation(
                conv.account_key.as_str(),
                conv.batch_key.as_str(),
                Conversation {
                    key: conv.key.clone(),
                    conversation_type: conv.conversation_type.clone(),
                    start_timestamp: conv.start_timestamp,
                    ended: conv.ended,
                },
            );
        }
    }
}

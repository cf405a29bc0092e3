//! Per-account handlers.
//!
//! Handlers are per-account side-effect hooks invoked by the dispatch
//! stage for every outbound message. Each handler implements one
//! capability behind [`AccountHandler`]; configuration maps an account key
//! to an ordered handler list, resolved to constructors through the
//! [`HandlerConfig`] registry at build time (no runtime class loading).

mod payment;
mod ussd_optout;

pub use payment::{PaymentConfig, PaymentHandler};
pub use ussd_optout::{UssdOptOutConfig, UssdOptOutHandler};

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::message::Message;
use crate::store::Stores;

/// A per-account message handler.
#[async_trait]
pub trait AccountHandler: Send + Sync {
    /// Handler name, for logging.
    fn name(&self) -> &'static str;

    /// React to an outbound message. May perform external I/O. Errors are
    /// recorded by the dispatch stage, not propagated.
    async fn handle_message(&self, message: &Message) -> anyhow::Result<()>;

    /// Shutdown hook, invoked once at pipeline teardown.
    async fn teardown(&self) {}
}

/// Handler registry: maps a config `type` tag to a handler constructor.
///
/// Adding a handler type means adding a variant here and a build arm in
/// [`build_handlers`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Survey-completion payment trigger.
    Payment(PaymentConfig),
    /// USSD opt-out bookkeeping.
    UssdOptOut(UssdOptOutConfig),
}

/// Configured handlers per account, in configuration order.
pub struct AccountHandlers {
    accounts: Vec<(String, Vec<Arc<dyn AccountHandler>>)>,
}

impl AccountHandlers {
    pub fn new(accounts: Vec<(String, Vec<Arc<dyn AccountHandler>>)>) -> Self {
        Self { accounts }
    }

    /// The ordered handler list for `account_key`, if any are configured.
    pub fn for_account(&self, account_key: &str) -> Option<&[Arc<dyn AccountHandler>]> {
        self.accounts
            .iter()
            .find(|(key, _)| key == account_key)
            .map(|(_, handlers)| handlers.as_slice())
    }

    /// Tear down every handler, in registration order.
    pub async fn teardown(&self) {
        for (_, handlers) in &self.accounts {
            for handler in handlers {
                handler.teardown().await;
            }
        }
    }
}

/// Instantiate all configured handlers against the given store handles.
pub fn build_handlers(
    accounts: &HashMap<String, Vec<HandlerConfig>>,
    stores: &Stores,
) -> anyhow::Result<AccountHandlers> {
    let mut built = Vec::new();

    // Sorted so registration (and therefore teardown) order is stable
    // across runs regardless of map iteration order.
    let mut account_keys: Vec<&String> = accounts.keys().collect();
    account_keys.sort();

    for account_key in account_keys {
        let mut handlers: Vec<Arc<dyn AccountHandler>> = Vec::new();
        for config in &accounts[account_key] {
            let handler: Arc<dyn AccountHandler> = match config {
                HandlerConfig::Payment(config) => {
                    Arc::new(PaymentHandler::new(config.clone(), stores.polls.clone())?)
                }
                HandlerConfig::UssdOptOut(config) => Arc::new(UssdOptOutHandler::new(
                    config.clone(),
                    stores.contacts.clone(),
                    stores.opt_outs.clone(),
                )),
            };
            handlers.push(handler);
        }
        built.push((account_key.clone(), handlers));
    }

    Ok(AccountHandlers::new(built))
}

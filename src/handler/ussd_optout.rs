//! USSD opt-out bookkeeping handler.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::message::Message;
use crate::store::{OptOutRecord, SharedContactStore, SharedOptOutStore};

use super::AccountHandler;

/// Opt-out counter threshold above which a contact is considered opted
/// out.
const OPT_OUT_THRESHOLD: i64 = 1;

/// USSD opt-out handler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UssdOptOutConfig {
    /// Account key, for log correlation.
    #[serde(default)]
    pub account_key: Option<String>,
}

/// Keeps opt-out records in sync with a contact's `opted_out` counter.
///
/// On every outbound message: look up the contact for the destination
/// USSD address; a counter above the threshold records an opt-out for
/// the msisdn, anything else clears any existing record. Unknown contacts
/// and contacts without a counter are left alone.
pub struct UssdOptOutHandler {
    config: UssdOptOutConfig,
    contacts: SharedContactStore,
    opt_outs: SharedOptOutStore,
}

impl UssdOptOutHandler {
    pub fn new(
        config: UssdOptOutConfig,
        contacts: SharedContactStore,
        opt_outs: SharedOptOutStore,
    ) -> Self {
        Self {
            config,
            contacts,
            opt_outs,
        }
    }
}

#[async_trait]
impl AccountHandler for UssdOptOutHandler {
    fn name(&self) -> &'static str {
        "ussd_opt_out"
    }

    async fn handle_message(&self, message: &Message) -> anyhow::Result<()> {
        let addr = message.to_addr.as_str();
        let Some(contact) = self.contacts.contact_for_address("ussd", addr).await? else {
            return Ok(());
        };
        let Some(opted_out) = contact.opted_out_count() else {
            return Ok(());
        };

        if opted_out > OPT_OUT_THRESHOLD {
            debug!(
                addr,
                opted_out,
                account_key = ?self.config.account_key,
                "recording opt-out"
            );
            self.opt_outs
                .record_opt_out(OptOutRecord {
                    address_type: "msisdn".into(),
                    address: addr.to_string(),
                    message_id: message.message_id,
                    created_at: Utc::now(),
                })
                .await?;
        } else {
            self.opt_outs.delete_opt_out("msisdn", addr).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;
    use crate::store::{Contact, MemoryStore, OptOutStore};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn contact(opted_out: Option<&str>) -> Contact {
        let mut extra = HashMap::new();
        if let Some(value) = opted_out {
            extra.insert("opted_out".to_string(), value.to_string());
        }
        Contact {
            key: "contact-1".into(),
            extra,
        }
    }

    fn handler(store: &Arc<MemoryStore>) -> UssdOptOutHandler {
        UssdOptOutHandler::new(UssdOptOutConfig::default(), store.clone(), store.clone())
    }

    fn outbound_to(addr: &str) -> Message {
        Message::new("*150#", addr, None, Direction::Outbound)
    }

    #[tokio::test]
    async fn test_counter_above_threshold_records_opt_out() {
        let store = Arc::new(MemoryStore::new());
        store.put_contact("ussd", "+256700000001", contact(Some("2")));
        let handler = handler(&store);

        handler
            .handle_message(&outbound_to("+256700000001"))
            .await
            .unwrap();
        assert!(store
            .opt_out_for("msisdn", "+256700000001")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_counter_at_threshold_clears_opt_out() {
        let store = Arc::new(MemoryStore::new());
        store.put_contact("ussd", "+256700000001", contact(Some("1")));
        store
            .record_opt_out(OptOutRecord {
                address_type: "msisdn".into(),
                address: "+256700000001".into(),
                message_id: uuid::Uuid::new_v4(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let handler = handler(&store);

        handler
            .handle_message(&outbound_to("+256700000001"))
            .await
            .unwrap();
        assert!(store
            .opt_out_for("msisdn", "+256700000001")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_contact_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let handler = handler(&store);
        handler
            .handle_message(&outbound_to("+256700000009"))
            .await
            .unwrap();
        assert!(store
            .opt_out_for("msisdn", "+256700000009")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_contact_without_counter_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        store.put_contact("ussd", "+256700000001", contact(None));
        store
            .record_opt_out(OptOutRecord {
                address_type: "msisdn".into(),
                address: "+256700000001".into(),
                message_id: uuid::Uuid::new_v4(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let handler = handler(&store);

        handler
            .handle_message(&outbound_to("+256700000001"))
            .await
            .unwrap();
        // An existing record is left alone when the counter is absent.
        assert!(store
            .opt_out_for("msisdn", "+256700000001")
            .await
            .unwrap()
            .is_some());
    }
}

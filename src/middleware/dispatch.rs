//! Per-account handler dispatch stage.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::handler::AccountHandlers;
use crate::message::Message;

use super::{Middleware, MiddlewareError};

/// Routes outbound messages to the handlers configured for the resolved
/// account.
///
/// Handlers for an account run strictly in configured order, each awaited
/// before the next, so a handler may depend on its predecessor's side
/// effects. A failing handler is logged and skipped; it never aborts its
/// siblings or the pipeline, so a bad handler cannot block the billing
/// path. Messages with no resolved account pass through untouched.
pub struct PerAccountHandlerMiddleware {
    accounts: AccountHandlers,
}

impl PerAccountHandlerMiddleware {
    pub fn new(accounts: AccountHandlers) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl Middleware for PerAccountHandlerMiddleware {
    fn name(&self) -> &'static str {
        "per_account_handlers"
    }

    async fn handle_outbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        let Some(account_key) = message.user_account() else {
            return Ok(message);
        };
        let Some(handlers) = self.accounts.for_account(account_key) else {
            return Ok(message);
        };

        for handler in handlers {
            debug!(
                account_key,
                handler = handler.name(),
                message_id = %message.message_id,
                "dispatching to handler"
            );
            if let Err(error) = handler.handle_message(&message).await {
                warn!(
                    account_key,
                    handler = handler.name(),
                    message_id = %message.message_id,
                    %error,
                    "handler failed, continuing with remaining handlers"
                );
            }
        }
        Ok(message)
    }

    async fn teardown(&self) {
        self.accounts.teardown().await;
    }
}

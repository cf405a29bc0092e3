//! Middleware pipeline engine.
//!
//! Stages implement [`Middleware`] and are chained into a
//! [`MiddlewareStack`]. A message runs through every stage in order; each
//! stage annotates its own metadata namespace (or performs a side effect,
//! as the debit stage does) and hands the message on. A stage error aborts
//! the remaining chain for that message only; other in-flight messages
//! are unaffected.
//!
//! Stage order matters: the lookup stages are preconditions for the
//! conversation lookup, the debit stage, and handler dispatch, so
//! [`standard_stack`] wires them in dependency order.

mod debit;
mod dispatch;
mod lookup;
mod normalize;
mod optout;

pub use debit::{DebitAccountMiddleware, DebitError};
pub use dispatch::PerAccountHandlerMiddleware;
pub use lookup::{
    LookupAccountMiddleware, LookupBatchMiddleware, LookupConversationMiddleware,
};
pub use normalize::{normalize_msisdn, NormalizeMsisdnMiddleware};
pub use optout::OptOutMiddleware;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::handler::build_handlers;
use crate::message::{Direction, Message};
use crate::store::{StoreError, Stores};

/// Error aborting a message's trip through the stack.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// The debit stage refused the message.
    #[error(transparent)]
    Debit(#[from] DebitError),
    /// An external store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single pipeline stage.
///
/// Default implementations pass the message through untouched, so a stage
/// only overrides the directions it cares about.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stage name, for logging.
    fn name(&self) -> &'static str;

    async fn handle_inbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        Ok(message)
    }

    async fn handle_outbound(&self, message: Message) -> Result<Message, MiddlewareError> {
        Ok(message)
    }

    async fn handle_event(&self, event: Message) -> Result<Message, MiddlewareError> {
        Ok(event)
    }

    /// Shutdown hook, invoked once when the stack tears down.
    async fn teardown(&self) {}
}

/// An ordered chain of middleware stages.
pub struct MiddlewareStack {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { stages }
    }

    /// Run a message through every stage, dispatching on its direction.
    pub async fn process(&self, message: Message) -> Result<Message, MiddlewareError> {
        match message.direction {
            Direction::Inbound => self.process_inbound(message).await,
            Direction::Outbound => self.process_outbound(message).await,
            Direction::Event => self.process_event(message).await,
        }
    }

    pub async fn process_inbound(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        for stage in &self.stages {
            debug!(stage = stage.name(), message_id = %message.message_id, "inbound stage");
            message = stage.handle_inbound(message).await?;
        }
        Ok(message)
    }

    pub async fn process_outbound(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        for stage in &self.stages {
            debug!(stage = stage.name(), message_id = %message.message_id, "outbound stage");
            message = stage.handle_outbound(message).await?;
        }
        Ok(message)
    }

    pub async fn process_event(&self, mut event: Message) -> Result<Message, MiddlewareError> {
        for stage in &self.stages {
            event = stage.handle_event(event).await?;
        }
        Ok(event)
    }

    /// Tear down every stage, in registration order.
    pub async fn teardown(&self) {
        for stage in &self.stages {
            debug!(stage = stage.name(), "tearing down stage");
            stage.teardown().await;
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Stack builder.
#[derive(Default)]
pub struct MiddlewareStackBuilder {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareStackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> MiddlewareStack {
        MiddlewareStack::new(self.stages)
    }
}

/// Build the standard gateway stack from configuration and store handles.
///
/// Order: msisdn normalization (when configured), account lookup, batch
/// lookup, conversation lookup, opt-out classification, credit debit,
/// per-account handler dispatch.
pub fn standard_stack(config: &Config, stores: &Stores) -> anyhow::Result<MiddlewareStack> {
    let mut builder = MiddlewareStackBuilder::new();

    if let Some(normalize) = &config.normalize {
        builder = builder.with(Arc::new(NormalizeMsisdnMiddleware::new(
            &normalize.country_code,
            normalize.strip_plus,
        )));
    }

    builder = builder
        .with(Arc::new(LookupAccountMiddleware::new(
            stores.tag_batches.clone(),
        )))
        .with(Arc::new(LookupBatchMiddleware::new(
            stores.tag_batches.clone(),
        )))
        .with(Arc::new(LookupConversationMiddleware::new(
            stores.conversations.clone(),
        )))
        .with(Arc::new(OptOutMiddleware::new(&config.optout)))
        .with(Arc::new(DebitAccountMiddleware::new(
            stores.tag_pools.clone(),
            stores.ledger.clone(),
        )));

    let handlers = build_handlers(&config.accounts, stores)?;
    builder = builder.with(Arc::new(PerAccountHandlerMiddleware::new(handlers)));

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    #[async_trait]
    impl Middleware for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }
    }

    struct Annotate;

    #[async_trait]
    impl Middleware for Annotate {
        fn name(&self) -> &'static str {
            "annotate"
        }

        async fn handle_inbound(
            &self,
            mut message: Message,
        ) -> Result<Message, MiddlewareError> {
            message.set_user_account("acct-test");
            Ok(message)
        }
    }

    #[tokio::test]
    async fn test_empty_stack_passes_message_through() {
        let stack = MiddlewareStackBuilder::new().build();
        let msg = Message::new("a", "b", None, Direction::Inbound);
        let id = msg.message_id;
        let out = stack.process(msg).await.unwrap();
        assert_eq!(out.message_id, id);
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let stack = MiddlewareStackBuilder::new()
            .with(Arc::new(Passthrough))
            .with(Arc::new(Annotate))
            .build();
        assert_eq!(stack.len(), 2);

        let msg = Message::new("a", "b", None, Direction::Inbound);
        let out = stack.process(msg).await.unwrap();
        assert_eq!(out.user_account(), Some("acct-test"));
    }

    #[tokio::test]
    async fn test_event_uses_default_passthrough() {
        let stack = MiddlewareStackBuilder::new().with(Arc::new(Annotate)).build();
        let event = Message::new("a", "b", None, Direction::Event);
        let out = stack.process(event).await.unwrap();
        // Annotate only handles inbound.
        assert_eq!(out.user_account(), None);
    }
}

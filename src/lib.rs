//! Middleware pipeline for a messaging gateway.
//!
//! Annotates, authorizes, and bills messages on their way through the
//! gateway. The transport layer hands each message to a
//! [`middleware::MiddlewareStack`]; the stages resolve the owning account,
//! batch, and conversation from the message's routing tag, classify
//! opt-out keywords, debit usage credit before an outbound send, and
//! dispatch to per-account side-effect handlers. The caller gets back an
//! annotated message or a typed failure.
//!
//! ```no_run
//! use gopipe::config::Config;
//! use gopipe::middleware::standard_stack;
//! use gopipe::store::Stores;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load("gopipe.yaml")?;
//! let (stores, memory) = Stores::in_memory();
//! config.seed.apply(&memory);
//!
//! let stack = standard_stack(&config, &stores)?;
//! # let message = todo!();
//! let annotated = stack.process(message).await?;
//! stack.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handler;
pub mod message;
pub mod middleware;
pub mod store;
pub mod telemetry;

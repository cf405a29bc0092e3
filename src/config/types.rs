use serde::Deserialize;
use std::collections::HashMap;

use crate::handler::HandlerConfig;
use crate::store::TagPoolMetadata;

/// Root configuration for the gateway pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Msisdn normalization; omit the section to disable the stage
    #[serde(default)]
    pub normalize: Option<NormalizeConfig>,

    /// Opt-out classification
    #[serde(default)]
    pub optout: OptOutConfig,

    /// Per-account handler lists, keyed by account key
    #[serde(default)]
    pub accounts: HashMap<String, Vec<HandlerConfig>>,

    /// Memory-store seed data for the CLI harness and tests
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Msisdn normalization configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeConfig {
    /// Country dialing code applied to local numbers
    pub country_code: String,

    /// Strip the leading `+` from outbound destination addresses
    #[serde(default)]
    pub strip_plus: bool,
}

/// Opt-out classifier configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptOutConfig {
    /// Match keywords case-sensitively
    #[serde(default)]
    pub case_sensitive: bool,

    /// Keywords that mark a message as an opt-out
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Seed data loaded into the in-memory stores at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    /// Initial credit balances per account key
    #[serde(default)]
    pub balances: HashMap<String, i64>,

    /// Per-pool metadata (including `credits_per_message`)
    #[serde(default)]
    pub pools: HashMap<String, TagPoolMetadata>,

    /// Tag-to-batch bindings
    #[serde(default)]
    pub tags: Vec<SeedTagBinding>,

    /// Conversations back-linked from batches
    #[serde(default)]
    pub conversations: Vec<SeedConversation>,
}

/// A seeded binding of a tag to its current batch.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedTagBinding {
    pub pool: String,
    pub tag: String,
    pub batch_key: String,
    pub user_account: String,
}

/// A seeded conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConversation {
    pub account_key: String,
    pub batch_key: String,
    pub key: String,
    pub conversation_type: String,
    pub start_timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub ended: bool,
}

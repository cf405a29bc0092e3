//! Typed YAML configuration for the pipeline and its stages.

mod loader;
mod types;

pub use types::{
    Config, NormalizeConfig, OptOutConfig, SeedConfig, SeedConversation, SeedTagBinding,
    TelemetryConfig,
};

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use gopipe::config::Config;
use gopipe::message::Message;
use gopipe::middleware::standard_stack;
use gopipe::store::Stores;
use gopipe::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "gopipe")]
#[command(author, version, about = "Messaging gateway middleware pipeline")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

/// Reads newline-delimited JSON messages on stdin, runs each through the
/// pipeline over in-memory stores seeded from config, and writes the
/// annotated message (or the failure) as JSON on stdout.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let tracing_config = TracingConfig {
        service_name: "gopipe".to_string(),
        log_level: config.telemetry.log_level.clone(),
        json_logs: config.telemetry.json_logs,
    };
    init_tracing(&tracing_config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting gopipe"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let (stores, memory) = Stores::in_memory();
    config.seed.apply(&memory);

    let stack = standard_stack(&config, &stores)?;
    info!(stages = stack.len(), "pipeline built");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let message: Message = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "skipping unparseable message");
                continue;
            }
        };

        match stack.process(message).await {
            Ok(annotated) => {
                serde_json::to_writer(&mut stdout, &annotated)?;
                writeln!(stdout)?;
            }
            Err(error) => {
                warn!(%error, "message rejected by pipeline");
                serde_json::to_writer(
                    &mut stdout,
                    &serde_json::json!({ "error": error.to_string() }),
                )?;
                writeln!(stdout)?;
            }
        }
    }

    stack.teardown().await;
    info!("pipeline torn down");

    Ok(())
}

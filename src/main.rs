//! `anthropic-extract` binary entry point.
//!
//! Sends each command-line argument (or each non-empty stdin line when no
//! arguments are given) as one prompt and prints one JSON line per result.
//! All logs go to stderr; stdout carries only results.
//!
//! Coverage is excluded because the main function needs a live API key.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use anthropic_extract::config::{Config, DEFAULT_LOG_LEVEL};
use anthropic_extract::provider::AnthropicLanguageModel;
use anthropic_extract::traits::Options;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::filter::EnvFilter;

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    // Config loads `.env` first, so LOG_LEVEL may come from there
    let config = Config::from_env();
    let log_level = config
        .as_ref()
        .map_or(DEFAULT_LOG_LEVEL, |config| config.log_level.as_str());

    // Initialize logging to stderr only (stdout is for results)
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(log_level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let model = match AnthropicLanguageModel::from_config(&config) {
        Ok(model) => model,
        Err(e) => {
            tracing::error!("Failed to build backend: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Configuration loaded: model={}, workers={}, timeout={}ms",
        model.model_name(),
        model.max_workers(),
        config.request_timeout_ms
    );

    let prompts = match read_prompts().await {
        Ok(prompts) => prompts,
        Err(e) => {
            tracing::error!("Failed to read prompts: {e}");
            std::process::exit(1);
        }
    };

    let results = match model.infer(&prompts, &Options::new()).await {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    for (index, result) in results.iter().enumerate() {
        let line = match result {
            Ok(scored) => json!({ "index": index, "output": scored.output }),
            Err(e) => json!({ "index": index, "error": e.to_string() }),
        };
        println!("{line}");
    }
}

/// Filter for the configured level, falling back to the default.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Prompts from the command line, or from stdin when there are none.
async fn read_prompts() -> std::io::Result<Vec<String>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args);
    }

    let mut prompts = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            prompts.push(line);
        }
    }
    Ok(prompts)
}

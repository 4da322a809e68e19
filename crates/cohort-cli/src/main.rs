//! cohort-sql
//!
//! Reads a cohort search request as JSON and prints the compiled BigQuery
//! query with its named parameters.

mod config;

use std::fs;
use std::io::{self, Read};

use anyhow::Context;
use clap::Parser;
use helios_cohort::{CohortQueryBuilder, SearchRequest};
use tracing::{debug, info};

use config::CliConfig;

/// Initializes logging to stderr. `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("helios_cohort={0},cohort_sql={0}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn read_request(config: &CliConfig) -> anyhow::Result<SearchRequest> {
    let text = if config.reads_stdin() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read search request from stdin")?;
        text
    } else {
        fs::read_to_string(&config.input)
            .with_context(|| format!("Failed to read {}", config.input.display()))?
    };
    debug!(bytes = text.len(), "read search request");
    serde_json::from_str(&text).context("Search request is not valid JSON")
}

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let builder = CohortQueryBuilder::new(config.compiler_config())?;
    let request = read_request(&config)?;
    let compiled = builder.compile(&request, config.mode)?;

    info!(
        mode = %config.mode,
        parameters = compiled.parameters.len(),
        "compiled search request"
    );

    if config.literal {
        println!("{}", compiled.to_literal_sql());
    } else {
        println!("{}", serde_json::to_string_pretty(&compiled)?);
    }
    Ok(())
}

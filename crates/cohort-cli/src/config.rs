//! Command line configuration for `cohort-sql`.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `COHORT_PROJECT_ID` | cohort-project | BigQuery project of the CDM dataset |
//! | `COHORT_DATASET_ID` | cdr | CDM dataset |
//! | `COHORT_LOG_LEVEL` | warn | Log level |

use std::path::PathBuf;

use clap::Parser;
use helios_cohort::{CompilerConfig, QueryMode};

/// Compiles a cohort search request read as JSON.
#[derive(Debug, Clone, Parser)]
#[command(name = "cohort-sql")]
#[command(about = "Compile a cohort search request to BigQuery SQL")]
pub struct CliConfig {
    /// Search request JSON file, or `-` for stdin.
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// BigQuery project holding the CDM dataset.
    #[arg(long, env = "COHORT_PROJECT_ID", default_value = "cohort-project")]
    pub project_id: String,

    /// CDM dataset.
    #[arg(long, env = "COHORT_DATASET_ID", default_value = "cdr")]
    pub dataset_id: String,

    /// What the query selects (count, participants).
    #[arg(short, long, default_value = "count")]
    pub mode: QueryMode,

    /// Print the SQL with literals in place of parameters.
    #[arg(long)]
    pub literal: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "COHORT_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl CliConfig {
    /// Returns true when the request is read from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }

    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig::new(&self.project_id, &self.dataset_id)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(config_errors) = self.compiler_config().validate() {
            errors.extend(config_errors);
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log level '{}'. Valid values: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

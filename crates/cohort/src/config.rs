//! Compiler configuration.
//!
//! The project and dataset name the BigQuery location of the OMOP tables.
//! They are trusted deployment settings and are interpolated into table
//! references, so [`CompilerConfig::validate`] restricts them to identifier
//! characters.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Project and dataset names.
#[allow(clippy::expect_used)]
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex literal"));

/// Location of the CDM tables queries are compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    /// BigQuery project holding the dataset.
    pub project_id: String,

    /// Dataset holding the CDM tables.
    pub dataset_id: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            project_id: "cohort-project".to_string(),
            dataset_id: "cdr".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Creates a configuration for the given project and dataset.
    pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !IDENTIFIER.is_match(&self.project_id) {
            errors.push(format!("Invalid project id: '{}'", self.project_id));
        }
        if !IDENTIFIER.is_match(&self.dataset_id) {
            errors.push(format!("Invalid dataset id: '{}'", self.dataset_id));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns a reference to a table in the configured dataset.
    pub(crate) fn table(&self, name: &'static str) -> TableRef {
        TableRef {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            table: name,
        }
    }
}

/// A fully qualified table, rendered as `` `project.dataset.table` ``.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableRef {
    project_id: String,
    dataset_id: String,
    table: &'static str,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}.{}.{}`", self.project_id, self.dataset_id, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CompilerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_injection() {
        let config = CompilerConfig::new("proj`; DROP TABLE x", "cdr.v2");
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("project id"));
        assert!(errors[1].contains("dataset id"));
    }

    #[test]
    fn test_table_ref_display() {
        let config = CompilerConfig::new("all-of-us", "synthetic_cdr");
        assert_eq!(
            config.table("person").to_string(),
            "`all-of-us.synthetic_cdr.person`"
        );
    }
}

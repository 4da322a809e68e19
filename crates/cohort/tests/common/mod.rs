//! Common test utilities for compiler integration tests.
//!
//! - [`fixtures`] - Search request fixtures built from JSON
//! - [`assertions`] - Placeholder and binding consistency checks

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

use helios_cohort::{CohortQueryBuilder, CompilerConfig};

/// A builder over the default test dataset.
pub fn builder() -> CohortQueryBuilder {
    CohortQueryBuilder::new(CompilerConfig::default()).expect("default config is valid")
}

//! Helios Cohort Query Compiler
//!
//! This crate compiles cohort search requests into parameterized BigQuery SQL
//! over an OMOP CDM dataset. A request is a tree of search groups, items and
//! parameters; the output is SQL text plus a table of named, typed parameters
//! that every `@name` placeholder in the text refers to.
//!
//! # Architecture
//!
//! - [`types`] - Request model and operator vocabulary
//! - [`validation`] - Composable predicates over request values
//! - [`binding`] - The per-compile parameter binding table
//! - [`builders`] - One query builder per criteria family and the registry
//!   that dispatches to them
//! - [`compiler`] - Request-level assembly of groups into a person query
//! - [`config`] - Target project and dataset
//! - [`error`] - Error types
//!
//! Modifiers (age at event, event date, visit type, occurrence count) and
//! temporal mentions (any, first or last event per person) are applied by
//! every event-based builder.
//!
//! # Quick Start
//!
//! ```
//! use helios_cohort::{CohortQueryBuilder, CompilerConfig, SearchRequest};
//! use serde_json::json;
//!
//! let request: SearchRequest = serde_json::from_value(json!({
//!     "includes": [{
//!         "items": [{
//!             "type": "ICD9",
//!             "searchParameters": [{
//!                 "value": "250",
//!                 "domain": "Condition",
//!                 "type": "ICD9",
//!                 "subtype": "CM",
//!                 "group": true
//!             }]
//!         }]
//!     }]
//! }))
//! .unwrap();
//!
//! let builder = CohortQueryBuilder::new(CompilerConfig::new("my-project", "cdr")).unwrap();
//! let compiled = builder.count_query(&request).unwrap();
//!
//! assert!(compiled.sql.contains("c.concept_code LIKE @p0"));
//! assert_eq!(compiled.parameters.len(), 1);
//! ```
//!
//! # Threading
//!
//! Builders hold no mutable state. Each compile call creates its own
//! [`ParameterBindingTable`], so one [`CohortQueryBuilder`] can serve
//! concurrent requests.

pub mod binding;
pub mod builders;
pub mod cdm;
pub mod compiler;
pub mod config;
pub mod error;
pub mod types;
pub mod validation;

mod modifiers;
mod sql;
mod temporal;

pub use binding::{ParamRef, ParameterBindingTable, QueryParameterValue};
pub use builders::CriteriaFamily;
pub use compiler::{CohortQueryBuilder, CompiledQuery, QueryMode};
pub use config::CompilerConfig;
pub use error::{CompileError, Result, ValidationError, ValidationRule};
pub use types::{
    AttrName, Attribute, Modifier, ModifierType, Operator, SearchGroup, SearchGroupItem,
    SearchParameter, SearchRequest, TemporalMention, TemporalTime,
};

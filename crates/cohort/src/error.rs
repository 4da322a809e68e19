//! Error types for the cohort query compiler.
//!
//! Two classes of failure exist. [`ValidationError`] reports a user-correctable
//! problem with the search request and carries the exact message to surface to
//! the caller. [`CompileError::UnsupportedCriteriaType`] and
//! [`CompileError::InvalidConfig`] are programming or deployment errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::types::{ModifierType, Operator};

/// Result alias used throughout the compiler.
pub type Result<T> = std::result::Result<T, CompileError>;

/// The top-level error returned by every compile operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The request is invalid (bad request).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No builder is registered for the criteria type.
    #[error("unsupported criteria type: {criteria_type}")]
    UnsupportedCriteriaType { criteria_type: String },

    /// The compiler configuration is unusable.
    #[error("invalid compiler configuration: {message}")]
    InvalidConfig { message: String },
}

impl CompileError {
    /// Returns true for errors the caller can fix by changing the request.
    pub fn is_user_error(&self) -> bool {
        matches!(self, CompileError::Validation(_))
    }

    /// Returns the validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            CompileError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// The rule a request violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRule {
    /// A required list is empty.
    Empty,
    /// A value is missing or outside its allowed set.
    NotValid,
    /// An attribute or modifier has no operator.
    MissingOperator,
    /// Wrong number of operands for the operator.
    OperandCount,
    /// An operand must be a number.
    NotNumeric,
    /// An operand must be a `YYYY-MM-DD` date.
    NotDate,
    /// The operator is not allowed here.
    InvalidOperator,
    /// More than one modifier of the same type.
    DuplicateModifier,
    /// Blood pressure attribute shape.
    BloodPressure,
    /// The combination is not supported by the criteria type.
    Unsupported,
    /// Temporal group structure.
    TemporalGroup,
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationRule::Empty => write!(f, "empty"),
            ValidationRule::NotValid => write!(f, "not-valid"),
            ValidationRule::MissingOperator => write!(f, "missing-operator"),
            ValidationRule::OperandCount => write!(f, "operand-count"),
            ValidationRule::NotNumeric => write!(f, "not-numeric"),
            ValidationRule::NotDate => write!(f, "not-date"),
            ValidationRule::InvalidOperator => write!(f, "invalid-operator"),
            ValidationRule::DuplicateModifier => write!(f, "duplicate-modifier"),
            ValidationRule::BloodPressure => write!(f, "blood-pressure"),
            ValidationRule::Unsupported => write!(f, "unsupported"),
            ValidationRule::TemporalGroup => write!(f, "temporal-group"),
        }
    }
}

/// A user input error: which field, which rule, and the message to show.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub field: String,
    pub rule: ValidationRule,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, rule: ValidationRule, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule,
            message: message.into(),
        }
    }

    /// `Bad Request: Search <field> are empty.`
    pub fn empty(field: &str) -> Self {
        Self::new(
            field,
            ValidationRule::Empty,
            format!("Bad Request: Search {} are empty.", field),
        )
    }

    /// `Bad Request: <field> "<value>" is not valid.`
    pub fn not_valid(field: &str, value: impl fmt::Display) -> Self {
        Self::new(
            field,
            ValidationRule::NotValid,
            format!("Bad Request: {} \"{}\" is not valid.", field, value),
        )
    }

    pub fn missing_operator(field: &str) -> Self {
        Self::new(
            field,
            ValidationRule::MissingOperator,
            format!("Bad Request: {} operator is missing.", field),
        )
    }

    pub fn operand_count(field: &str, operator: Operator, expected: usize) -> Self {
        let noun = if expected == 1 { "operand" } else { "operands" };
        Self::new(
            field,
            ValidationRule::OperandCount,
            format!(
                "Bad Request: {} can only have {} {} when using the {} operator.",
                field, expected, noun, operator
            ),
        )
    }

    pub fn not_numeric(field: &str) -> Self {
        Self::new(
            field,
            ValidationRule::NotNumeric,
            format!("Bad Request: {} operands must be numeric.", field),
        )
    }

    pub fn not_date(field: &str) -> Self {
        Self::new(
            field,
            ValidationRule::NotDate,
            format!("Bad Request: {} operands must be valid dates.", field),
        )
    }

    pub fn invalid_operator(field: &str, operator: Operator) -> Self {
        Self::new(
            field,
            ValidationRule::InvalidOperator,
            format!("Bad Request: {} cannot use the {} operator.", field, operator),
        )
    }

    /// Raised when an item carries two modifiers of one type.
    pub fn duplicate_modifier(modifier: ModifierType) -> Self {
        Self::new(
            modifier.to_string(),
            ValidationRule::DuplicateModifier,
            format!(
                "Bad Request: Please provide one {} modifier.",
                modifier.description()
            ),
        )
    }

    pub fn unsupported(field: &str, message: impl Into<String>) -> Self {
        Self::new(field, ValidationRule::Unsupported, message)
    }

    pub fn temporal_group(message: impl Into<String>) -> Self {
        Self::new("Temporal Group", ValidationRule::TemporalGroup, message)
    }
}

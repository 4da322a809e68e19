//! Request validation.
//!
//! Validation rules are [`Predicate`]s over a request element. A predicate
//! describes the *invalid* case; [`Predicate::reject`] turns a match into the
//! paired [`ValidationError`]. Predicates compose with [`Predicate::and`],
//! [`Predicate::or`] and `!`.
//!
//! ```
//! use helios_cohort::validation::predicates::{type_blank, type_not_in};
//! use helios_cohort::types::SearchParameter;
//!
//! let invalid_type = type_blank().or(type_not_in(&["ICD9", "ICD10", "CPT"]));
//! let param = SearchParameter { param_type: Some("SNOMED".into()), ..Default::default() };
//! assert!(invalid_type.test(&param));
//! ```

pub mod predicates;

use std::ops::Not;

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::{Operands, Operator};

/// Field names used in validation messages.
pub mod fields {
    pub const INCLUDE_GROUPS: &str = "Include Groups";
    pub const ITEMS: &str = "Items";
    pub const PARAMETERS: &str = "Parameters";
    pub const ATTRIBUTES: &str = "Attributes";
    pub const OPERANDS: &str = "Operands";
    pub const TYPE: &str = "Type";
    pub const SUBTYPE: &str = "Subtype";
    pub const DOMAIN: &str = "Domain";
    pub const CONCEPT_ID: &str = "Concept Id";
    pub const CODE: &str = "Code";
    pub const VALUE: &str = "Value";
    pub const TIME_VALUE: &str = "Time Value";
}

/// A boolean test over a request element.
pub struct Predicate<T: ?Sized + 'static> {
    test: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: ?Sized + 'static> Predicate<T> {
    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Box::new(test),
        }
    }

    pub fn test(&self, value: &T) -> bool {
        (self.test)(value)
    }

    /// Matches when both predicates match.
    pub fn and(self, other: Predicate<T>) -> Predicate<T> {
        Predicate::new(move |v: &T| self.test(v) && other.test(v))
    }

    /// Matches when either predicate matches.
    pub fn or(self, other: Predicate<T>) -> Predicate<T> {
        Predicate::new(move |v: &T| self.test(v) || other.test(v))
    }

    /// Fails with the given error when the predicate matches.
    pub fn reject<F>(&self, value: &T, error: F) -> Result<(), ValidationError>
    where
        F: FnOnce() -> ValidationError,
    {
        if self.test(value) {
            Err(error())
        } else {
            Ok(())
        }
    }
}

impl<T: ?Sized + 'static> Not for Predicate<T> {
    type Output = Predicate<T>;

    fn not(self) -> Predicate<T> {
        Predicate::new(move |v: &T| !self.test(v))
    }
}

pub(crate) fn is_number(s: &str) -> bool {
    s.trim().parse::<f64>().map(|v| v.is_finite()).unwrap_or(false)
}

pub(crate) fn is_integer(s: &str) -> bool {
    s.trim().parse::<i64>().is_ok()
}

pub(crate) fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok()
}

pub(crate) fn parse_i64(field: &str, s: &str) -> Result<i64, ValidationError> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::not_numeric(field))
}

pub(crate) fn parse_f64(field: &str, s: &str) -> Result<f64, ValidationError> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ValidationError::not_numeric(field)),
    }
}

pub(crate) fn parse_date(field: &str, s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| ValidationError::not_date(field))
}

/// Checks that an operator is present and carries the operand count it
/// requires. Returns the operator.
pub(crate) fn validate_operator_arity<T>(field: &str, value: &T) -> Result<Operator, ValidationError>
where
    T: Operands + 'static,
{
    let operator = value
        .operator()
        .ok_or_else(|| ValidationError::missing_operator(field))?;

    predicates::operands_empty::<T>().reject(value, || ValidationError::empty(fields::OPERANDS))?;

    let expected = operator.expected_operands();
    if value.operands().len() != expected {
        return Err(ValidationError::operand_count(field, operator, expected));
    }
    Ok(operator)
}

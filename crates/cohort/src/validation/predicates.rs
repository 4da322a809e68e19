//! Predicates over search parameters, attributes and modifiers.
//!
//! Each function returns a predicate that matches the *invalid* case.

use crate::cdm::DomainTable;
use crate::types::{AttrName, Attribute, Operands, Operator, SearchParameter};

use super::{Predicate, is_date, is_integer, is_number};

/// The deceased demographic value.
pub const DECEASED: &str = "Deceased";

fn blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

pub fn parameters_empty() -> Predicate<[SearchParameter]> {
    Predicate::new(|params: &[SearchParameter]| params.is_empty())
}

/// Matches when an item asks for both an age and the deceased status.
pub fn contains_age_and_dec() -> Predicate<[SearchParameter]> {
    Predicate::new(|params: &[SearchParameter]| {
        params.iter().any(|p| p.subtype_str() == "AGE")
            && params.iter().any(|p| p.subtype_str() == "DEC")
    })
}

pub fn type_blank() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| blank(p.param_type.as_deref()))
}

pub fn type_not_in(allowed: &'static [&'static str]) -> Predicate<SearchParameter> {
    Predicate::new(move |p: &SearchParameter| !allowed.contains(&p.type_str()))
}

pub fn subtype_blank() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| blank(p.subtype.as_deref()))
}

pub fn subtype_not_in(allowed: &'static [&'static str]) -> Predicate<SearchParameter> {
    Predicate::new(move |p: &SearchParameter| !allowed.contains(&p.subtype_str()))
}

pub fn is_subtype(subtype: &'static str) -> Predicate<SearchParameter> {
    Predicate::new(move |p: &SearchParameter| p.subtype_str() == subtype)
}

pub fn domain_blank() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| blank(p.domain.as_deref()))
}

pub fn domain_invalid() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| {
        p.domain
            .as_deref()
            .map(|d| d.parse::<DomainTable>().is_err())
            .unwrap_or(true)
    })
}

pub fn concept_id_null() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| p.concept_id.is_none())
}

/// Matches a parameter without a code value.
pub fn code_blank() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| blank(p.value.as_deref()))
}

pub fn value_null() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| p.value.is_none())
}

/// Matches a value that is not a whole number.
pub fn value_not_number() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| !is_integer(p.value_str()))
}

pub fn value_not_deceased() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| p.value_str() != DECEASED)
}

pub fn attributes_empty() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| p.attributes.is_empty())
}

pub fn is_group() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| p.group)
}

/// Matches unless every attribute of the parameter is `ANY`.
pub fn not_all_any_attributes() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| p.attributes.iter().any(|a| a.name != AttrName::Any))
}

pub fn not_two_attributes() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| p.attributes.len() != 2)
}

/// Matches unless the attributes are exactly one systolic and one diastolic.
pub fn not_systolic_and_diastolic() -> Predicate<SearchParameter> {
    Predicate::new(|p: &SearchParameter| {
        let count = |name: AttrName| p.attributes.iter().filter(|a| a.name == name).count();
        count(AttrName::Systolic) != 1 || count(AttrName::Diastolic) != 1
    })
}

pub fn is_any_attribute() -> Predicate<Attribute> {
    Predicate::new(|a: &Attribute| a.name == AttrName::Any)
}

pub fn attribute_concept_id_null() -> Predicate<Attribute> {
    Predicate::new(|a: &Attribute| a.concept_id.is_none())
}

pub fn operator_null<T: Operands + 'static>() -> Predicate<T> {
    Predicate::new(|v: &T| v.operator().is_none())
}

pub fn operator_is<T: Operands + 'static>(operator: Operator) -> Predicate<T> {
    Predicate::new(move |v: &T| v.operator() == Some(operator))
}

pub fn operands_empty<T: Operands + 'static>() -> Predicate<T> {
    Predicate::new(|v: &T| v.operands().is_empty())
}

pub fn operands_not_numbers<T: Operands + 'static>() -> Predicate<T> {
    Predicate::new(|v: &T| !v.operands().iter().all(|o| is_number(o)))
}

pub fn operands_not_integers<T: Operands + 'static>() -> Predicate<T> {
    Predicate::new(|v: &T| !v.operands().iter().all(|o| is_integer(o)))
}

pub fn operands_not_dates<T: Operands + 'static>() -> Predicate<T> {
    Predicate::new(|v: &T| !v.operands().iter().all(|o| is_date(o)))
}

//! Modifier application.
//!
//! Modifiers narrow the events of an item: age at the event, event date,
//! visit type and number of occurrences. The first three become row filters
//! over the item's criteria rows; the occurrence count becomes a
//! `GROUP BY ... HAVING COUNT(...)` clause applied after every other filter.
//!
//! The same row filters are reused by the temporal wrapper, which ranks
//! events over the filtered rows.

use std::collections::HashSet;

use tracing::debug;

use crate::binding::{ParameterBindingTable, QueryParameterValue};
use crate::cdm::{PERSON, VISIT_OCCURRENCE};
use crate::config::CompilerConfig;
use crate::error::ValidationError;
use crate::sql::{Filter, ItemQuery, Operand, Query, Select, Shape, Source};
use crate::types::{Modifier, ModifierType, Operator};
use crate::validation::predicates::{
    operands_not_dates, operands_not_integers, operator_is,
};
use crate::validation::{parse_date, parse_i64, validate_operator_arity};

const AGE_AT_EVENT_SQL: &str = "CAST(FLOOR(DATE_DIFF(criteria.entry_date, \
     DATE(p.year_of_birth, p.month_of_birth, p.day_of_birth), MONTH)/12) AS INT64)";

/// Filters derived from an item's modifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ModifierClauses {
    join_person: bool,
    filters: Vec<Filter>,
    occurrences: Option<Filter>,
}

impl ModifierClauses {
    /// Validates `modifiers` and binds their operands.
    pub(crate) fn build(
        params: &mut ParameterBindingTable,
        config: &CompilerConfig,
        modifiers: &[Modifier],
    ) -> Result<Self, ValidationError> {
        validate(modifiers)?;

        let mut clauses = ModifierClauses::default();
        for kind in ModifierType::ALL {
            let Some(modifier) = modifiers.iter().find(|m| m.name == kind) else {
                continue;
            };
            let field = kind.to_string();
            let operator = validate_operator_arity(&field, modifier)?;
            let values = operand_values(&field, modifier)?;
            let operand = Operand::bind(params, kind.parameter_prefix(), operator, values)
                .ok_or_else(|| {
                    ValidationError::operand_count(&field, operator, operator.expected_operands())
                })?;

            match kind {
                ModifierType::AgeAtEvent => {
                    clauses.join_person = true;
                    clauses
                        .filters
                        .push(Filter::compare(AGE_AT_EVENT_SQL, operator, operand));
                }
                ModifierType::EventDate => {
                    clauses
                        .filters
                        .push(Filter::compare("criteria.entry_date", operator, operand));
                }
                ModifierType::Encounters => {
                    let visits = Select::new(Source::table(config.table(VISIT_OCCURRENCE), "v"))
                        .column("v.visit_occurrence_id")
                        .filter(Filter::compare("v.visit_concept_id", operator, operand))
                        .into_query();
                    clauses
                        .filters
                        .push(Filter::in_query("criteria.visit_occurrence_id", visits));
                }
                ModifierType::NumOfOccurrences => {
                    clauses.occurrences = Some(Filter::compare(
                        "COUNT(criteria.person_id)",
                        operator,
                        operand,
                    ));
                }
            }
        }

        debug!(
            modifiers = modifiers.len(),
            join_person = clauses.join_person,
            "built modifier clauses"
        );
        Ok(clauses)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.occurrences.is_none()
    }

    pub(crate) fn has_occurrences(&self) -> bool {
        self.occurrences.is_some()
    }

    /// Starts a select over `base` aliased `criteria`, with the person join
    /// and row filters in place.
    pub(crate) fn filtered(&self, config: &CompilerConfig, base: Query) -> Select {
        let mut select = Select::new(Source::subquery(base, "criteria"));
        if self.join_person {
            select = select.join(
                Source::table(config.table(PERSON), "p"),
                Filter::raw("criteria.person_id = p.person_id"),
            );
        }
        select.filters(self.filters.iter().cloned())
    }

    /// Applies the modifiers to a criteria query. Without modifiers the base
    /// query is returned unchanged.
    pub(crate) fn apply(&self, config: &CompilerConfig, base: Query) -> ItemQuery {
        if self.is_empty() {
            return ItemQuery::new(base, Shape::Criteria);
        }

        let mut select = self.filtered(config, base).column("criteria.person_id");
        if let Some(occurrences) = &self.occurrences {
            select = select
                .group_by([
                    "criteria.person_id",
                    "criteria.entry_date",
                    "criteria.concept_id",
                ])
                .having(occurrences.clone());
        }
        ItemQuery::new(select.into_query(), Shape::Persons)
    }
}

/// Checks modifier structure before any operand is bound.
pub(crate) fn validate(modifiers: &[Modifier]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for modifier in modifiers {
        if !seen.insert(modifier.name) {
            return Err(ValidationError::duplicate_modifier(modifier.name));
        }
    }

    for modifier in modifiers {
        let field = modifier.name.to_string();
        let operator = validate_operator_arity(&field, modifier)?;

        match modifier.name {
            ModifierType::Encounters => {
                (!operator_is::<Modifier>(Operator::In))
                    .reject(modifier, || ValidationError::invalid_operator(&field, operator))?;
            }
            _ => {
                operator_is::<Modifier>(Operator::In)
                    .or(operator_is(Operator::Like))
                    .reject(modifier, || ValidationError::invalid_operator(&field, operator))?;
            }
        }

        match modifier.name {
            ModifierType::EventDate => operands_not_dates::<Modifier>()
                .reject(modifier, || ValidationError::not_date(&field))?,
            _ => operands_not_integers::<Modifier>()
                .reject(modifier, || ValidationError::not_numeric(&field))?,
        }
    }
    Ok(())
}

fn operand_values(
    field: &str,
    modifier: &Modifier,
) -> Result<Vec<QueryParameterValue>, ValidationError> {
    modifier
        .operands
        .iter()
        .map(|operand| match modifier.name {
            ModifierType::EventDate => parse_date(field, operand).map(QueryParameterValue::Date),
            ModifierType::Encounters => {
                parse_i64(field, operand).map(|id| QueryParameterValue::Int64Array(vec![id]))
            }
            ModifierType::AgeAtEvent | ModifierType::NumOfOccurrences => {
                parse_i64(field, operand).map(QueryParameterValue::Int64)
            }
        })
        .collect()
}

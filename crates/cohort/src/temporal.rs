//! Temporal mentions and temporal groups.
//!
//! A mention selects which qualifying events of a person count: every event
//! (`ANY_MENTION`), or only the earliest or latest one, chosen with
//! `RANK() OVER (PARTITION BY person_id ORDER BY entry_date)` and `rn = 1`.
//! Events are ranked after modifiers have filtered them.
//!
//! A temporal group relates the events of two item sets by visit or by a day
//! window.

use crate::binding::{ParamRef, ParameterBindingTable, QueryParameterValue};
use crate::config::CompilerConfig;
use crate::error::ValidationError;
use crate::modifiers::ModifierClauses;
use crate::sql::{Filter, ItemQuery, Query, Select, SetOp, Shape, Source};
use crate::types::{TemporalMention, TemporalTime};
use crate::validation::fields;

const EVENT_COLUMNS: [&str; 3] = ["person_id", "visit_occurrence_id", "entry_date"];

/// Wraps a modified criteria query in temporal mention logic.
///
/// `base` is the criteria query before modifiers and `modified` the result of
/// [`ModifierClauses::apply`] on it. With no mention, `modified` is returned.
pub(crate) fn apply_temporal(
    config: &CompilerConfig,
    base: Query,
    modified: ItemQuery,
    clauses: &ModifierClauses,
    mention: Option<TemporalMention>,
) -> ItemQuery {
    let Some(mention) = mention else {
        return modified;
    };

    let mut events = clauses.filtered(config, base).columns([
        "criteria.person_id",
        "criteria.visit_occurrence_id",
        "criteria.entry_date",
    ]);
    if clauses.has_occurrences() {
        events = events.filter(Filter::in_query(
            "criteria.person_id",
            modified.into_person_ids(),
        ));
    }

    let descending = match mention {
        TemporalMention::AnyMention => {
            return ItemQuery::new(events.into_query(), Shape::Events);
        }
        TemporalMention::FirstMention => false,
        TemporalMention::LastMention => true,
    };

    let ranked = Select::new(Source::subquery(events.into_query(), "events"))
        .columns(EVENT_COLUMNS)
        .rank("person_id", "entry_date", descending, "rn")
        .into_query();
    let first = Select::new(Source::subquery(ranked, "ranked"))
        .columns(EVENT_COLUMNS)
        .filter(Filter::raw("rn = 1"))
        .into_query();
    ItemQuery::new(first, Shape::Events)
}

/// Builds the join condition between `temp1` and `temp2` events.
pub(crate) fn temporal_condition(
    params: &mut ParameterBindingTable,
    time: TemporalTime,
    time_value: Option<i64>,
) -> Result<Filter, ValidationError> {
    let same_person = "temp1.person_id = temp2.person_id";
    let condition = match time {
        TemporalTime::DuringSameEncounterAs => format!(
            "{} AND temp1.visit_occurrence_id = temp2.visit_occurrence_id",
            same_person
        ),
        TemporalTime::XDaysBefore => format!(
            "{} AND temp1.entry_date <= DATE_SUB(temp2.entry_date, INTERVAL {} DAY)",
            same_person,
            bind_days(params, time_value)?
        ),
        TemporalTime::XDaysAfter => format!(
            "{} AND temp1.entry_date >= DATE_ADD(temp2.entry_date, INTERVAL {} DAY)",
            same_person,
            bind_days(params, time_value)?
        ),
        TemporalTime::WithinXDaysOf => {
            let days = bind_days(params, time_value)?;
            format!(
                "{} AND temp1.entry_date BETWEEN DATE_SUB(temp2.entry_date, INTERVAL {} DAY) \
                 AND DATE_ADD(temp2.entry_date, INTERVAL {} DAY)",
                same_person, days, days
            )
        }
    };
    Ok(Filter::raw(condition))
}

fn bind_days(
    params: &mut ParameterBindingTable,
    time_value: Option<i64>,
) -> Result<ParamRef, ValidationError> {
    match time_value {
        Some(days) if days >= 0 => Ok(params.bind(QueryParameterValue::Int64(days))),
        Some(days) => Err(ValidationError::not_valid(fields::TIME_VALUE, days)),
        None => Err(ValidationError::empty(fields::TIME_VALUE)),
    }
}

/// Relates the events of the two item sets of a temporal group.
///
/// A single second item is checked with `EXISTS`; several are joined.
pub(crate) fn temporal_group_query(
    first: Vec<Query>,
    mut second: Vec<Query>,
    condition: Filter,
) -> Query {
    let temp1 = Source::subquery(Query::compound(SetOp::UnionAll, first), "temp1");

    if second.len() == 1 {
        if let Some(only) = second.pop() {
            let exists = Select::new(Source::subquery(only, "temp2"))
                .column("1")
                .filter(condition)
                .into_query();
            return Select::new(temp1)
                .column("temp1.person_id")
                .filter(Filter::Exists(Box::new(exists)))
                .into_query();
        }
    }

    let temp2 = Select::new(Source::subquery(
        Query::compound(SetOp::UnionAll, second),
        "events",
    ))
    .columns(EVENT_COLUMNS)
    .into_query();
    Select::new(temp1)
        .distinct()
        .column("temp1.person_id")
        .join(Source::subquery(temp2, "temp2"), condition)
        .into_query()
}

//! Drug criteria.
//!
//! Parent parameters are ATC classes: they match every selectable drug below
//! them in the criteria tree, found by `path LIKE '%.<id>%'`. Child
//! parameters match their concept ids exactly. Each bucket gets its own
//! modifiers and temporal wrapping before the buckets are unioned.

use crate::binding::{ParamRef, ParameterBindingTable, QueryParameterValue};
use crate::cdm::{CRITERIA, DomainTable};
use crate::config::CompilerConfig;
use crate::error::{Result, ValidationError};
use crate::modifiers;
use crate::sql::{Filter, ItemQuery, Query, Select, Source};
use crate::types::{SearchGroupItem, SearchParameter, TemporalMention};
use crate::validation::fields;
use crate::validation::predicates::{concept_id_null, parameters_empty, type_blank, type_not_in};

use super::{CriteriaQueryBuilder, criteria_columns, finish, union_all};

const DRUG_TYPES: &[&str] = &["DRUG"];

/// Builds drug criteria queries.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DrugQueryBuilder;

impl CriteriaQueryBuilder for DrugQueryBuilder {
    fn build(
        &self,
        config: &CompilerConfig,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<ItemQuery> {
        let (parents, children) = split(&item.search_parameters)?;
        modifiers::validate(&item.modifiers)?;

        let mut parts = Vec::with_capacity(2);
        if !parents.is_empty() {
            let ids = params.bind(QueryParameterValue::Int64Array(parents));
            let filter = Filter::in_query("de.drug_concept_id", atc_descendants(config, ids));
            parts.push(finish(config, params, drug_query(config, filter), item, mention)?);
        }
        if !children.is_empty() {
            let ids = params.bind(QueryParameterValue::Int64Array(children));
            let filter = Filter::in_unnest("de.drug_concept_id", ids);
            parts.push(finish(config, params, drug_query(config, filter), item, mention)?);
        }

        union_all(parts).ok_or_else(|| ValidationError::empty(fields::PARAMETERS).into())
    }
}

/// Validates parameters and splits their concept ids into parents and
/// children.
fn split(parameters: &[SearchParameter]) -> Result<(Vec<i64>, Vec<i64>)> {
    parameters_empty().reject(parameters, || ValidationError::empty(fields::PARAMETERS))?;
    let invalid_type = type_blank().or(type_not_in(DRUG_TYPES));
    let missing_concept = concept_id_null();

    let mut parents = Vec::new();
    let mut children = Vec::new();
    for param in parameters {
        invalid_type.reject(param, || ValidationError::not_valid(fields::TYPE, param.type_str()))?;
        missing_concept.reject(param, || ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
        let Some(concept_id) = param.concept_id else {
            continue;
        };
        if param.group {
            parents.push(concept_id);
        } else {
            children.push(concept_id);
        }
    }
    Ok((parents, children))
}

fn drug_query(config: &CompilerConfig, filter: Filter) -> Query {
    let drug = DomainTable::Drug;
    Select::new(Source::table(config.table(drug.table_name()), "de"))
        .columns(criteria_columns(
            "de",
            drug.entry_date_column(),
            drug.concept_id_column(),
        ))
        .filter(filter)
        .into_query()
}

/// Selectable drug concepts under the ATC classes bound in `ids`.
fn atc_descendants(config: &CompilerConfig, ids: ParamRef) -> Query {
    let paths = Select::new(Source::table(config.table(CRITERIA), "c"))
        .column("CONCAT('%.', CAST(c.id AS STRING), '%') AS path")
        .filter(Filter::in_unnest("c.concept_id", ids))
        .into_query();

    Select::new(Source::table(config.table(CRITERIA), "a"))
        .column("a.concept_id")
        .join(Source::subquery(paths, "b"), Filter::raw("a.path LIKE b.path"))
        .filter(Filter::raw("a.is_group = 0"))
        .filter(Filter::raw("a.is_selectable = 1"))
        .filter(Filter::constants("a.type", &["DRUG"]))
        .filter(Filter::constants("a.subtype", &["ATC"]))
        .into_query()
}

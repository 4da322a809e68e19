//! Demographic criteria: gender, race, ethnicity, age and deceased status.
//!
//! Demographics are properties of the person rather than events, so each
//! parameter selects `person_id` directly and the parameters are combined
//! with `UNION DISTINCT`. Modifiers and temporal mentions do not apply.

use crate::binding::{ParameterBindingTable, QueryParameterValue};
use crate::cdm::{DEATH, PERSON};
use crate::config::CompilerConfig;
use crate::error::{Result, ValidationError};
use crate::sql::{Filter, ItemQuery, Query, Select, SetOp, Shape, Source};
use crate::types::{SearchGroupItem, SearchParameter, TemporalMention};
use crate::validation::predicates::{
    concept_id_null, contains_age_and_dec, is_subtype, parameters_empty, subtype_blank,
    subtype_not_in, type_blank, type_not_in, value_not_deceased, value_not_number, value_null,
};
use crate::validation::{fields, parse_i64};

use super::CriteriaQueryBuilder;

const DEMO_TYPES: &[&str] = &["DEMO"];
const DEMO_SUBTYPES: &[&str] = &["AGE", "DEC", "GEN", "RACE", "ETH"];

/// Age in whole years today.
const AGE_SQL: &str =
    "DATE_DIFF(CURRENT_DATE, DATE(p.year_of_birth, p.month_of_birth, p.day_of_birth), YEAR)";

/// Builds demographic criteria queries.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DemographicsQueryBuilder;

impl CriteriaQueryBuilder for DemographicsQueryBuilder {
    fn build(
        &self,
        config: &CompilerConfig,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<ItemQuery> {
        validate(item, mention)?;

        let mut parts = Vec::with_capacity(item.search_parameters.len());
        for param in &item.search_parameters {
            parts.push(demographic_query(config, params, param)?);
        }
        Ok(ItemQuery::new(
            Query::compound(SetOp::UnionDistinct, parts),
            Shape::Persons,
        ))
    }
}

fn validate(item: &SearchGroupItem, mention: Option<TemporalMention>) -> Result<()> {
    let parameters = &item.search_parameters;
    parameters_empty().reject(parameters, || ValidationError::empty(fields::PARAMETERS))?;
    contains_age_and_dec().reject(parameters, || {
        ValidationError::unsupported(
            fields::SUBTYPE,
            "Bad Request: Age and Deceased cannot be searched together.",
        )
    })?;
    if !item.modifiers.is_empty() {
        return Err(ValidationError::unsupported(
            "Modifiers",
            "Bad Request: Modifiers are not supported for demographics.",
        )
        .into());
    }
    if mention.is_some() {
        return Err(ValidationError::unsupported(
            "Temporal Mention",
            "Bad Request: Temporal mentions are not supported for demographics.",
        )
        .into());
    }

    let invalid_type = type_blank().or(type_not_in(DEMO_TYPES));
    let invalid_subtype = subtype_blank().or(subtype_not_in(DEMO_SUBTYPES));
    let concept_required = is_subtype("GEN")
        .or(is_subtype("RACE"))
        .or(is_subtype("ETH"))
        .and(concept_id_null());
    let invalid_age = is_subtype("AGE").and(value_null().or(value_not_number()));
    let invalid_deceased = is_subtype("DEC").and(value_null().or(value_not_deceased()));

    for param in parameters {
        invalid_type.reject(param, || ValidationError::not_valid(fields::TYPE, param.type_str()))?;
        invalid_subtype.reject(param, || {
            ValidationError::not_valid(fields::SUBTYPE, param.subtype_str())
        })?;
        concept_required.reject(param, || ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
        invalid_age.reject(param, || ValidationError::not_valid(fields::VALUE, param.value_str()))?;
        invalid_deceased
            .reject(param, || ValidationError::not_valid(fields::VALUE, param.value_str()))?;
    }
    Ok(())
}

fn demographic_query(
    config: &CompilerConfig,
    params: &mut ParameterBindingTable,
    param: &SearchParameter,
) -> Result<Query> {
    if param.subtype_str() == "DEC" {
        return Ok(Select::new(Source::table(config.table(DEATH), "d"))
            .column("d.person_id")
            .into_query());
    }

    let filters = match param.subtype_str() {
        "AGE" => {
            let age = parse_i64(fields::VALUE, param.value_str())?;
            vec![
                Filter::eq(AGE_SQL, params.bind(QueryParameterValue::Int64(age))),
                Filter::NotExists(Box::new(deceased(config, "p.person_id"))),
            ]
        }
        subtype => {
            let column = match subtype {
                "GEN" => "p.gender_concept_id",
                "RACE" => "p.race_concept_id",
                "ETH" => "p.ethnicity_concept_id",
                other => return Err(ValidationError::not_valid(fields::SUBTYPE, other).into()),
            };
            let concept_id = param
                .concept_id
                .ok_or_else(|| ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
            vec![Filter::eq(column, params.bind(QueryParameterValue::Int64(concept_id)))]
        }
    };

    Ok(Select::new(Source::table(config.table(PERSON), "p"))
        .column("p.person_id")
        .filters(filters)
        .into_query())
}

/// Death records of the person in `person_column`.
fn deceased(config: &CompilerConfig, person_column: &str) -> Query {
    Select::new(Source::table(config.table(DEATH), "d"))
        .column("'x'")
        .filter(Filter::raw(format!("d.person_id = {}", person_column)))
        .into_query()
}

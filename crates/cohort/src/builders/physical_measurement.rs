//! Physical measurement criteria.
//!
//! Blood pressure is a pair of readings: the systolic and diastolic queries
//! are intersected on person, date and visit so both must hold for the same
//! visit. Other attribute-based subtypes filter like lab measurements.
//! Heart rhythm, pregnancy and wheelchair use are coded answers matched on
//! `value_as_concept_id`.

use crate::binding::{ParameterBindingTable, QueryParameterValue};
use crate::cdm::DomainTable;
use crate::config::CompilerConfig;
use crate::error::{Result, ValidationError, ValidationRule};
use crate::modifiers;
use crate::sql::{Filter, ItemQuery, Query, Select, SetOp, Source};
use crate::types::{Attribute, SearchGroupItem, SearchParameter, TemporalMention};
use crate::validation::predicates::{
    attribute_concept_id_null, attributes_empty, concept_id_null, is_any_attribute, is_subtype,
    not_all_any_attributes, not_systolic_and_diastolic, not_two_attributes, parameters_empty,
    subtype_blank, subtype_not_in, type_blank, type_not_in, value_not_number, value_null,
};
use crate::validation::{fields, parse_i64};

use super::{
    CriteriaQueryBuilder, criteria_columns, finish, numeric_filter, validate_numeric,
    validate_value_attribute, value_filter,
};

const PM_TYPES: &[&str] = &["PM"];
const PM_SUBTYPES: &[&str] = &[
    "BP", "HR_DETAIL", "HEIGHT", "WEIGHT", "BMI", "WC", "HC", "HR", "PREG", "WHEEL",
];
const VALUE_SUBTYPES: &[&str] = &["HR", "PREG", "WHEEL"];

const BP_COLUMNS: [&str; 3] = [
    "m.person_id",
    "m.measurement_date AS entry_date",
    "m.visit_occurrence_id",
];

/// Builds physical measurement criteria queries.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PhysicalMeasurementQueryBuilder;

impl CriteriaQueryBuilder for PhysicalMeasurementQueryBuilder {
    fn build(
        &self,
        config: &CompilerConfig,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<ItemQuery> {
        validate(&item.search_parameters)?;
        modifiers::validate(&item.modifiers)?;

        let mut parts = Vec::with_capacity(item.search_parameters.len());
        for param in &item.search_parameters {
            let part = match param.subtype_str() {
                "BP" => blood_pressure_query(config, params, param)?,
                subtype if VALUE_SUBTYPES.contains(&subtype) => {
                    coded_value_query(config, params, param)?
                }
                _ => attribute_query(config, params, param)?,
            };
            parts.push(part);
        }
        finish(config, params, Query::compound(SetOp::UnionAll, parts), item, mention)
    }
}

fn validate(parameters: &[SearchParameter]) -> Result<()> {
    parameters_empty().reject(parameters, || ValidationError::empty(fields::PARAMETERS))?;

    let invalid_type = type_blank().or(type_not_in(PM_TYPES));
    let invalid_subtype = subtype_blank().or(subtype_not_in(PM_SUBTYPES));
    let is_value_subtype = is_subtype("HR").or(is_subtype("PREG")).or(is_subtype("WHEEL"));
    let invalid_value = value_null().or(value_not_number());
    let missing_concept = concept_id_null();
    let missing_attributes = attributes_empty();

    for param in parameters {
        invalid_type.reject(param, || ValidationError::not_valid(fields::TYPE, param.type_str()))?;
        invalid_subtype.reject(param, || {
            ValidationError::not_valid(fields::SUBTYPE, param.subtype_str())
        })?;

        if param.subtype_str() == "BP" {
            validate_blood_pressure(param)?;
        } else if is_value_subtype.test(param) {
            missing_concept
                .reject(param, || ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
            invalid_value
                .reject(param, || ValidationError::not_valid(fields::VALUE, param.value_str()))?;
        } else {
            missing_attributes.reject(param, || ValidationError::empty(fields::ATTRIBUTES))?;
            if measurement_concept(param).is_none() {
                return Err(ValidationError::not_valid(fields::CONCEPT_ID, "null").into());
            }
            for attr in &param.attributes {
                validate_value_attribute(attr)?;
            }
        }
    }
    Ok(())
}

fn validate_blood_pressure(param: &SearchParameter) -> Result<()> {
    not_two_attributes().reject(param, || {
        ValidationError::new(
            fields::ATTRIBUTES,
            ValidationRule::BloodPressure,
            "Bad Request: Provide two attributes for Blood Pressure.",
        )
    })?;
    not_all_any_attributes().and(not_systolic_and_diastolic()).reject(param, || {
        ValidationError::new(
            fields::ATTRIBUTES,
            ValidationRule::BloodPressure,
            "Bad Request: Provide Systolic and Diastolic attributes.",
        )
    })?;

    let missing_concept = attribute_concept_id_null();
    let any = is_any_attribute();
    for attr in &param.attributes {
        missing_concept.reject(attr, || ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
        if !any.test(attr) {
            validate_numeric(attr)?;
        }
    }
    Ok(())
}

/// The parameter's concept, or the concept of its first attribute.
fn measurement_concept(param: &SearchParameter) -> Option<i64> {
    param
        .concept_id
        .or_else(|| param.attributes.first().and_then(|a| a.concept_id))
}

fn measurement_select(config: &CompilerConfig) -> Select {
    Select::new(Source::table(
        config.table(DomainTable::Measurement.table_name()),
        "m",
    ))
}

fn source_concept_column() -> String {
    format!("m.{}", DomainTable::Measurement.source_concept_id_column())
}

/// Systolic and diastolic readings intersected per visit.
fn blood_pressure_query(
    config: &CompilerConfig,
    params: &mut ParameterBindingTable,
    param: &SearchParameter,
) -> Result<Query> {
    let mut readings = Vec::with_capacity(param.attributes.len());
    for attr in &param.attributes {
        readings.push(reading_query(config, params, attr)?);
    }

    Ok(Select::new(Source::subquery(
        Query::compound(SetOp::IntersectDistinct, readings),
        "bp",
    ))
    .columns([
        "bp.person_id",
        "bp.entry_date",
        "CAST(NULL AS INT64) AS concept_id",
        "bp.visit_occurrence_id",
    ])
    .into_query())
}

fn reading_query(
    config: &CompilerConfig,
    params: &mut ParameterBindingTable,
    attr: &Attribute,
) -> Result<Query> {
    let concept_id = attr
        .concept_id
        .ok_or_else(|| ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
    let concept = params.bind(QueryParameterValue::Int64(concept_id));

    let mut select = measurement_select(config)
        .columns(BP_COLUMNS)
        .filter(Filter::eq(source_concept_column(), concept));
    if !is_any_attribute().test(attr) {
        select = select.filter(numeric_filter(params, "m.value_as_number", attr)?);
    }
    Ok(select.into_query())
}

fn attribute_query(
    config: &CompilerConfig,
    params: &mut ParameterBindingTable,
    param: &SearchParameter,
) -> Result<Query> {
    let concept_id = measurement_concept(param)
        .ok_or_else(|| ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
    let concept = params.bind(QueryParameterValue::Int64(concept_id));
    let values = value_filter(params, "m", &param.attributes)?;

    Ok(pm_select(config)
        .filter(Filter::eq(source_concept_column(), concept))
        .filters(values)
        .into_query())
}

fn coded_value_query(
    config: &CompilerConfig,
    params: &mut ParameterBindingTable,
    param: &SearchParameter,
) -> Result<Query> {
    let concept_id = param
        .concept_id
        .ok_or_else(|| ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
    let value = parse_i64(fields::VALUE, param.value_str())?;
    let concept = params.bind(QueryParameterValue::Int64(concept_id));
    let value = params.bind(QueryParameterValue::Int64(value));

    Ok(pm_select(config)
        .filter(Filter::eq(source_concept_column(), concept))
        .filter(Filter::eq("m.value_as_concept_id", value))
        .into_query())
}

fn pm_select(config: &CompilerConfig) -> Select {
    let measurement = DomainTable::Measurement;
    measurement_select(config).columns(criteria_columns(
        "m",
        measurement.entry_date_column(),
        measurement.source_concept_id_column(),
    ))
}

//! Lab measurement criteria.
//!
//! Each parameter is one measurement concept with value attributes. Attributes
//! of a parameter are OR'd; parameters are unioned.

use crate::binding::{ParameterBindingTable, QueryParameterValue};
use crate::cdm::DomainTable;
use crate::config::CompilerConfig;
use crate::error::{Result, ValidationError};
use crate::modifiers;
use crate::sql::{Filter, ItemQuery, Query, Select, SetOp, Source};
use crate::types::{SearchGroupItem, SearchParameter, TemporalMention};
use crate::validation::fields;
use crate::validation::predicates::{
    attributes_empty, concept_id_null, parameters_empty, type_blank, type_not_in,
};

use super::{CriteriaQueryBuilder, criteria_columns, finish, validate_value_attribute, value_filter};

const MEAS_TYPES: &[&str] = &["MEAS"];

/// Builds measurement criteria queries.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MeasurementQueryBuilder;

impl CriteriaQueryBuilder for MeasurementQueryBuilder {
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
            parts.push(measurement_query(config, params, param)?);
        }
        finish(config, params, Query::compound(SetOp::UnionAll, parts), item, mention)
    }
}

fn validate(parameters: &[SearchParameter]) -> Result<()> {
    parameters_empty().reject(parameters, || ValidationError::empty(fields::PARAMETERS))?;
    let invalid_type = type_blank().or(type_not_in(MEAS_TYPES));
    let missing_concept = concept_id_null();
    let missing_attributes = attributes_empty();

    for param in parameters {
        invalid_type.reject(param, || ValidationError::not_valid(fields::TYPE, param.type_str()))?;
        missing_concept.reject(param, || ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;
        missing_attributes.reject(param, || ValidationError::empty(fields::ATTRIBUTES))?;
        for attr in &param.attributes {
            validate_value_attribute(attr)?;
        }
    }
    Ok(())
}

fn measurement_query(
    config: &CompilerConfig,
    params: &mut ParameterBindingTable,
    param: &SearchParameter,
) -> Result<Query> {
    let measurement = DomainTable::Measurement;
    let concept_id = param
        .concept_id
        .ok_or_else(|| ValidationError::not_valid(fields::CONCEPT_ID, "null"))?;

    // value placeholders come before the concept placeholder
    let values = value_filter(params, "m", &param.attributes)?;
    let concept = params.bind(QueryParameterValue::Int64(concept_id));

    Ok(
        Select::new(Source::table(config.table(measurement.table_name()), "m"))
            .columns(criteria_columns(
                "m",
                measurement.entry_date_column(),
                measurement.concept_id_column(),
            ))
            .filter(Filter::eq(
                format!("m.{}", measurement.concept_id_column()),
                concept,
            ))
            .filters(values)
            .into_query(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationRule;
    use crate::sql::Shape;
    use crate::types::{AttrName, Attribute, Operator};

    fn attr(name: AttrName, operator: Option<Operator>, operands: &[&str]) -> Attribute {
        Attribute {
            name,
            operator,
            operands: operands.iter().map(|s| s.to_string()).collect(),
            concept_id: None,
        }
    }

    fn meas(concept_id: i64, attributes: Vec<Attribute>) -> SearchParameter {
        SearchParameter {
            concept_id: Some(concept_id),
            param_type: Some("MEAS".to_string()),
            subtype: Some("LAB".to_string()),
            attributes,
            ..Default::default()
        }
    }

    fn build(params: Vec<SearchParameter>) -> Result<(ItemQuery, ParameterBindingTable)> {
        let config = CompilerConfig::default();
        let mut table = ParameterBindingTable::new();
        let item = SearchGroupItem {
            item_type: "MEAS".to_string(),
            search_parameters: params,
            ..Default::default()
        };
        let built = MeasurementQueryBuilder.build(&config, &mut table, &item, None)?;
        Ok((built, table))
    }

    #[test]
    fn test_categorical_attribute() {
        let (built, params) = build(vec![meas(
            3015813,
            vec![attr(AttrName::Cat, Some(Operator::In), &["12345", "12346"])],
        )])
        .unwrap();
        let sql = built.query.to_string();

        assert_eq!(built.shape, Shape::Criteria);
        assert!(sql.contains("WHERE m.measurement_concept_id = @p1"));
        assert!(sql.contains("AND m.value_as_concept_id IN UNNEST(@p0)"));
        assert_eq!(
            params.get("p0"),
            Some(&QueryParameterValue::Int64Array(vec![12345, 12346]))
        );
        assert_eq!(params.get("p1"), Some(&QueryParameterValue::Int64(3015813)));
    }

    #[test]
    fn test_any_attribute_is_bare_query() {
        let (built, params) =
            build(vec![meas(3015813, vec![attr(AttrName::Any, None, &[])])]).unwrap();
        let sql = built.query.to_string();
        assert!(sql.ends_with("WHERE m.measurement_concept_id = @p0"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_numeric_between_and_union() {
        let (built, params) = build(vec![
            meas(
                3004410,
                vec![attr(AttrName::Num, Some(Operator::Between), &["5", "7.5"])],
            ),
            meas(
                3015813,
                vec![attr(AttrName::Num, Some(Operator::LessThan), &["100"])],
            ),
        ])
        .unwrap();
        let sql = built.query.to_string();

        assert!(sql.contains("AND m.value_as_number BETWEEN @p0 AND @p1"));
        assert!(sql.contains("\nUNION ALL\n"));
        assert!(sql.contains("AND m.value_as_number < @p3"));
        assert_eq!(params.get("p1"), Some(&QueryParameterValue::Float64(7.5)));
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn test_validation() {
        let err = build(vec![]).unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, fields::PARAMETERS);

        let err = build(vec![meas(1, vec![])]).unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, fields::ATTRIBUTES);

        let err = build(vec![meas(
            1,
            vec![attr(AttrName::Num, Some(Operator::Between), &["5"])],
        )])
        .unwrap_err();
        assert_eq!(err.as_validation().unwrap().rule, ValidationRule::OperandCount);

        let mut no_concept = meas(1, vec![attr(AttrName::Any, None, &[])]);
        no_concept.concept_id = None;
        let err = build(vec![no_concept]).unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, fields::CONCEPT_ID);
    }
}

//! Criteria query builders.
//!
//! One builder per criteria family turns a [`SearchGroupItem`] into an event
//! query. [`CriteriaFamily::resolve`] maps the item's type tag to its builder;
//! the set of families is closed, so dispatch is an exhaustive `match`.
//!
//! Builders are stateless. All per-compile state lives in the
//! [`ParameterBindingTable`] passed to them.

mod codes;
mod demographics;
mod drug;
mod measurement;
mod physical_measurement;

use std::fmt;

use tracing::debug;

use codes::CodesQueryBuilder;
use demographics::DemographicsQueryBuilder;
use drug::DrugQueryBuilder;
use measurement::MeasurementQueryBuilder;
use physical_measurement::PhysicalMeasurementQueryBuilder;

use crate::binding::{ParameterBindingTable, QueryParameterValue};
use crate::config::CompilerConfig;
use crate::error::{CompileError, Result, ValidationError};
use crate::modifiers::ModifierClauses;
use crate::sql::{Filter, ItemQuery, Operand, Query, SetOp};
use crate::temporal::apply_temporal;
use crate::types::{AttrName, Attribute, Operator, SearchGroupItem, TemporalMention};
use crate::validation::predicates::{operands_empty, operands_not_integers, operands_not_numbers};
use crate::validation::{fields, parse_f64, parse_i64, validate_operator_arity};

/// Shared contract of the criteria builders.
pub(crate) trait CriteriaQueryBuilder {
    /// Validates the item and builds its query. Nothing is bound when
    /// validation fails.
    fn build(
        &self,
        config: &CompilerConfig,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<ItemQuery>;
}

/// The criteria families, one per builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriteriaFamily {
    /// ICD9, ICD10 and CPT codes.
    Codes,
    Demographics,
    Drug,
    Measurement,
    PhysicalMeasurement,
}

impl CriteriaFamily {
    /// Every type tag the registry accepts.
    pub const TYPE_TAGS: [&'static str; 12] = [
        "ICD9",
        "ICD10",
        "CPT",
        "DEMO",
        "DEMO_GEN",
        "DEMO_AGE",
        "DEMO_RACE",
        "DEMO_ETH",
        "DEMO_DEC",
        "DRUG",
        "MEAS",
        "PM",
    ];

    /// Resolves a criteria type tag to its family.
    pub fn resolve(criteria_type: &str) -> Result<Self> {
        match criteria_type.trim().to_uppercase().as_str() {
            "ICD9" | "ICD10" | "CPT" => Ok(CriteriaFamily::Codes),
            "DEMO" | "DEMO_GEN" | "DEMO_AGE" | "DEMO_RACE" | "DEMO_ETH" | "DEMO_DEC" => {
                Ok(CriteriaFamily::Demographics)
            }
            "DRUG" => Ok(CriteriaFamily::Drug),
            "MEAS" => Ok(CriteriaFamily::Measurement),
            "PM" => Ok(CriteriaFamily::PhysicalMeasurement),
            _ => Err(CompileError::UnsupportedCriteriaType {
                criteria_type: criteria_type.to_string(),
            }),
        }
    }

    /// Compiles one item and returns its SQL text. Placeholders in the text
    /// are bound in `params`.
    ///
    /// `config` is validated first since its names end up in table
    /// references.
    pub fn compile(
        self,
        config: &CompilerConfig,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<String> {
        config
            .validate()
            .map_err(|errors| CompileError::InvalidConfig {
                message: errors.join("; "),
            })?;
        Ok(self.build(config, params, item, mention)?.query.to_string())
    }

    pub(crate) fn build(
        self,
        config: &CompilerConfig,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<ItemQuery> {
        debug!(
            criteria_type = %item.item_type,
            family = %self,
            parameters = item.search_parameters.len(),
            modifiers = item.modifiers.len(),
            "building criteria query"
        );
        match self {
            CriteriaFamily::Codes => CodesQueryBuilder.build(config, params, item, mention),
            CriteriaFamily::Demographics => {
                DemographicsQueryBuilder.build(config, params, item, mention)
            }
            CriteriaFamily::Drug => DrugQueryBuilder.build(config, params, item, mention),
            CriteriaFamily::Measurement => {
                MeasurementQueryBuilder.build(config, params, item, mention)
            }
            CriteriaFamily::PhysicalMeasurement => {
                PhysicalMeasurementQueryBuilder.build(config, params, item, mention)
            }
        }
    }
}

impl fmt::Display for CriteriaFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriteriaFamily::Codes => write!(f, "codes"),
            CriteriaFamily::Demographics => write!(f, "demographics"),
            CriteriaFamily::Drug => write!(f, "drug"),
            CriteriaFamily::Measurement => write!(f, "measurement"),
            CriteriaFamily::PhysicalMeasurement => write!(f, "physical-measurement"),
        }
    }
}

/// Select list of a criteria query over `alias`.
fn criteria_columns(alias: &str, entry_date: &str, concept_id: &str) -> [String; 4] {
    [
        format!("{}.person_id", alias),
        format!("{}.{} AS entry_date", alias, entry_date),
        format!("{}.{} AS concept_id", alias, concept_id),
        format!("{}.visit_occurrence_id", alias),
    ]
}

/// Applies modifiers and the temporal mention to a criteria query.
fn finish(
    config: &CompilerConfig,
    params: &mut ParameterBindingTable,
    base: Query,
    item: &SearchGroupItem,
    mention: Option<TemporalMention>,
) -> Result<ItemQuery> {
    let clauses = ModifierClauses::build(params, config, &item.modifiers)?;
    let modified = clauses.apply(config, base.clone());
    Ok(apply_temporal(config, base, modified, &clauses, mention))
}

/// Unions item queries of the same shape with `UNION ALL`.
fn union_all(parts: Vec<ItemQuery>) -> Option<ItemQuery> {
    let shape = parts.first()?.shape;
    let queries = parts.into_iter().map(|part| part.query).collect();
    Some(ItemQuery::new(Query::compound(SetOp::UnionAll, queries), shape))
}

fn attribute_field(attr: &Attribute) -> String {
    format!("Attribute {}", attr.name)
}

/// Uses the categorical form for `CAT`, and for `BOTH` with `IN`.
fn is_categorical(attr: &Attribute) -> bool {
    attr.name == AttrName::Cat || (attr.name == AttrName::Both && attr.operator == Some(Operator::In))
}

fn validate_numeric(attr: &Attribute) -> std::result::Result<Operator, ValidationError> {
    let field = attribute_field(attr);
    let operator = validate_operator_arity(&field, attr)?;
    if !(operator.is_comparison() || operator == Operator::Between) {
        return Err(ValidationError::invalid_operator(&field, operator));
    }
    operands_not_numbers::<Attribute>().reject(attr, || ValidationError::not_numeric(&field))?;
    Ok(operator)
}

fn validate_categorical(attr: &Attribute) -> std::result::Result<(), ValidationError> {
    let field = attribute_field(attr);
    let operator = attr
        .operator
        .ok_or_else(|| ValidationError::missing_operator(&field))?;
    if operator != Operator::In {
        return Err(ValidationError::invalid_operator(&field, operator));
    }
    operands_empty::<Attribute>().reject(attr, || ValidationError::empty(fields::OPERANDS))?;
    operands_not_integers::<Attribute>().reject(attr, || ValidationError::not_numeric(&field))
}

/// Validates a measurement value attribute.
fn validate_value_attribute(attr: &Attribute) -> std::result::Result<(), ValidationError> {
    match attr.name {
        AttrName::Any => Ok(()),
        AttrName::Num => validate_numeric(attr).map(|_| ()),
        AttrName::Both if !is_categorical(attr) => validate_numeric(attr).map(|_| ()),
        AttrName::Cat | AttrName::Both => validate_categorical(attr),
        AttrName::Systolic | AttrName::Diastolic => Err(ValidationError::not_valid(
            fields::ATTRIBUTES,
            attr.name,
        )),
    }
}

/// `<expr> <op> @p` over float operands.
fn numeric_filter(
    params: &mut ParameterBindingTable,
    expr: &str,
    attr: &Attribute,
) -> std::result::Result<Filter, ValidationError> {
    let operator = validate_numeric(attr)?;
    let field = attribute_field(attr);
    let values = attr
        .operands
        .iter()
        .map(|o| parse_f64(&field, o).map(QueryParameterValue::Float64))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let operand = Operand::bind(params, "p", operator, values).ok_or_else(|| {
        ValidationError::operand_count(&field, operator, operator.expected_operands())
    })?;
    Ok(Filter::compare(expr, operator, operand))
}

/// `<expr> IN UNNEST(@p)` over an array of concept ids.
fn categorical_filter(
    params: &mut ParameterBindingTable,
    expr: &str,
    attr: &Attribute,
) -> std::result::Result<Filter, ValidationError> {
    validate_categorical(attr)?;
    let field = attribute_field(attr);
    let ids = attr
        .operands
        .iter()
        .map(|o| parse_i64(&field, o))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Filter::in_unnest(
        expr,
        params.bind(QueryParameterValue::Int64Array(ids)),
    ))
}

/// Value filter for a measurement parameter: the attributes OR'd together.
/// Returns `None` when any attribute is `ANY`.
fn value_filter(
    params: &mut ParameterBindingTable,
    alias: &str,
    attributes: &[Attribute],
) -> std::result::Result<Option<Filter>, ValidationError> {
    if attributes.iter().any(|a| a.name == AttrName::Any) {
        return Ok(None);
    }
    let number = format!("{}.value_as_number", alias);
    let concept = format!("{}.value_as_concept_id", alias);

    let mut filters = Vec::with_capacity(attributes.len());
    for attr in attributes {
        if is_categorical(attr) {
            filters.push(categorical_filter(params, &concept, attr)?);
        } else {
            filters.push(numeric_filter(params, &number, attr)?);
        }
    }
    Ok(match filters.len() {
        0 => None,
        _ => Some(Filter::Any(filters)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchParameter;

    fn attr(name: AttrName, operator: Operator, operands: &[&str]) -> Attribute {
        Attribute {
            name,
            operator: Some(operator),
            operands: operands.iter().map(|s| s.to_string()).collect(),
            concept_id: None,
        }
    }

    #[test]
    fn test_resolve_every_tag() {
        let expected = [
            ("ICD9", CriteriaFamily::Codes),
            ("ICD10", CriteriaFamily::Codes),
            ("CPT", CriteriaFamily::Codes),
            ("DEMO", CriteriaFamily::Demographics),
            ("DEMO_GEN", CriteriaFamily::Demographics),
            ("DEMO_AGE", CriteriaFamily::Demographics),
            ("DEMO_RACE", CriteriaFamily::Demographics),
            ("DEMO_ETH", CriteriaFamily::Demographics),
            ("DEMO_DEC", CriteriaFamily::Demographics),
            ("DRUG", CriteriaFamily::Drug),
            ("MEAS", CriteriaFamily::Measurement),
            ("PM", CriteriaFamily::PhysicalMeasurement),
        ];
        assert_eq!(expected.len(), CriteriaFamily::TYPE_TAGS.len());
        for (tag, family) in expected {
            assert_eq!(CriteriaFamily::resolve(tag).unwrap(), family, "tag {}", tag);
        }
    }

    #[test]
    fn test_compile_rejects_invalid_config() {
        let config = CompilerConfig {
            project_id: "proj`.x".to_string(),
            ..Default::default()
        };
        let item = SearchGroupItem {
            item_type: "DRUG".to_string(),
            search_parameters: vec![SearchParameter {
                concept_id: Some(1127078),
                param_type: Some("DRUG".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut params = ParameterBindingTable::new();
        let err = CriteriaFamily::Drug
            .compile(&config, &mut params, &item, None)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidConfig { .. }));
        assert!(params.is_empty());

        let sql = CriteriaFamily::Drug
            .compile(&CompilerConfig::default(), &mut params, &item, None)
            .unwrap();
        assert!(sql.contains("`cohort-project.cdr.drug_exposure` de"));
    }

    #[test]
    fn test_resolve_unknown_tag() {
        let err = CriteriaFamily::resolve("SNOMED").unwrap_err();
        assert!(!err.is_user_error());
        assert!(matches!(
            err,
            CompileError::UnsupportedCriteriaType { ref criteria_type } if criteria_type == "SNOMED"
        ));
    }

    #[test]
    fn test_categorical_routing() {
        assert!(is_categorical(&attr(AttrName::Cat, Operator::In, &["1"])));
        assert!(is_categorical(&attr(AttrName::Both, Operator::In, &["1"])));
        assert!(!is_categorical(&attr(AttrName::Both, Operator::Equal, &["1"])));
        assert!(!is_categorical(&attr(AttrName::Num, Operator::In, &["1"])));
    }

    #[test]
    fn test_value_filter_or_group() {
        let mut params = ParameterBindingTable::new();
        let attrs = vec![
            attr(AttrName::Both, Operator::GreaterThan, &["7.5"]),
            attr(AttrName::Both, Operator::In, &["45878583", "45881666"]),
        ];
        let filter = value_filter(&mut params, "m", &attrs).unwrap().unwrap();
        assert_eq!(
            filter.to_string(),
            "(m.value_as_number > @p0 OR m.value_as_concept_id IN UNNEST(@p1))"
        );
        let bindings = params.freeze();
        assert_eq!(bindings["p0"], QueryParameterValue::Float64(7.5));
        assert_eq!(
            bindings["p1"],
            QueryParameterValue::Int64Array(vec![45878583, 45881666])
        );
    }

    #[test]
    fn test_value_filter_any_is_bare() {
        let mut params = ParameterBindingTable::new();
        let attrs = vec![Attribute {
            name: AttrName::Any,
            operator: None,
            operands: vec![],
            concept_id: None,
        }];
        assert!(value_filter(&mut params, "m", &attrs).unwrap().is_none());
        assert!(params.is_empty());
    }

    #[test]
    fn test_numeric_attribute_rejects_in() {
        let err = validate_value_attribute(&attr(AttrName::Num, Operator::In, &["1"])).unwrap_err();
        assert_eq!(err.rule, crate::error::ValidationRule::InvalidOperator);
    }

    #[test]
    fn test_categorical_attribute_requires_in() {
        let err = validate_value_attribute(&attr(AttrName::Cat, Operator::Equal, &["1"])).unwrap_err();
        assert_eq!(err.rule, crate::error::ValidationRule::InvalidOperator);
        let err = validate_value_attribute(&attr(AttrName::Cat, Operator::In, &["x"])).unwrap_err();
        assert_eq!(err.rule, crate::error::ValidationRule::NotNumeric);
    }
}

//! ICD9, ICD10 and CPT code criteria.
//!
//! Parameters are bucketed by group flag, vocabulary and domain. A group code
//! matches every code it prefixes (`250` matches `250.01`), one subquery per
//! code. Leaf codes of a bucket match exactly in a single subquery.

use crate::binding::{ParameterBindingTable, QueryParameterValue};
use crate::cdm::{CONCEPT, DomainTable};
use crate::config::CompilerConfig;
use crate::error::{Result, ValidationError};
use crate::modifiers;
use crate::sql::{Filter, ItemQuery, Operand, Query, Select, SetOp, Source};
use crate::types::{Operator, SearchGroupItem, SearchParameter, TemporalMention};
use crate::validation::fields;
use crate::validation::predicates::{
    code_blank, domain_blank, domain_invalid, parameters_empty, subtype_blank, subtype_not_in,
    type_blank, type_not_in,
};

use super::{CriteriaQueryBuilder, criteria_columns, finish};

const CODE_TYPES: &[&str] = &["ICD9", "ICD10", "CPT"];
const CODE_SUBTYPES: &[&str] = &["CM", "PROC", "ICD10CM", "ICD10PCS", "CPT4"];

const ICD9_VOCABULARIES: &[&str] = &["ICD9CM", "ICD9Proc"];
const ICD10CM_VOCABULARY: &[&str] = &["ICD10CM"];
const ICD10PCS_VOCABULARY: &[&str] = &["ICD10PCS"];
const CPT_VOCABULARY: &[&str] = &["CPT4"];

/// Builds code criteria queries.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CodesQueryBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BucketKey {
    group: bool,
    vocabularies: &'static [&'static str],
    domain: DomainTable,
}

impl CriteriaQueryBuilder for CodesQueryBuilder {
    fn build(
        &self,
        config: &CompilerConfig,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<ItemQuery> {
        let buckets = bucket(&item.search_parameters)?;
        modifiers::validate(&item.modifiers)?;

        let mut parts = Vec::new();
        for (key, codes) in buckets {
            if key.group {
                for code in codes {
                    let pattern = params.bind(QueryParameterValue::string(format!("{}%", code)));
                    let filter =
                        Filter::compare("c.concept_code", Operator::Like, Operand::Single(pattern));
                    parts.push(code_query(config, &key, filter));
                }
            } else {
                let codes = params.bind(QueryParameterValue::StringArray(codes));
                parts.push(code_query(config, &key, Filter::in_unnest("c.concept_code", codes)));
            }
        }

        let base = Query::compound(SetOp::UnionAll, parts);
        finish(config, params, base, item, mention)
    }
}

/// Validates parameters and groups their codes, preserving request order.
fn bucket(parameters: &[SearchParameter]) -> Result<Vec<(BucketKey, Vec<String>)>> {
    parameters_empty().reject(parameters, || ValidationError::empty(fields::PARAMETERS))?;

    let invalid_type = type_blank().or(type_not_in(CODE_TYPES));
    let invalid_subtype = subtype_blank().or(subtype_not_in(CODE_SUBTYPES));
    let invalid_domain = domain_blank().or(domain_invalid());
    let missing_code = code_blank();

    let mut buckets: Vec<(BucketKey, Vec<String>)> = Vec::new();
    for param in parameters {
        invalid_type.reject(param, || ValidationError::not_valid(fields::TYPE, param.type_str()))?;
        invalid_subtype.reject(param, || {
            ValidationError::not_valid(fields::SUBTYPE, param.subtype_str())
        })?;
        invalid_domain.reject(param, || {
            ValidationError::not_valid(fields::DOMAIN, param.domain.as_deref().unwrap_or(""))
        })?;
        missing_code.reject(param, || ValidationError::not_valid(fields::CODE, param.value_str()))?;

        let domain = param
            .domain
            .as_deref()
            .and_then(|d| d.parse::<DomainTable>().ok())
            .ok_or_else(|| ValidationError::not_valid(fields::DOMAIN, ""))?;
        let key = BucketKey {
            group: param.group,
            vocabularies: vocabularies(param)?,
            domain,
        };
        let code = param.value_str().trim().to_string();
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, codes)) => codes.push(code),
            None => buckets.push((key, vec![code])),
        }
    }
    Ok(buckets)
}

fn vocabularies(param: &SearchParameter) -> Result<&'static [&'static str]> {
    match (param.type_str(), param.subtype_str()) {
        ("ICD9", _) => Ok(ICD9_VOCABULARIES),
        ("CPT", _) => Ok(CPT_VOCABULARY),
        ("ICD10", "ICD10CM") => Ok(ICD10CM_VOCABULARY),
        ("ICD10", "ICD10PCS") => Ok(ICD10PCS_VOCABULARY),
        (_, subtype) => Err(ValidationError::not_valid(fields::SUBTYPE, subtype).into()),
    }
}

/// Events in the bucket's domain whose source concept matches `code_filter`.
fn code_query(config: &CompilerConfig, key: &BucketKey, code_filter: Filter) -> Query {
    let domain = key.domain;
    let concepts = Select::new(Source::table(config.table(CONCEPT), "c"))
        .column("c.concept_id")
        .filter(Filter::constants("c.vocabulary_id", key.vocabularies))
        .filter(code_filter)
        .into_query();

    Select::new(Source::table(config.table(domain.table_name()), "a"))
        .distinct()
        .columns(criteria_columns(
            "a",
            domain.entry_date_column(),
            domain.source_concept_id_column(),
        ))
        .filter(Filter::in_query(
            format!("a.{}", domain.source_concept_id_column()),
            concepts,
        ))
        .into_query()
}

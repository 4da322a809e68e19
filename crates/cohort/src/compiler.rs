//! Request-level compilation.
//!
//! [`CohortQueryBuilder`] turns a whole [`SearchRequest`] into one query over
//! the person table. Items of a group are unioned, include groups must all
//! match, and exclude groups remove matching people.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::binding::{ParameterBindingTable, QueryParameterValue};
use crate::builders::CriteriaFamily;
use crate::cdm::PERSON;
use crate::config::CompilerConfig;
use crate::error::{CompileError, Result, ValidationError};
use crate::sql::{Filter, ItemQuery, Query, Select, SetOp, Source};
use crate::temporal::{temporal_condition, temporal_group_query};
use crate::types::{SearchGroup, SearchGroupItem, SearchRequest, TemporalMention};
use crate::validation::fields;

/// A named placeholder, `@name`.
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("valid regex literal"));

/// What the compiled request selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// `COUNT(DISTINCT person_id)`
    #[default]
    Count,
    /// The matching `person_id`s.
    Participants,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Count => write!(f, "count"),
            QueryMode::Participants => write!(f, "participants"),
        }
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" => Ok(QueryMode::Count),
            "participants" => Ok(QueryMode::Participants),
            _ => Err(format!("unknown query mode: {}", s)),
        }
    }
}

/// SQL text and the parameters its placeholders refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: BTreeMap<String, QueryParameterValue>,
}

impl CompiledQuery {
    /// Parameter names referenced as `@name` in the text.
    pub fn referenced_parameters(&self) -> BTreeSet<String> {
        PLACEHOLDER
            .captures_iter(&self.sql)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Renders the query with literals in place of placeholders.
    ///
    /// For logging and tests. The result is never meant to be executed.
    pub fn to_literal_sql(&self) -> String {
        PLACEHOLDER
            .replace_all(&self.sql, |caps: &Captures| match self.parameters.get(&caps[1]) {
                Some(value) => value.to_sql_literal(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Compiles search requests against one dataset.
///
/// The builder holds only configuration and can be shared across threads.
/// Each call uses its own binding table.
#[derive(Debug, Clone)]
pub struct CohortQueryBuilder {
    config: CompilerConfig,
}

impl CohortQueryBuilder {
    /// Creates a builder after validating `config`.
    pub fn new(config: CompilerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| CompileError::InvalidConfig {
                message: errors.join("; "),
            })?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Counts the people matching the request.
    pub fn count_query(&self, request: &SearchRequest) -> Result<CompiledQuery> {
        self.compile(request, QueryMode::Count)
    }

    /// Lists the people matching the request.
    pub fn participant_query(&self, request: &SearchRequest) -> Result<CompiledQuery> {
        self.compile(request, QueryMode::Participants)
    }

    /// Compiles a request in the given mode.
    pub fn compile(&self, request: &SearchRequest, mode: QueryMode) -> Result<CompiledQuery> {
        let mut params = ParameterBindingTable::new();
        let filters = match self.request_filters(&mut params, request) {
            Ok(filters) => filters,
            Err(e) => {
                warn!(
                    error = %e,
                    user_error = e.is_user_error(),
                    "rejected search request"
                );
                return Err(e);
            }
        };

        let person = Select::new(Source::table(self.config.table(PERSON), "person"));
        let select = match mode {
            QueryMode::Count => person.column("COUNT(DISTINCT person_id) AS count"),
            QueryMode::Participants => person.column("person.person_id"),
        };
        let sql = select.filters(filters).into_query().to_string();

        debug!(
            mode = %mode,
            includes = request.includes.len(),
            excludes = request.excludes.len(),
            bindings = params.len(),
            "compiled search request"
        );
        Ok(CompiledQuery {
            sql,
            parameters: params.freeze(),
        })
    }

    /// Compiles a single item to its criteria query.
    pub fn compile_item(
        &self,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<CompiledQuery> {
        let mut params = ParameterBindingTable::new();
        let built = self.item_query(&mut params, item, mention)?;
        Ok(CompiledQuery {
            sql: built.query.to_string(),
            parameters: params.freeze(),
        })
    }

    fn request_filters(
        &self,
        params: &mut ParameterBindingTable,
        request: &SearchRequest,
    ) -> Result<Vec<Filter>> {
        if request.includes.is_empty() {
            return Err(ValidationError::empty(fields::INCLUDE_GROUPS).into());
        }

        let mut filters = Vec::with_capacity(request.includes.len() + request.excludes.len());
        for group in &request.includes {
            let people = self.group_query(params, group)?;
            filters.push(Filter::in_query("person.person_id", people));
        }
        for group in &request.excludes {
            let people = self.group_query(params, group)?;
            let matched = Select::new(Source::subquery(people, "x"))
                .column("'x'")
                .filter(Filter::raw("x.person_id = person.person_id"))
                .into_query();
            filters.push(Filter::NotExists(Box::new(matched)));
        }
        Ok(filters)
    }

    /// People matching any item of the group.
    fn group_query(&self, params: &mut ParameterBindingTable, group: &SearchGroup) -> Result<Query> {
        if group.items.is_empty() {
            return Err(ValidationError::empty(fields::ITEMS).into());
        }
        if group.temporal {
            return self.temporal_group(params, group);
        }

        let mut parts = Vec::with_capacity(group.items.len());
        for item in &group.items {
            let built = self.item_query(params, item, item.temporal_mention)?;
            parts.push(built.into_person_ids());
        }
        debug!(
            group = group.id.as_deref().unwrap_or(""),
            items = group.items.len(),
            bindings = params.len(),
            "compiled search group"
        );
        Ok(Query::compound(SetOp::UnionDistinct, parts))
    }

    fn temporal_group(&self, params: &mut ParameterBindingTable, group: &SearchGroup) -> Result<Query> {
        let time = group.time.ok_or_else(|| {
            ValidationError::temporal_group("Bad Request: Search Group Time is required.")
        })?;

        let mut first = Vec::new();
        let mut second = Vec::new();
        for item in &group.items {
            match item.temporal_group {
                Some(0) => first.push(item),
                Some(1) => second.push(item),
                Some(other) => {
                    return Err(ValidationError::temporal_group(format!(
                        "Bad Request: Temporal Group {} is not valid.",
                        other
                    ))
                    .into());
                }
                None => {
                    return Err(ValidationError::temporal_group(
                        "Bad Request: Search Group Items must provide a temporal group.",
                    )
                    .into());
                }
            }
        }
        if first.is_empty() || second.is_empty() {
            return Err(ValidationError::temporal_group(
                "Bad Request: Search Group Items must provide 2 different temporal groups.",
            )
            .into());
        }
        if time.requires_time_value() && group.time_value.is_none() {
            return Err(ValidationError::empty(fields::TIME_VALUE).into());
        }

        let mention = group.mention.unwrap_or(TemporalMention::AnyMention);
        let mut first_queries = Vec::with_capacity(first.len());
        for item in first {
            first_queries.push(self.item_query(params, item, Some(mention))?.query);
        }
        let mut second_queries = Vec::with_capacity(second.len());
        for item in second {
            second_queries.push(
                self.item_query(params, item, Some(TemporalMention::AnyMention))?
                    .query,
            );
        }
        let condition = temporal_condition(params, time, group.time_value)?;

        debug!(
            group = group.id.as_deref().unwrap_or(""),
            time = %time,
            first = first_queries.len(),
            second = second_queries.len(),
            "compiled temporal group"
        );
        Ok(temporal_group_query(first_queries, second_queries, condition))
    }

    fn item_query(
        &self,
        params: &mut ParameterBindingTable,
        item: &SearchGroupItem,
        mention: Option<TemporalMention>,
    ) -> Result<ItemQuery> {
        let family = CriteriaFamily::resolve(&item.item_type)?;
        family.build(&self.config, params, item, mention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SearchParameter, TemporalTime};

    fn gender_item() -> SearchGroupItem {
        SearchGroupItem {
            item_type: "DEMO".to_string(),
            search_parameters: vec![SearchParameter {
                concept_id: Some(8507),
                param_type: Some("DEMO".to_string()),
                subtype: Some("GEN".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn drug_item(concept_id: i64, temporal_group: Option<i32>) -> SearchGroupItem {
        SearchGroupItem {
            item_type: "DRUG".to_string(),
            search_parameters: vec![SearchParameter {
                concept_id: Some(concept_id),
                param_type: Some("DRUG".to_string()),
                subtype: Some("ATC".to_string()),
                ..Default::default()
            }],
            temporal_group,
            ..Default::default()
        }
    }

    fn group(items: Vec<SearchGroupItem>) -> SearchGroup {
        SearchGroup {
            items,
            ..Default::default()
        }
    }

    fn builder() -> CohortQueryBuilder {
        CohortQueryBuilder::new(CompilerConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = CohortQueryBuilder::new(CompilerConfig::new("bad project", "cdr")).unwrap_err();
        assert!(matches!(err, CompileError::InvalidConfig { .. }));
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_count_query_shape() {
        let request = SearchRequest {
            includes: vec![group(vec![gender_item()])],
            excludes: vec![],
        };
        let compiled = builder().count_query(&request).unwrap();
        assert!(compiled.sql.starts_with(
            "SELECT COUNT(DISTINCT person_id) AS count\nFROM `cohort-project.cdr.person` person\nWHERE person.person_id IN (\n"
        ));
        assert_eq!(compiled.parameters["p0"], QueryParameterValue::Int64(8507));
    }

    #[test]
    fn test_participants_and_excludes() {
        let request = SearchRequest {
            includes: vec![group(vec![gender_item()])],
            excludes: vec![group(vec![drug_item(1127078, None)])],
        };
        let compiled = builder().participant_query(&request).unwrap();
        assert!(compiled.sql.starts_with("SELECT person.person_id\nFROM"));
        assert!(compiled.sql.contains("AND NOT EXISTS (\nSELECT 'x'\nFROM (\n"));
        assert!(compiled.sql.ends_with(") x\nWHERE x.person_id = person.person_id\n)"));
    }

    #[test]
    fn test_group_items_union_distinct() {
        let request = SearchRequest {
            includes: vec![group(vec![gender_item(), drug_item(1127078, None)])],
            excludes: vec![],
        };
        let compiled = builder().count_query(&request).unwrap();
        assert!(compiled.sql.contains("\nUNION DISTINCT\nSELECT criteria.person_id\nFROM (\n"));
    }

    #[test]
    fn test_empty_request_and_group() {
        let err = builder().count_query(&SearchRequest::default()).unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, fields::INCLUDE_GROUPS);

        let request = SearchRequest {
            includes: vec![group(vec![])],
            excludes: vec![],
        };
        let err = builder().count_query(&request).unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, fields::ITEMS);
    }

    #[test]
    fn test_temporal_group() {
        let mut temporal = group(vec![drug_item(1127078, Some(0)), drug_item(1127433, Some(1))]);
        temporal.temporal = true;
        temporal.mention = Some(TemporalMention::FirstMention);
        temporal.time = Some(TemporalTime::XDaysAfter);
        temporal.time_value = Some(30);
        let request = SearchRequest {
            includes: vec![temporal],
            excludes: vec![],
        };

        let compiled = builder().count_query(&request).unwrap();
        assert!(compiled.sql.contains("SELECT temp1.person_id\nFROM ("));
        assert!(compiled.sql.contains("WHERE rn = 1\n) temp1"));
        assert!(compiled.sql.contains(
            "temp1.entry_date >= DATE_ADD(temp2.entry_date, INTERVAL @p2 DAY)"
        ));
        assert_eq!(compiled.parameters["p2"], QueryParameterValue::Int64(30));
    }

    #[test]
    fn test_temporal_group_needs_both_sets() {
        let mut temporal = group(vec![drug_item(1127078, Some(0))]);
        temporal.temporal = true;
        temporal.time = Some(TemporalTime::DuringSameEncounterAs);
        let request = SearchRequest {
            includes: vec![temporal],
            excludes: vec![],
        };
        let err = builder().count_query(&request).unwrap_err();
        assert_eq!(err.as_validation().unwrap().field, "Temporal Group");
    }

    #[test]
    fn test_literal_sql() {
        let compiled = CompiledQuery {
            sql: "SELECT 1 WHERE a = @p0 AND b IN UNNEST(@p10)".to_string(),
            parameters: BTreeMap::from([
                ("p0".to_string(), QueryParameterValue::string("x")),
                ("p10".to_string(), QueryParameterValue::Int64Array(vec![1, 2])),
            ]),
        };
        assert_eq!(
            compiled.to_literal_sql(),
            "SELECT 1 WHERE a = 'x' AND b IN UNNEST([1, 2])"
        );
        assert_eq!(
            compiled.referenced_parameters(),
            BTreeSet::from(["p0".to_string(), "p10".to_string()])
        );

        let unbound = CompiledQuery {
            sql: "SELECT 1 WHERE a = @missing".to_string(),
            parameters: BTreeMap::new(),
        };
        assert_eq!(unbound.to_literal_sql(), unbound.sql);
    }

    #[test]
    fn test_query_mode_parse() {
        assert_eq!("Count".parse::<QueryMode>().unwrap(), QueryMode::Count);
        assert_eq!("participants".parse::<QueryMode>().unwrap(), QueryMode::Participants);
        assert!("rows".parse::<QueryMode>().is_err());
    }
}

//! Typed SQL fragments.
//!
//! Builders assemble queries from these clause types and render them once at
//! the end of a compile call. Only three kinds of text reach the output:
//! static column and table names, operator keywords from [`Operator::sql`],
//! and `@name` placeholders from [`ParamRef`]. User values never do.

use std::fmt;

use crate::binding::{ParamRef, ParameterBindingTable, QueryParameterValue};
use crate::config::TableRef;
use crate::types::Operator;

/// The right hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    /// `<op> @p`
    Single(ParamRef),
    /// `BETWEEN @a AND @b`
    Pair(ParamRef, ParamRef),
    /// `IN UNNEST(@p)`
    Unnest(ParamRef),
}

impl Operand {
    /// Binds operand values for `operator`. Returns `None` when the number of
    /// values does not fit the operator.
    pub(crate) fn bind(
        params: &mut ParameterBindingTable,
        prefix: &str,
        operator: Operator,
        values: Vec<QueryParameterValue>,
    ) -> Option<Operand> {
        let mut refs = values
            .into_iter()
            .map(|value| params.bind_prefixed(prefix, value));
        match (operator, refs.next(), refs.next()) {
            (Operator::Between, Some(low), Some(high)) => Some(Operand::Pair(low, high)),
            (Operator::Between, _, _) => None,
            (Operator::In, Some(values), None) => Some(Operand::Unnest(values)),
            (_, Some(value), None) => Some(Operand::Single(value)),
            _ => None,
        }
    }
}

/// A boolean condition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Filter {
    Compare {
        expr: String,
        op: Operator,
        operand: Operand,
    },
    /// Membership in a fixed list of vocabulary constants.
    Constants {
        expr: String,
        values: &'static [&'static str],
    },
    InQuery {
        expr: String,
        query: Box<Query>,
    },
    Exists(Box<Query>),
    NotExists(Box<Query>),
    /// Disjunction, rendered in parentheses.
    Any(Vec<Filter>),
    /// Fixed text built from column names and placeholders only.
    Raw(String),
}

impl Filter {
    pub(crate) fn compare(expr: impl Into<String>, op: Operator, operand: Operand) -> Self {
        Filter::Compare {
            expr: expr.into(),
            op,
            operand,
        }
    }

    pub(crate) fn eq(expr: impl Into<String>, param: ParamRef) -> Self {
        Self::compare(expr, Operator::Equal, Operand::Single(param))
    }

    pub(crate) fn in_unnest(expr: impl Into<String>, param: ParamRef) -> Self {
        Self::compare(expr, Operator::In, Operand::Unnest(param))
    }

    pub(crate) fn in_query(expr: impl Into<String>, query: Query) -> Self {
        Filter::InQuery {
            expr: expr.into(),
            query: Box::new(query),
        }
    }

    pub(crate) fn constants(expr: impl Into<String>, values: &'static [&'static str]) -> Self {
        Filter::Constants {
            expr: expr.into(),
            values,
        }
    }

    pub(crate) fn raw(text: impl Into<String>) -> Self {
        Filter::Raw(text.into())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare { expr, op, operand } => match operand {
                Operand::Single(p) => write!(f, "{} {} {}", expr, op.sql(), p),
                Operand::Pair(a, b) => write!(f, "{} {} {} AND {}", expr, op.sql(), a, b),
                Operand::Unnest(p) => write!(f, "{} {} UNNEST({})", expr, op.sql(), p),
            },
            Filter::Constants { expr, values } => {
                if let [single] = *values {
                    write!(f, "{} = '{}'", expr, single)
                } else {
                    let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
                    write!(f, "{} IN ({})", expr, quoted.join(","))
                }
            }
            Filter::InQuery { expr, query } => write!(f, "{} IN (\n{}\n)", expr, query),
            Filter::Exists(query) => write!(f, "EXISTS (\n{}\n)", query),
            Filter::NotExists(query) => write!(f, "NOT EXISTS (\n{}\n)", query),
            Filter::Any(filters) => {
                if let [single] = filters.as_slice() {
                    return write!(f, "{}", single);
                }
                let parts: Vec<String> = filters.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(" OR "))
            }
            Filter::Raw(text) => f.write_str(text),
        }
    }
}

/// A select list entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Column {
    Expr(String),
    /// `RANK() OVER (PARTITION BY .. ORDER BY ..[ DESC]) alias`
    Rank {
        partition_by: &'static str,
        order_by: &'static str,
        descending: bool,
        alias: &'static str,
    },
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Expr(expr) => f.write_str(expr),
            Column::Rank {
                partition_by,
                order_by,
                descending,
                alias,
            } => write!(
                f,
                "RANK() OVER (PARTITION BY {} ORDER BY {}{}) {}",
                partition_by,
                order_by,
                if *descending { " DESC" } else { "" },
                alias
            ),
        }
    }
}

/// A FROM or JOIN source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Source {
    Table {
        table: TableRef,
        alias: Option<&'static str>,
    },
    Subquery {
        query: Box<Query>,
        alias: Option<&'static str>,
    },
}

impl Source {
    pub(crate) fn table(table: TableRef, alias: &'static str) -> Self {
        Source::Table {
            table,
            alias: Some(alias),
        }
    }

    pub(crate) fn subquery(query: Query, alias: &'static str) -> Self {
        Source::Subquery {
            query: Box::new(query),
            alias: Some(alias),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alias = match self {
            Source::Table { table, alias } => {
                write!(f, "{}", table)?;
                alias
            }
            Source::Subquery { query, alias } => {
                write!(f, "(\n{}\n)", query)?;
                alias
            }
        };
        match alias {
            Some(alias) => write!(f, " {}", alias),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Join {
    source: Source,
    on: Filter,
}

/// A single SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Select {
    distinct: bool,
    columns: Vec<Column>,
    from: Source,
    joins: Vec<Join>,
    filters: Vec<Filter>,
    group_by: Vec<String>,
    having: Option<Filter>,
}

impl Select {
    pub(crate) fn new(source: Source) -> Self {
        Self {
            distinct: false,
            columns: Vec::new(),
            from: source,
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            having: None,
        }
    }

    pub(crate) fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub(crate) fn column(mut self, expr: impl Into<String>) -> Self {
        self.columns.push(Column::Expr(expr.into()));
        self
    }

    pub(crate) fn columns<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(exprs.into_iter().map(|e| Column::Expr(e.into())));
        self
    }

    pub(crate) fn rank(
        mut self,
        partition_by: &'static str,
        order_by: &'static str,
        descending: bool,
        alias: &'static str,
    ) -> Self {
        self.columns.push(Column::Rank {
            partition_by,
            order_by,
            descending,
            alias,
        });
        self
    }

    pub(crate) fn join(mut self, source: Source, on: Filter) -> Self {
        self.joins.push(Join { source, on });
        self
    }

    pub(crate) fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub(crate) fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub(crate) fn group_by<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(exprs.into_iter().map(Into::into));
        self
    }

    pub(crate) fn having(mut self, filter: Filter) -> Self {
        self.having = Some(filter);
        self
    }

    pub(crate) fn into_query(self) -> Query {
        Query::Select(Box::new(self))
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        write!(
            f,
            "SELECT {}{}\nFROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            columns.join(", "),
            self.from
        )?;
        for join in &self.joins {
            write!(f, "\nJOIN {} ON ({})", join.source, join.on)?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            let keyword = if i == 0 { "WHERE" } else { "AND" };
            write!(f, "\n{} {}", keyword, filter)?;
        }
        if !self.group_by.is_empty() {
            write!(f, "\nGROUP BY {}", self.group_by.join(", "))?;
        }
        if let Some(having) = &self.having {
            write!(f, "\nHAVING {}", having)?;
        }
        Ok(())
    }
}

/// Set operators between queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetOp {
    UnionAll,
    UnionDistinct,
    IntersectDistinct,
}

impl SetOp {
    fn keyword(&self) -> &'static str {
        match self {
            SetOp::UnionAll => "UNION ALL",
            SetOp::UnionDistinct => "UNION DISTINCT",
            SetOp::IntersectDistinct => "INTERSECT DISTINCT",
        }
    }
}

/// A query: one SELECT or a set operation over several.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Query {
    Select(Box<Select>),
    Compound { op: SetOp, parts: Vec<Query> },
}

impl Query {
    /// Combines queries with a set operator. A single part is returned as is.
    pub(crate) fn compound(op: SetOp, mut parts: Vec<Query>) -> Query {
        if parts.len() == 1 {
            if let Some(only) = parts.pop() {
                return only;
            }
        }
        Query::Compound { op, parts }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Select(select) => write!(f, "{}", select),
            Query::Compound { op, parts } => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\n{}\n", op.keyword())?;
                    }
                    match part {
                        Query::Compound { op: inner, .. } if inner != op => {
                            write!(f, "(\n{}\n)", part)?
                        }
                        _ => write!(f, "{}", part)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Columns an item query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    /// `person_id`
    Persons,
    /// `person_id, entry_date, concept_id, visit_occurrence_id`
    Criteria,
    /// `person_id, visit_occurrence_id, entry_date`
    Events,
}

/// The compiled query of one search group item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ItemQuery {
    pub(crate) query: Query,
    pub(crate) shape: Shape,
}

impl ItemQuery {
    pub(crate) fn new(query: Query, shape: Shape) -> Self {
        Self { query, shape }
    }

    /// Projects the query down to `person_id`.
    pub(crate) fn into_person_ids(self) -> Query {
        match self.shape {
            Shape::Persons => self.query,
            Shape::Criteria | Shape::Events => Select::new(Source::subquery(self.query, "criteria"))
                .column("criteria.person_id")
                .into_query(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;

    #[test]
    fn test_render_select() {
        let config = CompilerConfig::new("proj", "cdr");
        let mut params = ParameterBindingTable::new();
        let concept = params.bind(QueryParameterValue::Int64(3015813));
        let low = params.bind(QueryParameterValue::Float64(1.0));
        let high = params.bind(QueryParameterValue::Float64(2.0));

        let sql = Select::new(Source::table(config.table("measurement"), "m"))
            .distinct()
            .columns(["m.person_id", "m.measurement_date AS entry_date"])
            .filter(Filter::eq("m.measurement_concept_id", concept))
            .filter(Filter::compare(
                "m.value_as_number",
                Operator::Between,
                Operand::Pair(low, high),
            ))
            .into_query()
            .to_string();

        assert_eq!(
            sql,
            "SELECT DISTINCT m.person_id, m.measurement_date AS entry_date\n\
             FROM `proj.cdr.measurement` m\n\
             WHERE m.measurement_concept_id = @p0\n\
             AND m.value_as_number BETWEEN @p1 AND @p2"
        );
    }

    #[test]
    fn test_render_constants() {
        let many = Filter::constants("c.vocabulary_id", &["ICD9CM", "ICD9Proc"]);
        assert_eq!(many.to_string(), "c.vocabulary_id IN ('ICD9CM','ICD9Proc')");
        let one = Filter::constants("c.vocabulary_id", &["ICD10CM"]);
        assert_eq!(one.to_string(), "c.vocabulary_id = 'ICD10CM'");
    }

    #[test]
    fn test_render_rank_and_group_by() {
        let config = CompilerConfig::default();
        let inner = Select::new(Source::table(config.table("drug_exposure"), "de"))
            .column("de.person_id")
            .into_query();
        let sql = Select::new(Source::subquery(inner, "criteria"))
            .column("person_id")
            .rank("person_id", "entry_date", true, "rn")
            .group_by(["person_id"])
            .having(Filter::raw("COUNT(person_id) > 1"))
            .into_query()
            .to_string();

        assert!(sql.contains("RANK() OVER (PARTITION BY person_id ORDER BY entry_date DESC) rn"));
        assert!(sql.contains("FROM (\nSELECT de.person_id\nFROM `cohort-project.cdr.drug_exposure` de\n) criteria"));
        assert!(sql.ends_with("GROUP BY person_id\nHAVING COUNT(person_id) > 1"));
    }

    #[test]
    fn test_compound_single_part_is_unwrapped() {
        let config = CompilerConfig::default();
        let q = Select::new(Source::table(config.table("person"), "p"))
            .column("p.person_id")
            .into_query();
        let single = Query::compound(SetOp::UnionAll, vec![q.clone()]);
        assert_eq!(single, q);

        let both = Query::compound(SetOp::UnionDistinct, vec![q.clone(), q]);
        assert_eq!(both.to_string().matches("UNION DISTINCT").count(), 1);
    }

    #[test]
    fn test_nested_compound_is_parenthesized() {
        let config = CompilerConfig::default();
        let q = Select::new(Source::table(config.table("person"), "p"))
            .column("p.person_id")
            .into_query();
        let inner = Query::compound(SetOp::IntersectDistinct, vec![q.clone(), q.clone()]);
        let outer = Query::compound(SetOp::UnionAll, vec![inner, q]);
        let sql = outer.to_string();
        assert!(sql.starts_with("(\nSELECT p.person_id"));
        assert!(sql.contains("INTERSECT DISTINCT"));
        assert!(sql.contains(")\nUNION ALL\nSELECT"));
    }

    #[test]
    fn test_operand_bind() {
        let mut params = ParameterBindingTable::new();
        let pair = Operand::bind(
            &mut params,
            "age",
            Operator::Between,
            vec![QueryParameterValue::Int64(18), QueryParameterValue::Int64(65)],
        );
        assert!(matches!(pair, Some(Operand::Pair(_, _))));

        let missing = Operand::bind(
            &mut params,
            "age",
            Operator::Between,
            vec![QueryParameterValue::Int64(18)],
        );
        assert!(missing.is_none());

        let single = Operand::bind(
            &mut params,
            "occ",
            Operator::GreaterThanOrEqualTo,
            vec![QueryParameterValue::Int64(2)],
        );
        let filter = Filter::compare("COUNT(criteria.person_id)", Operator::GreaterThanOrEqualTo, single.unwrap());
        assert_eq!(filter.to_string(), "COUNT(criteria.person_id) >= @occ3");
    }

    #[test]
    fn test_item_query_projection() {
        let config = CompilerConfig::default();
        let q = Select::new(Source::table(config.table("observation"), "o"))
            .column("o.person_id")
            .into_query();
        let persons = ItemQuery::new(q.clone(), Shape::Persons).into_person_ids();
        assert_eq!(persons, q);
        let projected = ItemQuery::new(q, Shape::Criteria).into_person_ids().to_string();
        assert!(projected.starts_with("SELECT criteria.person_id\nFROM (\nSELECT o.person_id"));
    }

    #[test]
    fn test_any_filter() {
        let f = Filter::Any(vec![Filter::raw("a = 1"), Filter::raw("b = 2")]);
        assert_eq!(f.to_string(), "(a = 1 OR b = 2)");
        let single = Filter::Any(vec![Filter::raw("a = 1")]);
        assert_eq!(single.to_string(), "a = 1");
    }
}

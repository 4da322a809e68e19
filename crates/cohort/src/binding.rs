//! Named query parameters.
//!
//! Every user supplied operand reaches the SQL text through a
//! [`ParameterBindingTable`]. Binding a value returns a [`ParamRef`], the only
//! way to obtain a placeholder, so a placeholder in the rendered text always
//! has a binding. One table lives for exactly one compile call.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A typed literal bound to a named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum QueryParameterValue {
    #[serde(rename = "INT64")]
    Int64(i64),
    #[serde(rename = "FLOAT64")]
    Float64(f64),
    #[serde(rename = "STRING")]
    String(String),
    #[serde(rename = "DATE")]
    Date(NaiveDate),
    #[serde(rename = "ARRAY<INT64>")]
    Int64Array(Vec<i64>),
    #[serde(rename = "ARRAY<STRING>")]
    StringArray(Vec<String>),
}

impl QueryParameterValue {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        QueryParameterValue::String(s.into())
    }

    /// Renders the value as a BigQuery literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            QueryParameterValue::Int64(v) => v.to_string(),
            QueryParameterValue::Float64(v) => format!("{:?}", v),
            QueryParameterValue::String(s) => quote(s),
            QueryParameterValue::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            QueryParameterValue::Int64Array(values) => format!(
                "[{}]",
                values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            QueryParameterValue::StringArray(values) => format!(
                "[{}]",
                values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// A placeholder for a bound parameter. Displays as `@name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef(String);

impl ParamRef {
    /// The parameter name without the `@` sigil.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Append-only map from generated parameter name to value.
///
/// Names take the form `<prefix><n>` where `n` is a counter scoped to this
/// table, so names are unique within one compilation regardless of prefix.
#[derive(Debug, Default)]
pub struct ParameterBindingTable {
    bindings: Vec<(String, QueryParameterValue)>,
}

impl ParameterBindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value under a `p<n>` name.
    pub fn bind(&mut self, value: QueryParameterValue) -> ParamRef {
        self.bind_prefixed("p", value)
    }

    /// Binds a value under a `<prefix><n>` name.
    pub fn bind_prefixed(&mut self, prefix: &str, value: QueryParameterValue) -> ParamRef {
        let name = format!("{}{}", prefix, self.bindings.len());
        self.bindings.push((name.clone(), value));
        ParamRef(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Looks up a bound value by name.
    pub fn get(&self, name: &str) -> Option<&QueryParameterValue> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Consumes the table, returning the final name to value map.
    pub fn freeze(self) -> BTreeMap<String, QueryParameterValue> {
        self.bindings.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_generates_unique_names() {
        let mut table = ParameterBindingTable::new();
        let a = table.bind(QueryParameterValue::Int64(1));
        let b = table.bind_prefixed("age", QueryParameterValue::Int64(2));
        let c = table.bind(QueryParameterValue::Int64(3));

        assert_eq!(a.to_string(), "@p0");
        assert_eq!(b.to_string(), "@age1");
        assert_eq!(c.name(), "p2");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("age1"), Some(&QueryParameterValue::Int64(2)));
    }

    #[test]
    fn test_freeze() {
        let mut table = ParameterBindingTable::new();
        table.bind(QueryParameterValue::string("250%"));
        table.bind(QueryParameterValue::Int64Array(vec![1, 2]));
        let frozen = table.freeze();

        assert_eq!(frozen.len(), 2);
        assert_eq!(frozen["p0"], QueryParameterValue::string("250%"));
        assert_eq!(frozen["p1"], QueryParameterValue::Int64Array(vec![1, 2]));
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(QueryParameterValue::Int64(42).to_sql_literal(), "42");
        assert_eq!(QueryParameterValue::Float64(7.5).to_sql_literal(), "7.5");
        assert_eq!(QueryParameterValue::Float64(120.0).to_sql_literal(), "120.0");
        assert_eq!(
            QueryParameterValue::string("O'Brien").to_sql_literal(),
            "'O\\'Brien'"
        );
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(
            QueryParameterValue::Date(date).to_sql_literal(),
            "DATE '2020-01-31'"
        );
        assert_eq!(
            QueryParameterValue::StringArray(vec!["a".into(), "b".into()]).to_sql_literal(),
            "['a', 'b']"
        );
    }

    #[test]
    fn test_serialize_typed_value() {
        let json = serde_json::to_value(QueryParameterValue::Int64Array(vec![12345, 12346])).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "ARRAY<INT64>", "value": [12345, 12346] }));

        let date = NaiveDate::from_ymd_opt(2019, 6, 1).unwrap();
        let json = serde_json::to_value(QueryParameterValue::Date(date)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "DATE", "value": "2019-06-01" }));
    }
}

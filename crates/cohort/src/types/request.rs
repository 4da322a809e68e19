//! Cohort search request model.
//!
//! A [`SearchRequest`] is a tree of include and exclude [`SearchGroup`]s, each
//! holding [`SearchGroupItem`]s of one criteria type. The types mirror the JSON
//! shape produced by the cohort builder UI.

use serde::{Deserialize, Serialize};

use super::operator::{AttrName, ModifierType, Operator, TemporalMention, TemporalTime};

/// A complete cohort definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Groups a participant must satisfy.
    #[serde(default)]
    pub includes: Vec<SearchGroup>,

    /// Groups a participant must not satisfy.
    #[serde(default)]
    pub excludes: Vec<SearchGroup>,
}

/// An ordered list of items; a participant satisfies the group when any
/// item qualifies, or when the temporal relation holds for temporal groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchGroup {
    /// Optional client-side identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub items: Vec<SearchGroupItem>,

    /// Whether this group relates two item sets in time.
    #[serde(default)]
    pub temporal: bool,

    /// Mention applied to the first item set of a temporal group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<TemporalMention>,

    /// Relation between the two item sets of a temporal group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TemporalTime>,

    /// Day count for the day-based temporal relations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_value: Option<i64>,
}

/// One criteria filter within a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchGroupItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Criteria type tag (`ICD9`, `DRUG`, `MEAS`, `PM`, `DEMO`, ...).
    #[serde(rename = "type")]
    pub item_type: String,

    #[serde(default)]
    pub search_parameters: Vec<SearchParameter>,

    #[serde(default)]
    pub modifiers: Vec<Modifier>,

    /// Which qualifying events count; `None` for no temporal wrapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_mention: Option<TemporalMention>,

    /// Item set (0 or 1) within a temporal group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_group: Option<i32>,
}

/// A single searchable concept, code or value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<i64>,

    /// Code (`250.01`) or demographic value (`"45"`, `"Deceased"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// True for hierarchical nodes whose descendants all match.
    #[serde(default)]
    pub group: bool,

    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

/// A value filter attached to a measurement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: AttrName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,

    #[serde(default)]
    pub operands: Vec<String>,

    /// Component concept, used by blood pressure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<i64>,
}

/// A cross-cutting filter applied to the events of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
    pub name: ModifierType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,

    #[serde(default)]
    pub operands: Vec<String>,
}

/// Shared access to an operator and its operands.
pub trait Operands {
    fn operator(&self) -> Option<Operator>;
    fn operands(&self) -> &[String];
}

impl Operands for Attribute {
    fn operator(&self) -> Option<Operator> {
        self.operator
    }

    fn operands(&self) -> &[String] {
        &self.operands
    }
}

impl Operands for Modifier {
    fn operator(&self) -> Option<Operator> {
        self.operator
    }

    fn operands(&self) -> &[String] {
        &self.operands
    }
}

impl SearchParameter {
    /// The parameter type, or an empty string when absent.
    pub fn type_str(&self) -> &str {
        self.param_type.as_deref().unwrap_or("")
    }

    pub fn subtype_str(&self) -> &str {
        self.subtype.as_deref().unwrap_or("")
    }

    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

//! Operator and modifier vocabulary.
//!
//! Closed enums for comparison operators, modifier kinds, temporal mentions
//! and temporal relations, together with their SQL renderings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Comparison operators accepted on attributes and modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessThanOrEqualTo,
    /// `>=`
    GreaterThanOrEqualTo,
    /// `LIKE`
    Like,
    /// `IN`
    In,
    /// `BETWEEN x AND y`
    Between,
}

impl Operator {
    /// Returns the SQL keyword or symbol for this operator.
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessThanOrEqualTo => "<=",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::Between => "BETWEEN",
        }
    }

    /// Returns true for the single-operand ordering and equality operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Equal
                | Operator::NotEqual
                | Operator::LessThan
                | Operator::GreaterThan
                | Operator::LessThanOrEqualTo
                | Operator::GreaterThanOrEqualTo
        )
    }

    /// Number of operands this operator takes when it takes a fixed count.
    pub fn expected_operands(&self) -> usize {
        match self {
            Operator::Between => 2,
            _ => 1,
        }
    }

    /// The wire name of this operator (`GREATER_THAN_OR_EQUAL_TO`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Equal => "EQUAL",
            Operator::NotEqual => "NOT_EQUAL",
            Operator::LessThan => "LESS_THAN",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThanOrEqualTo => "LESS_THAN_OR_EQUAL_TO",
            Operator::GreaterThanOrEqualTo => "GREATER_THAN_OR_EQUAL_TO",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::Between => "BETWEEN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "EQUAL" => Ok(Operator::Equal),
            "NOT_EQUAL" => Ok(Operator::NotEqual),
            "LESS_THAN" => Ok(Operator::LessThan),
            "GREATER_THAN" => Ok(Operator::GreaterThan),
            "LESS_THAN_OR_EQUAL_TO" => Ok(Operator::LessThanOrEqualTo),
            "GREATER_THAN_OR_EQUAL_TO" => Ok(Operator::GreaterThanOrEqualTo),
            "LIKE" => Ok(Operator::Like),
            "IN" => Ok(Operator::In),
            "BETWEEN" => Ok(Operator::Between),
            _ => Err(format!("unknown operator: {}", s)),
        }
    }
}

/// Cross-cutting modifier kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModifierType {
    /// Age of the participant at the time of the event.
    AgeAtEvent,
    /// Date of the event.
    EventDate,
    /// Visit type the event occurred in.
    Encounters,
    /// Number of qualifying occurrences.
    NumOfOccurrences,
}

impl ModifierType {
    /// All modifier kinds, in application order (occurrences last).
    pub const ALL: [ModifierType; 4] = [
        ModifierType::AgeAtEvent,
        ModifierType::EventDate,
        ModifierType::Encounters,
        ModifierType::NumOfOccurrences,
    ];

    /// Human readable text used in validation messages.
    pub fn description(&self) -> &'static str {
        match self {
            ModifierType::AgeAtEvent => "age at event",
            ModifierType::EventDate => "event date",
            ModifierType::Encounters => "visit type",
            ModifierType::NumOfOccurrences => "number of occurrences",
        }
    }

    /// Prefix for parameter names bound on behalf of this modifier.
    pub(crate) fn parameter_prefix(&self) -> &'static str {
        match self {
            ModifierType::AgeAtEvent => "age",
            ModifierType::EventDate => "event",
            ModifierType::Encounters => "enc",
            ModifierType::NumOfOccurrences => "occ",
        }
    }
}

impl fmt::Display for ModifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierType::AgeAtEvent => write!(f, "AGE_AT_EVENT"),
            ModifierType::EventDate => write!(f, "EVENT_DATE"),
            ModifierType::Encounters => write!(f, "ENCOUNTERS"),
            ModifierType::NumOfOccurrences => write!(f, "NUM_OF_OCCURRENCES"),
        }
    }
}

/// Which qualifying event(s) per person satisfy a criteria filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalMention {
    /// Every qualifying event.
    AnyMention,
    /// The earliest qualifying event.
    FirstMention,
    /// The latest qualifying event.
    LastMention,
}

impl fmt::Display for TemporalMention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalMention::AnyMention => write!(f, "ANY_MENTION"),
            TemporalMention::FirstMention => write!(f, "FIRST_MENTION"),
            TemporalMention::LastMention => write!(f, "LAST_MENTION"),
        }
    }
}

/// Relation between the two item sets of a temporal group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalTime {
    /// Both events share a visit occurrence.
    DuringSameEncounterAs,
    /// First event at least N days before the second.
    XDaysBefore,
    /// First event at least N days after the second.
    XDaysAfter,
    /// First event within N days either side of the second.
    WithinXDaysOf,
}

impl TemporalTime {
    /// Returns true when the relation needs a day count.
    pub fn requires_time_value(&self) -> bool {
        !matches!(self, TemporalTime::DuringSameEncounterAs)
    }
}

impl fmt::Display for TemporalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalTime::DuringSameEncounterAs => write!(f, "DURING_SAME_ENCOUNTER_AS"),
            TemporalTime::XDaysBefore => write!(f, "X_DAYS_BEFORE"),
            TemporalTime::XDaysAfter => write!(f, "X_DAYS_AFTER"),
            TemporalTime::WithinXDaysOf => write!(f, "WITHIN_X_DAYS_OF"),
        }
    }
}

/// Attribute names.
///
/// `Any`, `Num`, `Cat` and `Both` drive measurement filtering; `Systolic`
/// and `Diastolic` name the blood pressure components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrName {
    #[serde(rename = "ANY")]
    Any,
    #[serde(rename = "NUM")]
    Num,
    #[serde(rename = "CAT")]
    Cat,
    #[serde(rename = "BOTH")]
    Both,
    #[serde(rename = "Systolic")]
    Systolic,
    #[serde(rename = "Diastolic")]
    Diastolic,
}

impl fmt::Display for AttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrName::Any => write!(f, "ANY"),
            AttrName::Num => write!(f, "NUM"),
            AttrName::Cat => write!(f, "CAT"),
            AttrName::Both => write!(f, "BOTH"),
            AttrName::Systolic => write!(f, "Systolic"),
            AttrName::Diastolic => write!(f, "Diastolic"),
        }
    }
}

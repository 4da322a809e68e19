//! OMOP CDM table and column names.
//!
//! Event tables are described by [`DomainTable`], a closed map from domain to
//! the table and columns a criteria query reads. All names here are trusted
//! and interpolated directly into SQL.

use std::fmt;
use std::str::FromStr;

pub(crate) const PERSON: &str = "person";
pub(crate) const DEATH: &str = "death";
pub(crate) const CONCEPT: &str = "concept";
pub(crate) const CRITERIA: &str = "criteria";
pub(crate) const VISIT_OCCURRENCE: &str = "visit_occurrence";

/// The event domains criteria can be searched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainTable {
    Condition,
    Procedure,
    Observation,
    Measurement,
    Drug,
    Device,
    Visit,
}

impl DomainTable {
    pub const ALL: [DomainTable; 7] = [
        DomainTable::Condition,
        DomainTable::Procedure,
        DomainTable::Observation,
        DomainTable::Measurement,
        DomainTable::Drug,
        DomainTable::Device,
        DomainTable::Visit,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            DomainTable::Condition => "condition_occurrence",
            DomainTable::Procedure => "procedure_occurrence",
            DomainTable::Observation => "observation",
            DomainTable::Measurement => "measurement",
            DomainTable::Drug => "drug_exposure",
            DomainTable::Device => "device_exposure",
            DomainTable::Visit => "visit_occurrence",
        }
    }

    /// Standard concept column.
    pub fn concept_id_column(&self) -> &'static str {
        match self {
            DomainTable::Condition => "condition_concept_id",
            DomainTable::Procedure => "procedure_concept_id",
            DomainTable::Observation => "observation_concept_id",
            DomainTable::Measurement => "measurement_concept_id",
            DomainTable::Drug => "drug_concept_id",
            DomainTable::Device => "device_concept_id",
            DomainTable::Visit => "visit_concept_id",
        }
    }

    /// Source concept column, which carries the coded ICD/CPT value.
    pub fn source_concept_id_column(&self) -> &'static str {
        match self {
            DomainTable::Condition => "condition_source_concept_id",
            DomainTable::Procedure => "procedure_source_concept_id",
            DomainTable::Observation => "observation_source_concept_id",
            DomainTable::Measurement => "measurement_source_concept_id",
            DomainTable::Drug => "drug_source_concept_id",
            DomainTable::Device => "device_source_concept_id",
            DomainTable::Visit => "visit_source_concept_id",
        }
    }

    /// Date column the event is ranked and aged by.
    pub fn entry_date_column(&self) -> &'static str {
        match self {
            DomainTable::Condition => "condition_start_date",
            DomainTable::Procedure => "procedure_date",
            DomainTable::Observation => "observation_date",
            DomainTable::Measurement => "measurement_date",
            DomainTable::Drug => "drug_exposure_start_date",
            DomainTable::Device => "device_exposure_start_date",
            DomainTable::Visit => "visit_start_date",
        }
    }
}

impl fmt::Display for DomainTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainTable::Condition => write!(f, "Condition"),
            DomainTable::Procedure => write!(f, "Procedure"),
            DomainTable::Observation => write!(f, "Observation"),
            DomainTable::Measurement => write!(f, "Measurement"),
            DomainTable::Drug => write!(f, "Drug"),
            DomainTable::Device => write!(f, "Device"),
            DomainTable::Visit => write!(f, "Visit"),
        }
    }
}

impl FromStr for DomainTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "condition" => Ok(DomainTable::Condition),
            "procedure" => Ok(DomainTable::Procedure),
            "observation" => Ok(DomainTable::Observation),
            "measurement" => Ok(DomainTable::Measurement),
            "drug" => Ok(DomainTable::Drug),
            "device" => Ok(DomainTable::Device),
            "visit" => Ok(DomainTable::Visit),
            _ => Err(format!("unknown domain: {}", s)),
        }
    }
}

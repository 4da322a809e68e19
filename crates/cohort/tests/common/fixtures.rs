//! Search request fixtures.
//!
//! Fixtures are written as JSON in the shape the cohort builder UI sends and
//! deserialized into the request model.

use helios_cohort::{SearchGroupItem, SearchRequest};
use serde_json::{Value, json};

/// Deserializes a request fixture.
pub fn request(value: Value) -> SearchRequest {
    serde_json::from_value(value).expect("request fixture deserializes")
}

/// Deserializes an item fixture.
pub fn item(value: Value) -> SearchGroupItem {
    serde_json::from_value(value).expect("item fixture deserializes")
}

/// A request with one include group holding `items`.
pub fn include(items: Vec<Value>) -> SearchRequest {
    request(json!({ "includes": [{ "items": items }] }))
}

/// ICD9 diabetes group code `250`.
pub fn icd9_group(code: &str) -> Value {
    json!({
        "type": "ICD9",
        "searchParameters": [{
            "value": code,
            "domain": "Condition",
            "type": "ICD9",
            "subtype": "CM",
            "group": true
        }]
    })
}

/// Male gender.
pub fn gender_male() -> Value {
    json!({
        "type": "DEMO",
        "searchParameters": [{
            "conceptId": 8507,
            "type": "DEMO",
            "subtype": "GEN"
        }]
    })
}

/// A leaf drug concept.
pub fn drug(concept_id: i64) -> Value {
    json!({
        "type": "DRUG",
        "searchParameters": [{
            "conceptId": concept_id,
            "type": "DRUG",
            "subtype": "ATC",
            "group": false
        }]
    })
}

/// A lab measurement with one categorical attribute.
pub fn measurement_categorical(concept_id: i64, operands: &[&str]) -> Value {
    json!({
        "type": "MEAS",
        "searchParameters": [{
            "conceptId": concept_id,
            "type": "MEAS",
            "subtype": "LAB",
            "attributes": [{
                "name": "CAT",
                "operator": "IN",
                "operands": operands
            }]
        }]
    })
}

/// A blood pressure reading with systolic and diastolic ranges.
pub fn blood_pressure(systolic: [&str; 2], diastolic: [&str; 2]) -> Value {
    json!({
        "type": "PM",
        "searchParameters": [{
            "type": "PM",
            "subtype": "BP",
            "attributes": [
                {
                    "name": "Systolic",
                    "operator": "BETWEEN",
                    "operands": systolic,
                    "conceptId": 903118
                },
                {
                    "name": "Diastolic",
                    "operator": "BETWEEN",
                    "operands": diastolic,
                    "conceptId": 903115
                }
            ]
        }]
    })
}

/// Adds modifiers to an item fixture.
pub fn with_modifiers(mut item: Value, modifiers: Value) -> Value {
    item["modifiers"] = modifiers;
    item
}

/// Adds a temporal mention to an item fixture.
pub fn with_mention(mut item: Value, mention: &str) -> Value {
    item["temporalMention"] = json!(mention);
    item
}

/// Puts an item fixture in a temporal group set.
pub fn in_temporal_group(mut item: Value, set: i32) -> Value {
    item["temporalGroup"] = json!(set);
    item
}

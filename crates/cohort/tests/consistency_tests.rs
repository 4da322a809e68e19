//! Determinism and placeholder/binding agreement across request shapes.

mod common;

use common::assertions::{assert_bindings_consistent, normalize_placeholders};
use common::builder;
use common::fixtures::{
    blood_pressure, drug, gender_male, icd9_group, include, measurement_categorical, request,
    with_mention, with_modifiers,
};
use helios_cohort::SearchRequest;
use serde_json::json;

fn requests() -> Vec<SearchRequest> {
    vec![
        include(vec![icd9_group("250"), gender_male()]),
        include(vec![with_modifiers(
            drug(1127078),
            json!([
                { "name": "AGE_AT_EVENT", "operator": "BETWEEN", "operands": ["18", "65"] },
                { "name": "NUM_OF_OCCURRENCES", "operator": "GREATER_THAN", "operands": ["1"] }
            ]),
        )]),
        include(vec![with_mention(
            with_modifiers(
                measurement_categorical(3015813, &["45878583"]),
                json!([{ "name": "NUM_OF_OCCURRENCES", "operator": "GREATER_THAN", "operands": ["1"] }]),
            ),
            "LAST_MENTION",
        )]),
        request(json!({
            "includes": [
                { "items": [blood_pressure(["140", "200"], ["90", "150"])] },
                { "items": [icd9_group("401")] }
            ],
            "excludes": [
                { "items": [drug(1308216)] }
            ]
        })),
    ]
}

#[test]
fn test_placeholders_match_bindings() {
    let builder = builder();
    for request in requests() {
        assert_bindings_consistent(&builder.count_query(&request).unwrap());
        assert_bindings_consistent(&builder.participant_query(&request).unwrap());
    }
}

#[test]
fn test_compilation_is_deterministic() {
    let builder = builder();
    for request in requests() {
        let first = builder.count_query(&request).unwrap();
        let second = builder.count_query(&request).unwrap();
        assert_eq!(
            normalize_placeholders(&first.sql),
            normalize_placeholders(&second.sql)
        );
        assert_eq!(first.to_literal_sql(), second.to_literal_sql());
        assert_eq!(first.parameters, second.parameters);
    }
}

#[test]
fn test_rejected_request_returns_no_query() {
    let request = include(vec![
        icd9_group("250"),
        json!({ "type": "DRUG", "searchParameters": [{ "type": "DRUG" }] }),
    ]);
    let err = builder().count_query(&request).unwrap_err();
    assert!(err.is_user_error());
    assert_eq!(err.as_validation().unwrap().field, "Concept Id");
}

#[test]
fn test_builder_is_shareable_across_threads() {
    let builder = std::sync::Arc::new(builder());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let builder = builder.clone();
            std::thread::spawn(move || builder.count_query(&include(vec![icd9_group("250")])))
        })
        .collect();
    let results: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap().sql)
        .collect();
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

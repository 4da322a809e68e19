//! Assertions over compiled queries.

use std::collections::BTreeSet;

use helios_cohort::CompiledQuery;
use regex::Regex;

/// Asserts every `@name` in the text is bound and every binding is used.
pub fn assert_bindings_consistent(compiled: &CompiledQuery) {
    let placeholder = Regex::new(r"@(\w+)").expect("placeholder pattern");
    let referenced: BTreeSet<String> = placeholder
        .captures_iter(&compiled.sql)
        .map(|caps| caps[1].to_string())
        .collect();
    let bound: BTreeSet<String> = compiled.parameters.keys().cloned().collect();

    assert_eq!(
        referenced, bound,
        "placeholders and bindings differ in:\n{}",
        compiled.sql
    );
    assert_eq!(compiled.referenced_parameters(), referenced);
}

/// Replaces parameter names with `@?` so texts can be compared regardless of
/// naming.
pub fn normalize_placeholders(sql: &str) -> String {
    let placeholder = Regex::new(r"@\w+").expect("placeholder pattern");
    placeholder.replace_all(sql, "@?").into_owned()
}

//! Black-box tests for description truncation through the public crate API.

use rds::core::instance::model::Instance;

#[test]
fn truncates_multibyte_descriptions_by_character_not_byte() {
    let desc: String = std::iter::repeat('\u{00e9}').take(100).collect();
    let truncated = Instance::truncate_desc(&desc);
    assert_eq!(truncated.chars().count(), 64);
}

#[test]
fn description_of_exactly_64_characters_is_unchanged() {
    let desc: String = "x".repeat(64);
    assert_eq!(Instance::truncate_desc(&desc), desc);
}

#[test]
fn empty_description_stays_empty() {
    assert_eq!(Instance::truncate_desc(""), "");
}

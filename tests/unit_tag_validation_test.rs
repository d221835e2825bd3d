//! Black-box tests for tag validation through the public crate API.

use rds::core::instance::model::{Instance, validate_tag};

#[test]
fn accepts_all_documented_color_codes() {
    for color in ['r', 'g', 'b', 'y', 'c', 'm', 'k', 'w'] {
        assert!(validate_tag(&format!("{color}:prod")).is_ok(), "color {color} should be valid");
    }
}

#[test]
fn rejects_a_two_letter_color_prefix() {
    assert!(validate_tag("rg:prod").is_err());
}

#[test]
fn rejects_a_tag_that_is_only_a_color_prefix_with_empty_name() {
    assert!(validate_tag("r:").is_err());
}

#[test]
fn validate_tags_accepts_exactly_the_maximum() {
    let tags = vec!["one".to_string(), "two".to_string(), "three".to_string()];
    assert!(Instance::validate_tags(&tags).is_ok());
}

#[test]
fn validate_tags_propagates_the_first_bad_tag() {
    let tags = vec!["ok".to_string(), "bad tag".to_string()];
    assert!(Instance::validate_tags(&tags).is_err());
}

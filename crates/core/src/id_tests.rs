// SPDX-License-Identifier: MIT

use crate::id::short;

crate::define_id! {
    /// Test-only ID type.
    pub struct SampleId("smp-");
}

#[test]
fn generated_ids_carry_prefix() {
    let id = SampleId::new();
    assert!(id.as_str().starts_with("smp-"));
    assert_eq!(id.as_str().len(), 4 + 16);
}

#[test]
fn generated_ids_are_unique() {
    let a = SampleId::new();
    let b = SampleId::new();
    assert_ne!(a, b);
}

#[test]
fn suffix_strips_prefix() {
    let id = SampleId::from_string("smp-abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn suffix_without_prefix_is_whole_string() {
    let id = SampleId::from_string("raw-value");
    assert_eq!(id.suffix(), "raw-value");
}

#[test]
fn serde_is_transparent() {
    let id = SampleId::from_string("smp-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"smp-xyz\"");
    let back: SampleId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn eq_against_str() {
    let id = SampleId::from_string("smp-1");
    assert!(id == "smp-1");
}

#[yare::parameterized(
    shorter = { "abc", 5, "abc" },
    exact   = { "abcde", 5, "abcde" },
    longer  = { "abcdefg", 5, "abcde" },
    empty   = { "", 3, "" },
)]
fn short_truncates(input: &str, n: usize, expected: &str) {
    assert_eq!(short(input, n), expected);
}

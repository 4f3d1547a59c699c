//! Property-based tests for canonicalization.
//!
//! Uses proptest to verify invariants hold for arbitrary inputs.

use proptest::prelude::*;
use serde_json::{Map, Value};

use crate::canonical::{canonicalize_value, digest_value};

// ============================================================================
// Arbitrary Implementations
// ============================================================================

/// Generate arbitrary JSON leaves.
fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        // Quarter steps are exact in binary, so text round-trips are exact.
        (-4_000_000i32..4_000_000).prop_map(|n| Value::from(f64::from(n) / 4.0)),
        "\\PC{0,12}".prop_map(Value::String),
    ]
}

/// Generate arbitrary nested JSON values.
fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..6).prop_map(|pairs| {
                Value::Object(pairs.into_iter().collect::<Map<String, Value>>())
            }),
        ]
    })
}

/// Render an object's entries in the given order, without sorting.
fn render_in_order(entries: &[(String, Value)]) -> String {
    let body: Vec<String> = entries
        .iter()
        .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
        .collect();
    format!("{{{}}}", body.join(","))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Key insertion order never affects the canonical form.
    #[test]
    fn prop_key_order_irrelevant(
        entries in prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..8)
    ) {
        let forward: Vec<(String, Value)> = entries.clone().into_iter().collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let a: Value = serde_json::from_str(&render_in_order(&forward)).unwrap();
        let b: Value = serde_json::from_str(&render_in_order(&reversed)).unwrap();

        prop_assert_eq!(canonicalize_value(&a), canonicalize_value(&b));
        prop_assert_eq!(digest_value(&a), digest_value(&b));
    }

    /// The canonical form is valid JSON and a fixed point of re-canonicalization.
    #[test]
    fn prop_canonical_is_fixed_point(value in arb_value()) {
        let once = canonicalize_value(&value);
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        prop_assert_eq!(canonicalize_value(&reparsed), once);
    }

    /// No whitespace outside of string literals.
    #[test]
    fn prop_no_structural_whitespace(value in arb_value()) {
        let mut stripped = value.clone();
        strip_strings(&mut stripped);
        let out = canonicalize_value(&stripped);
        prop_assert!(!out.contains(' ') && !out.contains('\n'));
    }

    /// Changing a string leaf changes the digest.
    #[test]
    fn prop_leaf_change_changes_digest(
        key in "[a-z]{1,8}",
        a in "\\PC{0,16}",
        b in "\\PC{0,16}",
    ) {
        prop_assume!(a != b);
        let mut left = Map::new();
        left.insert(key.clone(), Value::String(a));
        let mut right = Map::new();
        right.insert(key, Value::String(b));
        prop_assert_ne!(
            digest_value(&Value::Object(left)),
            digest_value(&Value::Object(right))
        );
    }

    /// Digesting is deterministic.
    #[test]
    fn prop_digest_deterministic(value in arb_value()) {
        prop_assert_eq!(digest_value(&value), digest_value(&value.clone()));
    }
}

/// Blank out string contents so only structure can contribute whitespace.
fn strip_strings(value: &mut Value) {
    match value {
        Value::String(s) => s.clear(),
        Value::Array(items) => items.iter_mut().for_each(strip_strings),
        Value::Object(map) => {
            let entries: Vec<(String, Value)> = std::mem::take(map)
                .into_iter()
                .map(|(k, mut v)| {
                    strip_strings(&mut v);
                    (k, v)
                })
                .collect();
            map.extend(entries);
        }
        _ => {}
    }
}

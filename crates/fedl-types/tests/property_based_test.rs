use fedl_types::{canonical_hash, content_key, to_canonical_json, CONTENT_KEY_LEN};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

fn arbitrary_fields() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)
}

/// Field entries in an arbitrary insertion order
fn shuffled_entries() -> impl Strategy<Value = Vec<(String, i64)>> {
    arbitrary_fields().prop_flat_map(|fields| {
        let entries: Vec<(String, i64)> = fields.into_iter().collect();
        Just(entries).prop_shuffle()
    })
}

fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key, value);
    }
    Value::Object(map)
}

proptest! {
    #[test]
    fn prop_insertion_order_does_not_change_key(entries in shuffled_entries()) {
        let shuffled = object(entries.iter().map(|(k, v)| (k.clone(), Value::from(*v))));
        let mut sorted_entries = entries.clone();
        sorted_entries.sort();
        let sorted = object(sorted_entries.into_iter().map(|(k, v)| (k, Value::from(v))));

        prop_assert_eq!(to_canonical_json(&shuffled).unwrap(), to_canonical_json(&sorted).unwrap());
        prop_assert_eq!(content_key(&shuffled).unwrap(), content_key(&sorted).unwrap());
    }

    #[test]
    fn prop_null_fields_are_ignored(
        fields in arbitrary_fields(),
        nulls in prop::collection::btree_set("[A-Z]{1,8}", 1..4),
    ) {
        let plain = object(fields.iter().map(|(k, v)| (k.clone(), Value::from(*v))));
        let with_nulls = object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .chain(nulls.iter().map(|k| (k.clone(), Value::Null))),
        );
        let nested_plain = object([("inner".to_string(), plain.clone())]);
        let nested_with_nulls = object([("inner".to_string(), with_nulls.clone())]);

        prop_assert_eq!(content_key(&plain).unwrap(), content_key(&with_nulls).unwrap());
        prop_assert_eq!(
            canonical_hash(&nested_plain).unwrap(),
            canonical_hash(&nested_with_nulls).unwrap()
        );
    }

    #[test]
    fn prop_array_order_is_significant(items in prop::collection::btree_set("[a-z]{1,6}", 2..6)) {
        let forward: Vec<String> = items.into_iter().collect();
        let mut backward = forward.clone();
        backward.reverse();

        let a = object([("inModelKeys".to_string(), Value::from(forward))]);
        let b = object([("inModelKeys".to_string(), Value::from(backward))]);
        prop_assert_ne!(content_key(&a).unwrap(), content_key(&b).unwrap());
    }

    #[test]
    fn prop_content_key_is_fixed_length_hex(fields in arbitrary_fields()) {
        let key = content_key(&fields).unwrap();
        prop_assert_eq!(key.len(), CONTENT_KEY_LEN);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn test_distinct_field_sets_have_distinct_keys() {
    let keys: BTreeSet<String> = ["a", "b", "c"]
        .iter()
        .map(|name| content_key(&object([(name.to_string(), Value::from(1))])).unwrap())
        .collect();
    assert_eq!(keys.len(), 3);
}

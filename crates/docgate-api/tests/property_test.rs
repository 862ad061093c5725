//! Property-based tests for collection resolution.

#![allow(clippy::unwrap_used)]

use docgate_api::{
    collection::{resolve_collection, strip_routing_keys, ROUTING_KEYS},
    error::ApiError,
};
use docgate_core::models::{CollectionName, Document};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use serde_json::Value;

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 100,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

/// A value an alias key may carry: absent, null, blank, valid, invalid, or
/// a non-string.
fn alias_value() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(Value::Null)),
        "[ ]{0,3}".prop_map(|s| Some(Value::String(s))),
        "[A-Za-z0-9_]{1,64}".prop_map(|s| Some(Value::String(s))),
        "[a-z]{1,5} [a-z]{1,5}".prop_map(|s| Some(Value::String(s))),
        any::<i64>().prop_map(|n| Some(Value::from(n))),
    ]
}

fn is_skipped(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

proptest! {
    #![proptest_config(proptest_config())]

    /// The first alias that is present and not blank decides the outcome.
    #[test]
    fn first_meaningful_alias_wins(values in prop::array::uniform3(alias_value())) {
        let default = CollectionName::parse("fallback").unwrap();
        let mut params = Document::new();
        for (key, value) in ROUTING_KEYS.iter().zip(values.iter()) {
            if let Some(value) = value {
                params.insert((*key).to_string(), value.clone());
            }
        }

        let decisive = values.iter().flatten().find(|value| !is_skipped(value));
        let resolved = resolve_collection(&params, &default);

        match decisive {
            Some(Value::String(name)) => match CollectionName::parse(name.trim()) {
                Ok(expected) => {
                    prop_assert_eq!(resolved.unwrap(), expected);
                },
                Err(_) => {
                    prop_assert!(matches!(resolved, Err(ApiError::InvalidCollection(_))));
                },
            },
            _ => {
                prop_assert_eq!(resolved.unwrap(), default);
            },
        }
    }

    /// Stripping removes every alias and nothing else.
    #[test]
    fn stripping_only_removes_aliases(
        extra in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8),
        values in prop::array::uniform3(alias_value()),
    ) {
        let mut document = Document::new();
        for (key, value) in &extra {
            document.insert(key.clone(), Value::from(*value));
        }
        for (key, value) in ROUTING_KEYS.iter().zip(values.iter()) {
            if let Some(value) = value {
                document.insert((*key).to_string(), value.clone());
            }
        }

        strip_routing_keys(&mut document);

        for key in ROUTING_KEYS {
            prop_assert!(!document.contains_key(key));
        }
        for (key, value) in &extra {
            if !ROUTING_KEYS.contains(&key.as_str()) {
                prop_assert_eq!(document.get(key), Some(&Value::from(*value)));
            }
        }
    }
}

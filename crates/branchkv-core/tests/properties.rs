//! Property-based tests for the range index and the node store
//!
//!  - Any sequence of splits keeps the index a partition of the key-hash domain
//!  - Splitting the nodes of a store at its split point loses and duplicates nothing
//!  - A lookup returns the value written by the nearest ancestor

use branchkv_core::{KeyRange, Location, RangeIndex, Store, KEY_HASH_MAX};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn split_sequence() -> impl Strategy<Value = Vec<(usize, u32)>> {
    prop::collection::vec((0usize..64, any::<u32>()), 0..40)
}

proptest! {
    #[test]
    fn index_stays_a_partition(splits in split_sequence()) {
        let mut index = RangeIndex::with_initial("server-0");
        let mut next_server = 1;

        for (pick, offset) in splits {
            let mapping = index.mappings()[pick % index.len()].clone();
            let range = mapping.range;
            if range.low == range.high {
                continue;
            }
            let mid = range.low + offset % (range.high - range.low);
            let spare = format!("server-{next_server}");
            next_server += 1;

            index.apply_split(range, mid, &mapping.address, &spare).unwrap();
            prop_assert!(index.is_complete());
        }

        let covered: u64 = index.mappings().iter().map(|m| m.range.width()).sum();
        prop_assert_eq!(covered, KEY_HASH_MAX as u64 + 1);
    }

    #[test]
    fn rejected_split_leaves_index_untouched(mid in any::<u32>()) {
        let mut index = RangeIndex::with_initial("a");
        index.apply_split(KeyRange::full(), u32::MAX / 2, "a", "b").unwrap();
        let before = index.clone();

        // The full range is no longer mapped
        prop_assert!(index.apply_split(KeyRange::full(), mid, "x", "y").is_err());
        prop_assert_eq!(index, before);
    }

    #[test]
    fn store_split_conserves_nodes(keys in prop::collection::btree_set("[a-z]{1,8}", 2..60)) {
        let mut store = Store::new();
        for key in &keys {
            let data = BTreeMap::from([(key.clone(), "v".to_string())]);
            store.set(Location::ROOT, data).unwrap();
        }
        let total = store.len();

        if let Some(mid) = store.split_point(0, u32::MAX) {
            let left = store.locations_in(0, mid);
            let right = store.locations_in(mid + 1, u32::MAX);
            prop_assert_eq!(left.len() + right.len(), total);
            prop_assert!(!left.is_empty());
        }
    }

    #[test]
    fn nearest_ancestor_wins(values in prop::collection::vec("[a-z0-9]{1,6}", 1..20)) {
        let mut store = Store::new();
        let mut tip = Location::ROOT;
        for (i, value) in values.iter().enumerate() {
            let data = BTreeMap::from([
                ("k".to_string(), value.clone()),
                (format!("step-{i:03}"), String::new()),
            ]);
            tip = store.set(tip, data).unwrap().location;
        }

        let lookup = store.get(tip, Some(&["k".to_string()])).unwrap();
        prop_assert_eq!(lookup.data.get("k"), values.last());
    }
}

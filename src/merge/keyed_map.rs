//! Three-way merge of workbook-level opaque keyed maps (§4.5.1): `metadata`,
//! `namedRanges`, `comments`.

use std::collections::BTreeMap;

use crate::merge::conflict::{Conflict, KeyedMapName};

/// Merge one keyed map via the three-way rule, appending conflicts to
/// `conflicts` for keys that diverge on both sides.
pub(crate) fn merge_keyed_map(
    name: KeyedMapName,
    base: &BTreeMap<String, serde_json::Value>,
    ours: &BTreeMap<String, serde_json::Value>,
    theirs: &BTreeMap<String, serde_json::Value>,
    conflicts: &mut Vec<Conflict>,
) -> BTreeMap<String, serde_json::Value> {
    let mut keys: Vec<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut result = BTreeMap::new();
    for key in keys {
        let b = base.get(key);
        let o = ours.get(key);
        let t = theirs.get(key);

        let resolved = if o == t {
            o.cloned()
        } else if b == o {
            t.cloned()
        } else if b == t {
            o.cloned()
        } else {
            conflicts.push(Conflict::KeyedMap {
                map: name,
                key: key.clone(),
                ours: o.cloned(),
                theirs: t.cloned(),
            });
            o.cloned()
        };

        if let Some(value) = resolved {
            result.insert(key.clone(), value);
        }
    }
    result
}

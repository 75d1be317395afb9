//! Flat Envelopes
//!
//! Converts between the nested wire layout (a value plus fixups) and the flat
//! layout, where every JSON object lives in an indexed table and is referred
//! to by its index string.
//!
//! [`flatten`] runs after marshalling: object fixups become index strings,
//! fixups to arrays and scalars become copies of the original. [`unflatten`]
//! runs before unmarshalling and does the reverse: the first use of an index
//! is expanded in place, later uses become fixups to it.
//!
//! Bare arrays have no index, so a cycle made only of arrays cannot be
//! flattened. A string that happens to start with
//! [`INDEX_PREFIX`](dumborb_common::protocol::envelope::INDEX_PREFIX) is read
//! as an index on the way in.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value as JsonValue};

use dumborb_common::protocol::envelope::INDEX_PREFIX;
use dumborb_common::{DumborbError, Fixup, FlatObjects, Path, PathSegment, Result};

use crate::state::wire_at;

struct Flattener<'a> {
    root: &'a JsonValue,
    redirects: HashMap<Path, Path>,
    indexes: HashMap<Path, String>,
    open_arrays: HashSet<Path>,
    objects: FlatObjects,
    next: usize,
}

impl Flattener<'_> {
    fn index_for(&mut self, path: &Path) -> (String, bool) {
        if let Some(index) = self.indexes.get(path) {
            return (index.clone(), false);
        }
        self.next += 1;
        let index = format!("{}{}", INDEX_PREFIX, self.next);
        self.indexes.insert(path.clone(), index.clone());
        (index, true)
    }

    fn hoist(&mut self, node: &JsonValue, path: &mut Path) -> Result<JsonValue> {
        if let Some(original) = self.redirects.get(&*path).cloned() {
            let root = self.root;
            let target = wire_at(root, &original).ok_or_else(|| {
                DumborbError::Marshal(format!("fixup original {:?} not found", original))
            })?;
            let mut original = original;
            return self.hoist(target, &mut original);
        }
        match node {
            JsonValue::Object(map) => {
                let (index, fresh) = self.index_for(path);
                if fresh {
                    let mut out = Map::new();
                    for (key, child) in map {
                        path.push(PathSegment::Key(key.clone()));
                        let item = self.hoist(child, path);
                        path.pop();
                        out.insert(key.clone(), item?);
                    }
                    self.objects.insert(index.clone(), JsonValue::Object(out));
                }
                Ok(JsonValue::String(index))
            }
            JsonValue::Array(items) => {
                if !self.open_arrays.insert(path.clone()) {
                    return Err(DumborbError::Marshal(format!(
                        "circular array at {:?} cannot be flattened",
                        path
                    )));
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    let item = self.hoist(child, path);
                    path.pop();
                    out.push(item?);
                }
                self.open_arrays.remove(&*path);
                Ok(JsonValue::Array(out))
            }
            scalar => Ok(scalar.clone()),
        }
    }
}

/// Flattens a marshalled value and its fixups.
///
/// Returns the replacement for the value itself (an index string if it is an
/// object) and the object table, numbered from 1 in visiting order.
///
/// # Errors
///
/// Returns `DumborbError::Marshal` for a cycle of bare arrays or a fixup
/// whose original is missing.
pub fn flatten(wire: &JsonValue, fixups: &[Fixup]) -> Result<(JsonValue, FlatObjects)> {
    let mut flattener = Flattener {
        root: wire,
        redirects: fixups
            .iter()
            .map(|f| (f.location.clone(), f.original.clone()))
            .collect(),
        indexes: HashMap::new(),
        open_arrays: HashSet::new(),
        objects: FlatObjects::new(),
        next: 0,
    };
    let top = flattener.hoist(wire, &mut Path::new())?;
    Ok((top, flattener.objects))
}

struct Unflattener<'a> {
    objects: &'a FlatObjects,
    placed: HashMap<String, Path>,
    fixups: Vec<Fixup>,
}

impl Unflattener<'_> {
    fn restore(&mut self, node: &JsonValue, path: &mut Path) -> Result<JsonValue> {
        match node {
            JsonValue::String(index) if index.starts_with(INDEX_PREFIX) => {
                if let Some(original) = self.placed.get(index) {
                    self.fixups.push(Fixup::new(path.clone(), original.clone()));
                    return Ok(JsonValue::Null);
                }
                let objects = self.objects;
                let object = objects
                    .get(index)
                    .ok_or_else(|| DumborbError::Parse(format!("unknown object index '{}'", index)))?;
                self.placed.insert(index.clone(), path.clone());
                self.restore(object, path)
            }
            JsonValue::Object(map) => {
                let mut out = Map::new();
                for (key, child) in map {
                    path.push(PathSegment::Key(key.clone()));
                    let item = self.restore(child, path);
                    path.pop();
                    out.insert(key.clone(), item?);
                }
                Ok(JsonValue::Object(out))
            }
            JsonValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    let item = self.restore(child, path);
                    path.pop();
                    out.push(item?);
                }
                Ok(JsonValue::Array(out))
            }
            scalar => Ok(scalar.clone()),
        }
    }
}

/// Expands the index strings in `wire` using `objects`.
///
/// Returns the nested value and the fixups for every index used more than
/// once, relative to `wire`.
///
/// # Errors
///
/// Returns `DumborbError::Parse` for an index missing from `objects`.
pub fn unflatten(wire: &JsonValue, objects: &FlatObjects) -> Result<(JsonValue, Vec<Fixup>)> {
    let mut unflattener = Unflattener {
        objects,
        placed: HashMap::new(),
        fixups: Vec::new(),
    };
    let nested = unflattener.restore(wire, &mut Path::new())?;
    Ok((nested, unflattener.fixups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.into())
    }

    #[test]
    fn test_flatten_hoists_objects_in_visiting_order() {
        let wire = json!({"a": {"v": 1}, "list": [{"v": 2}, 3]});
        let (top, objects) = flatten(&wire, &[]).unwrap();
        assert_eq!(top, json!("_$Inx$_1"));
        assert_eq!(objects.len(), 3);
        assert_eq!(objects["_$Inx$_1"], json!({"a": "_$Inx$_2", "list": ["_$Inx$_3", 3]}));
        assert_eq!(objects["_$Inx$_2"], json!({"v": 1}));
        assert_eq!(objects["_$Inx$_3"], json!({"v": 2}));
    }

    #[test]
    fn test_flatten_turns_object_fixups_into_indexes() {
        let wire = json!({"self": null, "items": [{"v": 1}, null]});
        let fixups = vec![
            Fixup::new(vec![key("self")], vec![]),
            Fixup::new(vec![key("items"), 1.into()], vec![key("items"), 0.into()]),
        ];
        let (top, objects) = flatten(&wire, &fixups).unwrap();
        assert_eq!(top, json!("_$Inx$_1"));
        assert_eq!(
            objects["_$Inx$_1"],
            json!({"items": ["_$Inx$_2", "_$Inx$_2"], "self": "_$Inx$_1"})
        );
    }

    #[test]
    fn test_flatten_copies_arrays_and_scalars() {
        let wire = json!([[1, "s"], null, null]);
        let fixups = vec![
            Fixup::new(vec![1.into()], vec![0.into()]),
            Fixup::new(vec![2.into()], vec![0.into(), 1.into()]),
        ];
        let (top, objects) = flatten(&wire, &fixups).unwrap();
        assert_eq!(top, json!([[1, "s"], [1, "s"], "s"]));
        assert!(objects.is_empty());
    }

    #[test]
    fn test_flatten_rejects_array_cycles() {
        let wire = json!([null]);
        let fixups = vec![Fixup::new(vec![0.into()], vec![])];
        assert!(matches!(flatten(&wire, &fixups), Err(DumborbError::Marshal(_))));
    }

    #[test]
    fn test_unflatten_restores_nesting_and_fixups() {
        let objects = FlatObjects::from([
            ("_$Inx$_1".to_string(), json!({"name": "a", "next": "_$Inx$_2"})),
            ("_$Inx$_2".to_string(), json!({"name": "b", "next": "_$Inx$_1"})),
        ]);
        let (nested, fixups) = unflatten(&json!(["_$Inx$_1", "_$Inx$_2"]), &objects).unwrap();
        assert_eq!(
            nested,
            json!([{"name": "a", "next": {"name": "b", "next": null}}, null])
        );
        assert_eq!(
            fixups,
            vec![
                Fixup::new(vec![0.into(), key("next"), key("next")], vec![0.into()]),
                Fixup::new(vec![1.into()], vec![0.into(), key("next")]),
            ]
        );
    }

    #[test]
    fn test_unflatten_unknown_index_is_a_parse_error() {
        let err = unflatten(&json!(["_$Inx$_9"]), &FlatObjects::new()).unwrap_err();
        assert!(matches!(err, DumborbError::Parse(_)));
    }
}

//! Flat, dotted-path view of a JSON record.
//!
//! `{"personal": {"firstName": "Ada"}}` is held as `personal.firstName =
//! "Ada"`. Arrays and empty objects are leaves, so
//! `flatten(v).to_json() == v` for any object whose keys contain no `.`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One normalized input record keyed by dotted field path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRecord {
    fields: BTreeMap<String, Value>,
}

impl CanonicalRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a JSON object. Non-object values become a single root leaf
    /// under the empty path.
    #[must_use]
    pub fn flatten(value: &Value) -> Self {
        let mut record = Self::new();
        match value {
            Value::Object(map) if !map.is_empty() => flatten_into(&mut record.fields, "", map),
            Value::Object(_) => {}
            other => {
                record.fields.insert(String::new(), other.clone());
            }
        }
        record
    }

    /// Rebuild the nested JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut root = Value::Object(Map::new());
        for (path, value) in &self.fields {
            set_at(&mut root, path, value.clone());
        }
        root
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        self.fields.get_mut(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(path.into(), value)
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        self.fields.remove(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Remove every leaf at or below `prefix` and return them re-rooted at
    /// `prefix`. Returns `None` when nothing lives under it.
    pub fn take_subtree(&mut self, prefix: &str) -> Option<CanonicalRecord> {
        let nested = format!("{prefix}.");
        let paths: Vec<String> = self
            .fields
            .keys()
            .filter(|p| p.as_str() == prefix || p.starts_with(&nested))
            .cloned()
            .collect();
        if paths.is_empty() {
            return None;
        }

        let mut subtree = CanonicalRecord::new();
        for path in paths {
            if let Some(value) = self.fields.remove(&path) {
                if path == prefix {
                    // The whole subtree was a single leaf; re-flatten it.
                    for (p, v) in CanonicalRecord::flatten(&value).fields {
                        subtree.fields.insert(p, v);
                    }
                } else {
                    subtree
                        .fields
                        .insert(path[nested.len()..].to_string(), value);
                }
            }
        }
        Some(subtree)
    }
}

impl FromIterator<(String, Value)> for CanonicalRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, &path, inner),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

/// Value at a dotted path inside a JSON document. The empty path is the root.
#[must_use]
pub fn value_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.')
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// Write `value` at a dotted path, creating (or replacing non-object)
/// intermediate nodes. The empty path replaces the root.
pub fn set_at(root: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }
    let mut node = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Present, not null, not `""`, not an empty array or object.
#[must_use]
pub fn has_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

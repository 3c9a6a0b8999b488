//! JSON document helpers shared by the store backends.

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::StoreError;

use super::{Direction, FieldFilter, FieldUpdate, SortKey, StartBound};

/// A stored document: its id within the collection plus its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Document { id: id.into(), data }
    }

    pub fn field(&self, path: &str) -> Option<&Value> {
        get_path(&self.data, path)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// The numeric value of `path`, if it holds one.
    pub fn sort_value(&self, path: &str) -> Option<f64> {
        self.field(path).and_then(Value::as_f64)
    }
}

pub(crate) fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

/// Writes `new` at `path`, creating (or replacing non-object) intermediate nodes.
pub(crate) fn set_path(value: &mut Value, path: &str, new: Value) {
    let mut current = value;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), new);
            return;
        }
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Recursively merges `patch` into `base`: objects merge key by key, any
/// other value replaces what was there.
pub(crate) fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

pub(crate) fn apply_updates(data: &mut Value, updates: Vec<FieldUpdate>) -> Result<(), StoreError> {
    for update in updates {
        match update {
            FieldUpdate::Set { field, value } => set_path(data, &field, value),
            FieldUpdate::Increment {
                field,
                delta,
                floor,
            } => {
                let current = match get_path(data, &field) {
                    None | Some(Value::Null) => 0,
                    Some(value) => value
                        .as_i64()
                        .ok_or_else(|| StoreError::NotNumeric(field.clone()))?,
                };
                let mut next = current.saturating_add(delta);
                if let Some(floor) = floor {
                    next = next.max(floor);
                }
                set_path(data, &field, Value::from(next));
            }
        }
    }
    Ok(())
}

pub(crate) fn matches_filter(doc: &Document, filter: Option<&FieldFilter>) -> bool {
    match filter {
        Some(filter) => doc.field(&filter.field) == Some(&filter.equals),
        None => true,
    }
}

/// Total order used by ordered queries: sort value in `direction`, then
/// document id ascending.
pub(crate) fn compare(a: (f64, &str), b: (f64, &str), direction: Direction) -> Ordering {
    let by_value = match direction {
        Direction::Ascending => a.0.total_cmp(&b.0),
        Direction::Descending => b.0.total_cmp(&a.0),
    };
    by_value.then_with(|| a.1.cmp(b.1))
}

/// Whether a document with sort key `key` lies inside the range opened by `bound`.
pub(crate) fn within_bound(key: (f64, &str), bound: &StartBound, direction: Direction) -> bool {
    let (SortKey { value, id }, exclusive) = match bound {
        StartBound::At(key) => (key, false),
        StartBound::After(key) => (key, true),
    };
    let by_value = match direction {
        Direction::Ascending => key.0.total_cmp(value),
        Direction::Descending => value.total_cmp(&key.0),
    };
    let position = match id {
        Some(id) => by_value.then_with(|| key.1.cmp(id.as_str())),
        None => by_value,
    };
    match position {
        Ordering::Greater => true,
        Ordering::Equal => !exclusive,
        Ordering::Less => false,
    }
}

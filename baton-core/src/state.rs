/*!
Nested key-value state carried across restarts.

Keys are dotted paths: `"a.b.c"` addresses `store["a"]["b"]["c"]`. Empty
segments produced by leading, trailing or doubled dots are skipped. Nested
mappings are JSON objects, everything else is an opaque leaf value.
*/

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single level of the store.
pub type StateMap = Map<String, Value>;

/// Mapping from dotted paths to values, with arbitrarily deep nesting
///
/// Writing [`Value::Null`] to a path deletes the leaf instead of storing
/// null. Writing through an intermediate segment that holds a non-mapping
/// value replaces that value with an empty mapping first.
///
/// # Example
/// ```rust
/// use baton_core::StateStore;
/// use serde_json::json;
///
/// let mut store = StateStore::new();
/// store.set("job.cursor", json!(42));
/// assert_eq!(store.get("job.cursor"), Some(&json!(42)));
///
/// store.delete("job.cursor");
/// assert_eq!(store.value_or("job.cursor", json!(0)), json!(0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    values: StateMap,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing top-level mapping
    pub fn from_map(values: StateMap) -> Self {
        Self { values }
    }

    /// Look up the value at `path`
    ///
    /// Returns `None` if any segment is missing, if a non-terminal segment is
    /// not a nested mapping, or if the stored value is null.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = segments(path);
        let (leaf, parents) = segments.split_last()?;

        let mut map = &self.values;
        for segment in parents {
            map = map.get(*segment)?.as_object()?;
        }

        map.get(*leaf).filter(|value| !value.is_null())
    }

    /// Look up the value at `path`, falling back to `default` when absent
    pub fn value_or(&self, path: &str, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// Whether a non-null value exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Write `value` at `path`
    ///
    /// Returns `true` if the path named at least one segment and the write
    /// was applied, `false` if the path was empty.
    pub fn set(&mut self, path: &str, value: Value) -> bool {
        let segments = segments(path);
        if segments.is_empty() {
            return false;
        }

        if value.is_null() {
            remove(&mut self.values, &segments);
        } else {
            upsert(&mut self.values, &segments, value);
        }
        true
    }

    /// Apply every `(path, value)` pair in order
    ///
    /// Returns the number of writes that addressed a non-empty path.
    pub fn set_many<I, K>(&mut self, updates: I) -> usize
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut applied = 0;
        for (path, value) in updates {
            if self.set(path.as_ref(), value) {
                applied += 1;
            }
        }
        applied
    }

    /// Remove the leaf at `path`; equivalent to writing null
    ///
    /// Missing intermediate segments are left alone rather than created.
    pub fn delete(&mut self, path: &str) -> Option<Value> {
        remove(&mut self.values, &segments(path))
    }

    /// Whether the top level holds no keys
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Drop every key
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Borrow the top-level mapping
    pub fn as_map(&self) -> &StateMap {
        &self.values
    }

    /// Consume the store, returning the top-level mapping
    pub fn into_map(self) -> StateMap {
        self.values
    }
}

impl From<StateMap> for StateStore {
    fn from(values: StateMap) -> Self {
        Self::from_map(values)
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|segment| !segment.is_empty()).collect()
}

/// Insert `value` at `segments`, rebuilding non-mapping intermediates as empty mappings.
fn upsert(map: &mut StateMap, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(StateMap::new()));

            match slot {
                Value::Object(child) => upsert(child, rest, value),
                other => {
                    let mut child = StateMap::new();
                    upsert(&mut child, rest, value);
                    *other = Value::Object(child);
                }
            }
        }
    }
}

fn remove(map: &mut StateMap, segments: &[&str]) -> Option<Value> {
    match segments {
        [] => None,
        [leaf] => map.remove(*leaf),
        [head, rest @ ..] => match map.get_mut(*head) {
            Some(Value::Object(child)) => remove(child, rest),
            _ => None,
        },
    }
}

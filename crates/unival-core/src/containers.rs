//! Shared containers: Array, Object, and Dict
//!
//! Every container owns a `parking_lot` mutex guarding its entries, so
//! concurrent mutation through aliasing handles is safe without any global
//! lock. Handles stay cheap: copying a container `Value` copies the
//! reference, not the entries.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::{VarError, VarResult};
use crate::payload::Kind;
use crate::value::Value;

/// Growable sequence of values.
pub struct Array {
    items: Mutex<Vec<Value>>,
}

impl Array {
    pub fn new() -> Self {
        Array {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Array {
            items: Mutex::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Element at `index`, or Undefined when out of range.
    pub fn get(&self, index: usize) -> Value {
        self.items
            .lock()
            .get(index)
            .cloned()
            .unwrap_or_else(Value::undefined)
    }

    pub fn set(&self, index: usize, value: Value) -> VarResult<()> {
        let mut items = self.items.lock();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VarError::custom(format!(
                "array index {index} out of range (len {})",
                items.len()
            ))),
        }
    }

    pub fn push(&self, value: Value) {
        self.items.lock().push(value);
    }

    pub fn insert(&self, index: usize, value: Value) -> VarResult<()> {
        let mut items = self.items.lock();
        if index > items.len() {
            return Err(VarError::custom(format!(
                "array index {index} out of range (len {})",
                items.len()
            )));
        }
        items.insert(index, value);
        Ok(())
    }

    /// Removes and returns the element at `index`, Undefined when absent.
    pub fn remove(&self, index: usize) -> Value {
        let mut items = self.items.lock();
        if index < items.len() {
            items.remove(index)
        } else {
            Value::undefined()
        }
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Copies out the current elements.
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.lock().clone()
    }

    /// New array holding `self` followed by `other`.
    pub fn concat(&self, other: &Array) -> Array {
        let mut items = self.snapshot();
        items.extend(other.snapshot());
        Array::from_vec(items)
    }

    /// New array holding `self` repeated `count` times.
    pub fn repeat(&self, count: usize) -> Array {
        let base = self.snapshot();
        let mut items = Vec::with_capacity(base.len() * count);
        for _ in 0..count {
            items.extend(base.iter().cloned());
        }
        Array::from_vec(items)
    }
}

impl Default for Array {
    fn default() -> Self {
        Array::new()
    }
}

impl Clone for Array {
    fn clone(&self) -> Self {
        Array::from_vec(self.snapshot())
    }
}

/// String-keyed map of values, with an optional class override used by
/// synthesized instances.
pub struct Object {
    entries: Mutex<FxHashMap<String, Value>>,
    class: RwLock<Option<Value>>,
}

impl Object {
    pub fn new() -> Self {
        Object {
            entries: Mutex::new(FxHashMap::default()),
            class: RwLock::new(None),
        }
    }

    pub fn from_map(entries: FxHashMap<String, Value>) -> Self {
        Object {
            entries: Mutex::new(entries),
            class: RwLock::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entry for `key`, or Undefined when absent.
    pub fn get(&self, key: &str) -> Value {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(Value::undefined)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.lock().insert(key.into(), value);
    }

    /// Removes and returns the entry for `key`, Undefined when absent.
    pub fn remove(&self, key: &str) -> Value {
        self.entries
            .lock()
            .remove(key)
            .unwrap_or_else(Value::undefined)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copies entries of `other` into `self`, keeping existing keys.
    pub fn merge(&self, other: &Object) {
        let incoming = other.snapshot();
        let mut entries = self.entries.lock();
        for (k, v) in incoming {
            entries.entry(k).or_insert(v);
        }
    }

    /// Class override for synthesized instances, if one was installed.
    pub fn class_override(&self) -> Option<Value> {
        self.class.read().clone()
    }

    pub fn set_class(&self, class: Value) {
        *self.class.write() = Some(class);
    }

    /// Looks `path` up, inserting `default` at the final segment on a miss.
    ///
    /// With `parse_dot`, `path` is split on `.` and intermediate Objects are
    /// created for missing segments. An existing non-Object intermediate is
    /// an error rather than silently replaced.
    pub fn get_or(&self, path: &str, default: Value, parse_dot: bool) -> VarResult<Value> {
        if parse_dot {
            if let Some((head, rest)) = path.split_once('.') {
                let child = self.vivify_child(head)?;
                return match child.as_object() {
                    Some(obj) => obj.get_or(rest, default, true),
                    None => Err(VarError::ContainerType {
                        op: format!("get {path:?}"),
                        found: child.kind().name().to_string(),
                    }),
                };
            }
        }
        let mut entries = self.entries.lock();
        Ok(entries.entry(path.to_string()).or_insert(default).clone())
    }

    /// Stores `value` at `path`, creating intermediate Objects when
    /// `parse_dot` is set.
    pub fn set_path(&self, path: &str, value: Value, parse_dot: bool) -> VarResult<()> {
        if parse_dot {
            if let Some((head, rest)) = path.split_once('.') {
                let child = self.vivify_child(head)?;
                return match child.as_object() {
                    Some(obj) => obj.set_path(rest, value, true),
                    None => Err(VarError::ContainerType {
                        op: format!("set {path:?}"),
                        found: child.kind().name().to_string(),
                    }),
                };
            }
        }
        self.set(path, value);
        Ok(())
    }

    fn vivify_child(&self, key: &str) -> VarResult<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(v) if !v.is_undefined() => Ok(v.clone()),
            _ => {
                let child = Value::object_empty();
                entries.insert(key.to_string(), child.clone());
                Ok(child)
            }
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::new()
    }
}

impl Clone for Object {
    fn clone(&self) -> Self {
        Object {
            entries: Mutex::new(self.entries.lock().clone()),
            class: RwLock::new(self.class.read().clone()),
        }
    }
}

/// Map keyed by arbitrary values.
pub struct Dict {
    entries: Mutex<BTreeMap<DictKey, Value>>,
}

impl Dict {
    pub fn new() -> Self {
        Dict {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entry for `key`, or Undefined when absent.
    pub fn get(&self, key: &Value) -> Value {
        self.entries
            .lock()
            .get(&DictKey(key.clone()))
            .cloned()
            .unwrap_or_else(Value::undefined)
    }

    pub fn set(&self, key: Value, value: Value) {
        self.entries.lock().insert(DictKey(key), value);
    }

    pub fn remove(&self, key: &Value) -> Value {
        self.entries
            .lock()
            .remove(&DictKey(key.clone()))
            .unwrap_or_else(Value::undefined)
    }

    pub fn snapshot(&self) -> Vec<(Value, Value)> {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect()
    }
}

impl Default for Dict {
    fn default() -> Self {
        Dict::new()
    }
}

impl Clone for Dict {
    fn clone(&self) -> Self {
        Dict {
            entries: Mutex::new(self.entries.lock().clone()),
        }
    }
}

/// Dict key wrapper imposing a total order over values.
///
/// Values of different kinds order by kind rank; primitives of the same kind
/// compare by content; everything else falls back to payload address, which
/// is stable for the lifetime of the payload.
#[derive(Clone)]
pub struct DictKey(pub Value);

impl DictKey {
    fn rank(&self) -> u8 {
        self.0.kind() as u8
    }
}

impl PartialEq for DictKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DictKey {}

impl PartialOrd for DictKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DictKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match self.0.kind() {
            Kind::Undefined | Kind::Null => Ordering::Equal,
            Kind::Boolean => self.0.as_bool().cmp(&other.0.as_bool()),
            Kind::Integer => self.0.as_int().cmp(&other.0.as_int()),
            Kind::Float => match (self.0.as_float(), other.0.as_float()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            },
            Kind::String => {
                let a = self.0.as_str().map(|s| s.to_string());
                let b = other.0.as_str().map(|s| s.to_string());
                a.cmp(&b)
            }
            _ => self.0.payload_addr().cmp(&other.0.payload_addr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_out_of_range_is_undefined() {
        let a = Array::from_vec(vec![Value::from(1i64)]);
        assert!(a.get(5).is_undefined());
        assert!(a.set(5, Value::from(2i64)).is_err());
    }

    #[test]
    fn array_concat_and_repeat() {
        let a = Array::from_vec(vec![Value::from(1i64), Value::from(2i64)]);
        let b = Array::from_vec(vec![Value::from(3i64)]);
        assert_eq!(a.concat(&b).len(), 3);
        assert_eq!(a.repeat(3).len(), 6);
        assert_eq!(a.repeat(0).len(), 0);
    }

    #[test]
    fn object_merge_keeps_existing() {
        let a = Object::new();
        a.set("x", Value::from(1i64));
        let b = Object::new();
        b.set("x", Value::from(9i64));
        b.set("y", Value::from(2i64));
        a.merge(&b);
        assert_eq!(a.get("x").as_int(), Some(1));
        assert_eq!(a.get("y").as_int(), Some(2));
    }

    #[test]
    fn object_dotted_paths() {
        let o = Object::new();
        o.set_path("a.b.c", Value::from(5i64), true).unwrap();
        let got = o.get_or("a.b.c", Value::undefined(), true).unwrap();
        assert_eq!(got.as_int(), Some(5));

        // Miss inserts the default at the final segment.
        let d = o.get_or("a.b.d", Value::from(7i64), true).unwrap();
        assert_eq!(d.as_int(), Some(7));
        assert_eq!(
            o.get_or("a.b.d", Value::undefined(), true).unwrap().as_int(),
            Some(7)
        );

        // Without parse_dot the whole path is one key.
        let o2 = Object::new();
        o2.set_path("a.b", Value::from(1i64), false).unwrap();
        assert_eq!(o2.get("a.b").as_int(), Some(1));
        assert!(o2.get("a").is_undefined());
    }

    #[test]
    fn dotted_path_through_non_object_fails() {
        let o = Object::new();
        o.set("a", Value::from(1i64));
        assert!(o.set_path("a.b", Value::from(2i64), true).is_err());
    }

    #[test]
    fn dict_orders_mixed_keys() {
        let d = Dict::new();
        d.set(Value::from("k"), Value::from(1i64));
        d.set(Value::from(2i64), Value::from(2i64));
        d.set(Value::from(true), Value::from(3i64));
        assert_eq!(d.len(), 3);
        assert_eq!(d.get(&Value::from(2i64)).as_int(), Some(2));
        assert_eq!(d.get(&Value::from("k")).as_int(), Some(1));
        // Kind rank puts bool before int before str.
        let keys: Vec<Kind> = d.snapshot().iter().map(|(k, _)| k.kind()).collect();
        assert_eq!(keys, vec![Kind::Boolean, Kind::Integer, Kind::String]);
    }

    #[test]
    fn dict_identity_keys() {
        let d = Dict::new();
        let k1 = Value::array(vec![]);
        let k2 = Value::array(vec![]);
        d.set(k1.clone(), Value::from(1i64));
        d.set(k2.clone(), Value::from(2i64));
        assert_eq!(d.len(), 2);
        assert_eq!(d.get(&k1).as_int(), Some(1));
        assert_eq!(d.get(&k2).as_int(), Some(2));
    }
}

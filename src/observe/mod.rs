// ============================================================================
// trellis-reactive - Observation Layer
// Uniform read/write/has/delete/enumerate interface over raws and views
// ============================================================================
//
// Every data-access method lives on `Value` and dispatches on the handle
// form: views go through the intercepting handlers (tracking reads, notifying
// writes), raw objects get the plain operation with no reactive side effects.
// Mutating a raw object never notifies; that is the escape hatch, not a bug.
// ============================================================================

pub mod base;
pub mod collection;
pub mod reference;
pub mod view;

use crate::core::value::{same_value, Key, ObjRef, RawData, Value};
use view::View;

// =============================================================================
// DISPATCH HELPERS
// =============================================================================

enum Target<'a> {
    Base(&'a View),
    Collection(&'a View),
    Raw(&'a ObjRef),
    Other,
}

fn classify(value: &Value) -> Target<'_> {
    match value {
        Value::View(v) => {
            if v.raw().is_map() || v.raw().is_set() {
                Target::Collection(v)
            } else {
                Target::Base(v)
            }
        }
        Value::Obj(raw) => Target::Raw(raw),
        _ => Target::Other,
    }
}

fn list_view(value: &Value) -> Option<&View> {
    match value {
        Value::View(v) if v.raw().is_list() => Some(v),
        _ => None,
    }
}

// =============================================================================
// VALUE DATA ACCESS
// =============================================================================

impl Value {
    /// Read a field/element/entry.
    ///
    /// Through a view this records a GET dependency edge (readonly views read
    /// without tracking), unwraps ref-like boxes (not at list integer
    /// indices), and wraps structured results lazily. On a raw object it is a
    /// plain lookup. Missing keys and non-structured receivers yield null.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        match classify(self) {
            Target::Base(v) => base::get(v, &key),
            Target::Collection(v) => collection::get(v, &key),
            Target::Raw(raw) => plain::get(raw, &key),
            Target::Other => Value::Null,
        }
    }

    /// Write a field/element/entry, returning whether the write was applied.
    ///
    /// Through a view this notifies subscribers (ADD for new keys, SET when
    /// the value changed). Readonly views reject with a diagnostic. On a raw
    /// object it mutates silently.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into();
        match classify(self) {
            Target::Base(v) => base::set(v, key, value),
            Target::Collection(v) => collection::set(v, key, value),
            Target::Raw(raw) => plain::set(raw, key, value),
            Target::Other => false,
        }
    }

    /// Containment check; records a HAS edge through views of every mode.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        match classify(self) {
            Target::Base(v) => base::has(v, &key),
            Target::Collection(v) => collection::has(v, &key),
            Target::Raw(raw) => plain::has(raw, &key),
            Target::Other => false,
        }
    }

    /// Remove a key, returning whether it existed.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        match classify(self) {
            Target::Base(v) => base::delete(v, &key),
            Target::Collection(v) => collection::delete(v, &key),
            Target::Raw(raw) => plain::delete(raw, &key),
            Target::Other => false,
        }
    }

    /// Enumerate keys; records an ITERATE edge (map views subscribe key-only,
    /// list views subscribe to the length).
    pub fn keys(&self) -> Vec<Key> {
        match classify(self) {
            Target::Base(v) => base::keys(v),
            Target::Collection(v) => collection::keys(v),
            Target::Raw(raw) => plain::keys(raw),
            Target::Other => Vec::new(),
        }
    }

    /// Element/field/entry count.
    pub fn len(&self) -> usize {
        match classify(self) {
            Target::Base(v) => base::len(v),
            Target::Collection(v) => collection::size(v),
            Target::Raw(raw) => plain::len(raw),
            Target::Other => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // LISTS
    // =========================================================================

    /// Append to a list.
    pub fn push(&self, value: impl Into<Value>) {
        match list_view(self) {
            Some(v) => base::push(v, value.into()),
            None => {
                let _ = plain::list_edit(self, |items| items.push(value.into()));
            }
        }
    }

    /// Remove and return the last element (null when empty).
    pub fn pop(&self) -> Value {
        match list_view(self) {
            Some(v) => base::pop(v),
            None => plain::list_edit(self, |items| items.pop().unwrap_or(Value::Null))
                .unwrap_or(Value::Null),
        }
    }

    /// Remove and return the first element (null when empty).
    pub fn shift(&self) -> Value {
        match list_view(self) {
            Some(v) => base::shift(v),
            None => plain::list_edit(self, |items| {
                if items.is_empty() {
                    Value::Null
                } else {
                    items.remove(0)
                }
            })
            .unwrap_or(Value::Null),
        }
    }

    /// Prepend to a list.
    pub fn unshift(&self, value: impl Into<Value>) {
        match list_view(self) {
            Some(v) => base::unshift(v, value.into()),
            None => {
                let _ = plain::list_edit(self, |items| items.insert(0, value.into()));
            }
        }
    }

    /// Insert at a position (clamped to the length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        match list_view(self) {
            Some(v) => base::insert(v, index, value.into()),
            None => {
                let _ = plain::list_edit(self, |items| {
                    let at = index.min(items.len());
                    items.insert(at, value.into());
                });
            }
        }
    }

    /// Remove at a position, compacting the list.
    pub fn remove(&self, index: usize) -> Value {
        match list_view(self) {
            Some(v) => base::remove(v, index),
            None => plain::list_edit(self, |items| {
                if index < items.len() {
                    items.remove(index)
                } else {
                    Value::Null
                }
            })
            .unwrap_or(Value::Null),
        }
    }

    /// Replace a range, returning the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        match list_view(self) {
            Some(v) => base::splice(v, start, delete_count, items),
            None => plain::list_edit(self, |data| {
                let start = start.min(data.len());
                let end = (start + delete_count).min(data.len());
                data.splice(start..end, items).collect()
            })
            .unwrap_or_default(),
        }
    }

    /// Write the list length directly: truncates or null-fills.
    pub fn set_len(&self, len: usize) -> bool {
        match list_view(self) {
            Some(v) => base::set_len(v, len),
            None => plain::list_edit(self, |items| items.resize(len, Value::Null)).is_some(),
        }
    }

    /// Identity-sensitive membership search over a list.
    ///
    /// Subscribes to every index plus the length, and falls back to the raw
    /// form of the needle so a reactive element is found by either identity.
    pub fn contains(&self, needle: &Value) -> bool {
        match list_view(self) {
            Some(v) => base::contains_value(v, needle),
            None => plain::index_of(self, needle).is_some(),
        }
    }

    /// Identity-sensitive position search over a list.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        match list_view(self) {
            Some(v) => base::index_of(v, needle),
            None => plain::index_of(self, needle),
        }
    }

    /// Identity-sensitive position search from the end.
    pub fn last_index_of(&self, needle: &Value) -> Option<usize> {
        match list_view(self) {
            Some(v) => base::last_index_of(v, needle),
            None => plain::last_index_of(self, needle),
        }
    }

    // =========================================================================
    // COLLECTIONS
    // =========================================================================

    /// Insert into a set, returning whether the item was new.
    pub fn add(&self, item: impl Into<Value>) -> bool {
        let item = item.into();
        let Some(key) = collection::key_for(&item) else {
            return false;
        };
        match classify(self) {
            Target::Collection(v) => collection::add(v, key),
            Target::Raw(raw) => plain::add(raw, key),
            _ => false,
        }
    }

    /// Empty a map or set.
    pub fn clear(&self) {
        match classify(self) {
            Target::Collection(v) => collection::clear(v),
            Target::Raw(raw) => plain::clear(raw),
            _ => {}
        }
    }

    /// Enumerate map entries (or set items paired with null) in insertion
    /// order.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        match classify(self) {
            Target::Collection(v) => {
                if v.raw().is_set() {
                    collection::keys(v).into_iter().map(|k| (k, Value::Null)).collect()
                } else {
                    collection::entries(v)
                }
            }
            Target::Raw(raw) => plain::entries(raw),
            _ => Vec::new(),
        }
    }

    /// Enumerate map values in insertion order.
    pub fn values(&self) -> Vec<Value> {
        match classify(self) {
            Target::Collection(v) => collection::values(v),
            Target::Raw(raw) => plain::values(raw),
            _ => Vec::new(),
        }
    }

    /// Visit each entry; subscribes iteration readers like `entries`.
    pub fn for_each(&self, mut f: impl FnMut(&Key, &Value)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }
}

// =============================================================================
// PLAIN (UNTRACKED) OPERATIONS ON RAW OBJECTS
// =============================================================================

mod plain {
    use super::*;

    pub(super) fn get(raw: &ObjRef, key: &Key) -> Value {
        match (&*raw.data.borrow(), key) {
            (RawData::Record(fields), Key::Prop(name)) => {
                fields.get(name).cloned().unwrap_or(Value::Null)
            }
            (RawData::List(items), Key::Index(i)) => {
                items.get(*i).cloned().unwrap_or(Value::Null)
            }
            (RawData::List(items), Key::Length) => Value::Int(items.len() as i64),
            (RawData::Map(entries), k) => entries.get(k).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub(super) fn set(raw: &ObjRef, key: Key, value: Value) -> bool {
        let mut data = raw.data.borrow_mut();
        match (&mut *data, key) {
            (RawData::Record(fields), Key::Prop(name)) => {
                fields.insert(name, value);
                true
            }
            (RawData::List(items), Key::Index(i)) => {
                if i >= items.len() {
                    items.resize(i, Value::Null);
                    items.push(value);
                } else {
                    items[i] = value;
                }
                true
            }
            (RawData::List(items), Key::Length) => match value.as_i64() {
                Some(len) if len >= 0 => {
                    items.resize(len as usize, Value::Null);
                    true
                }
                _ => false,
            },
            (RawData::Map(entries), k) => {
                entries.insert(k, value);
                true
            }
            _ => false,
        }
    }

    pub(super) fn has(raw: &ObjRef, key: &Key) -> bool {
        match (&*raw.data.borrow(), key) {
            (RawData::Record(fields), Key::Prop(name)) => fields.contains_key(name),
            (RawData::List(items), Key::Index(i)) => *i < items.len(),
            (RawData::List(_), Key::Length) => true,
            (RawData::Map(entries), k) => entries.contains_key(k),
            (RawData::Set(items), k) => items.contains(k),
            _ => false,
        }
    }

    pub(super) fn delete(raw: &ObjRef, key: &Key) -> bool {
        let mut data = raw.data.borrow_mut();
        match (&mut *data, key) {
            (RawData::Record(fields), Key::Prop(name)) => fields.shift_remove(name).is_some(),
            (RawData::List(items), Key::Index(i)) => {
                if *i < items.len() {
                    items[*i] = Value::Null;
                    true
                } else {
                    false
                }
            }
            (RawData::Map(entries), k) => entries.shift_remove(k).is_some(),
            (RawData::Set(items), k) => items.shift_remove(k),
            _ => false,
        }
    }

    pub(super) fn keys(raw: &ObjRef) -> Vec<Key> {
        match &*raw.data.borrow() {
            RawData::Record(fields) => fields.keys().map(|k| Key::Prop(k.clone())).collect(),
            RawData::List(items) => (0..items.len()).map(Key::Index).collect(),
            RawData::Map(entries) => entries.keys().cloned().collect(),
            RawData::Set(items) => items.iter().cloned().collect(),
        }
    }

    pub(super) fn len(raw: &ObjRef) -> usize {
        match &*raw.data.borrow() {
            RawData::Record(fields) => fields.len(),
            RawData::List(items) => items.len(),
            RawData::Map(entries) => entries.len(),
            RawData::Set(items) => items.len(),
        }
    }

    pub(super) fn list_edit<R>(value: &Value, edit: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        let raw = value.underlying_raw()?;
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::List(items) => Some(edit(items)),
            _ => None,
        }
    }

    pub(super) fn index_of(value: &Value, needle: &Value) -> Option<usize> {
        let raw = value.underlying_raw()?;
        let data = raw.data.borrow();
        match &*data {
            RawData::List(items) => items.iter().position(|item| same_value(item, needle)),
            _ => None,
        }
    }

    pub(super) fn last_index_of(value: &Value, needle: &Value) -> Option<usize> {
        let raw = value.underlying_raw()?;
        let data = raw.data.borrow();
        match &*data {
            RawData::List(items) => items.iter().rposition(|item| same_value(item, needle)),
            _ => None,
        }
    }

    pub(super) fn add(raw: &ObjRef, key: Key) -> bool {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::Set(items) => items.insert(key),
            _ => false,
        }
    }

    pub(super) fn clear(raw: &ObjRef) {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::Map(entries) => entries.clear(),
            RawData::Set(items) => items.clear(),
            _ => {}
        }
    }

    pub(super) fn entries(raw: &ObjRef) -> Vec<(Key, Value)> {
        match &*raw.data.borrow() {
            RawData::Map(entries) => {
                entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            RawData::Set(items) => items.iter().map(|k| (k.clone(), Value::Null)).collect(),
            _ => Vec::new(),
        }
    }

    pub(super) fn values(raw: &ObjRef) -> Vec<Value> {
        match &*raw.data.borrow() {
            RawData::Map(entries) => entries.values().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

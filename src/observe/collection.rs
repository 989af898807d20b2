// ============================================================================
// trellis-reactive - Collection Handlers
// Read/write interception for map-like and set-like objects
// ============================================================================
//
// Collections differ from records in two ways: keys are values (normalized to
// raw identity), and iteration-shaped reads have their own sentinels. Value
// changes on an existing map key notify iteration readers as well, so
// size/entries consumers re-run even though the key set is unchanged.
// ============================================================================

use crate::core::constants::{OpKind, TriggerKind};
use crate::core::value::{has_changed, Key, RawData, Value};
use crate::observe::view::{is_readonly, is_shallow, to_raw, wrap, View, ViewMode};
use crate::reactivity::tracking::{track, trigger};

// =============================================================================
// HELPERS
// =============================================================================

fn to_key(value: &Value) -> Option<Key> {
    match Key::try_from(value) {
        Ok(key) => Some(key),
        Err(err) => {
            tracing::warn!(%err, "collection access ignored");
            None
        }
    }
}

fn coerce_incoming(mode: ViewMode, value: Value) -> Value {
    if !mode.is_shallow() && !(is_readonly(&value) || is_shallow(&value)) {
        to_raw(&value)
    } else {
        value
    }
}

/// Wrap a fetched entry value for the reader's mode. Collection reads do not
/// unwrap refs.
fn wrap_entry(mode: ViewMode, value: Value) -> Value {
    if mode.is_shallow() {
        return value;
    }
    if matches!(value, Value::Obj(_)) {
        let nested = if mode.is_readonly() {
            ViewMode::Readonly
        } else {
            ViewMode::Reactive
        };
        return wrap(value, nested);
    }
    value
}

// =============================================================================
// READ
// =============================================================================

/// Map entry read.
pub(crate) fn get(view: &View, key: &Key) -> Value {
    let raw = view.raw();
    if !view.mode().is_readonly() {
        track(raw.id(), OpKind::Get, key.clone());
    }

    let found = match &*raw.data.borrow() {
        RawData::Map(entries) => entries.get(key).cloned(),
        _ => None,
    };

    match found {
        Some(value) => wrap_entry(view.mode(), value),
        None => Value::Null,
    }
}

/// Map/set containment check; records a HAS edge on every mode.
pub(crate) fn has(view: &View, key: &Key) -> bool {
    let raw = view.raw();
    track(raw.id(), OpKind::Has, key.clone());

    match &*raw.data.borrow() {
        RawData::Map(entries) => entries.contains_key(key),
        RawData::Set(items) => items.contains(key),
        _ => false,
    }
}

/// Entry count; size readers subscribe to the iteration sentinel.
pub(crate) fn size(view: &View) -> usize {
    let raw = view.raw();
    track(raw.id(), OpKind::Iterate, Key::Iterate);

    match &*raw.data.borrow() {
        RawData::Map(entries) => entries.len(),
        RawData::Set(items) => items.len(),
        _ => 0,
    }
}

/// Key enumeration. Map keys() subscribes to the key-only sentinel: value
/// changes on existing keys do not disturb it.
pub(crate) fn keys(view: &View) -> Vec<Key> {
    let raw = view.raw();
    let sentinel = if raw.is_map() {
        Key::MapKeyIterate
    } else {
        Key::Iterate
    };
    track(raw.id(), OpKind::Iterate, sentinel);

    match &*raw.data.borrow() {
        RawData::Map(entries) => entries.keys().cloned().collect(),
        RawData::Set(items) => items.iter().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Map entry enumeration in insertion order.
pub(crate) fn entries(view: &View) -> Vec<(Key, Value)> {
    let raw = view.raw();
    track(raw.id(), OpKind::Iterate, Key::Iterate);

    let snapshot: Vec<(Key, Value)> = match &*raw.data.borrow() {
        RawData::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => Vec::new(),
    };
    snapshot
        .into_iter()
        .map(|(k, v)| (k, wrap_entry(view.mode(), v)))
        .collect()
}

/// Map value enumeration in insertion order.
pub(crate) fn values(view: &View) -> Vec<Value> {
    let raw = view.raw();
    track(raw.id(), OpKind::Iterate, Key::Iterate);

    let snapshot: Vec<Value> = match &*raw.data.borrow() {
        RawData::Map(map) => map.values().cloned().collect(),
        _ => Vec::new(),
    };
    snapshot
        .into_iter()
        .map(|v| wrap_entry(view.mode(), v))
        .collect()
}

// =============================================================================
// WRITE
// =============================================================================

/// Map entry write with ADD/SET notification.
pub(crate) fn set(view: &View, key: Key, value: Value) -> bool {
    if view.mode().is_readonly() {
        tracing::warn!(?key, "set ignored: collection is readonly");
        return false;
    }

    let raw = view.raw();
    let value = coerce_incoming(view.mode(), value);

    let (had, old) = {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::Map(entries) => {
                let old = entries.insert(key.clone(), value.clone());
                (old.is_some(), old)
            }
            _ => {
                tracing::warn!("set ignored: target is not a map");
                return false;
            }
        }
    };

    if !had {
        trigger(raw, TriggerKind::Add, Some(key), Some(&value), None);
    } else if has_changed(old.as_ref().unwrap_or(&Value::Null), &value) {
        trigger(raw, TriggerKind::Set, Some(key), Some(&value), old.as_ref());
    }
    true
}

/// Set membership insert.
pub(crate) fn add(view: &View, key: Key) -> bool {
    if view.mode().is_readonly() {
        tracing::warn!(?key, "add ignored: collection is readonly");
        return false;
    }

    let raw = view.raw();
    let inserted = {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::Set(items) => items.insert(key.clone()),
            _ => {
                tracing::warn!("add ignored: target is not a set");
                return false;
            }
        }
    };

    if inserted {
        trigger(raw, TriggerKind::Add, Some(key), None, None);
    }
    inserted
}

/// Map/set entry removal.
pub(crate) fn delete(view: &View, key: &Key) -> bool {
    if view.mode().is_readonly() {
        tracing::warn!(?key, "delete ignored: collection is readonly");
        return false;
    }

    let raw = view.raw();
    let removed: Option<Value> = {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::Map(entries) => entries.shift_remove(key),
            RawData::Set(items) => items.shift_remove(key).then_some(Value::Null),
            _ => None,
        }
    };

    match removed {
        Some(old) => {
            trigger(raw, TriggerKind::Delete, Some(key.clone()), None, Some(&old));
            true
        }
        None => false,
    }
}

/// Empty the collection; notifies every subscriber, only when something was
/// actually removed.
pub(crate) fn clear(view: &View) {
    if view.mode().is_readonly() {
        tracing::warn!("clear ignored: collection is readonly");
        return;
    }

    let raw = view.raw();
    let had_items = {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::Map(entries) => {
                let had = !entries.is_empty();
                entries.clear();
                had
            }
            RawData::Set(items) => {
                let had = !items.is_empty();
                items.clear();
                had
            }
            _ => false,
        }
    };

    if had_items {
        trigger(raw, TriggerKind::Clear, None, None, None);
    }
}

// =============================================================================
// KEY NORMALIZATION (exposed to the dispatch layer)
// =============================================================================

/// Normalize an arbitrary value into a collection key, warning on
/// non-keyable values.
pub(crate) fn key_for(value: &Value) -> Option<Key> {
    to_key(value)
}

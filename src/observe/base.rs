// ============================================================================
// trellis-reactive - Base Handlers
// Read/write/has/delete/enumerate interception for records and lists
// ============================================================================
//
// Borrow discipline: every handler finishes its RefCell access to the raw
// data before calling `trigger`, because triggered effects synchronously
// re-enter the same object.
// ============================================================================

use crate::core::constants::{OpKind, TriggerKind};
use crate::core::context::{pause_tracking, reset_tracking};
use crate::core::value::{has_changed, same_value, Key, ObjRef, RawData, Value};
use crate::observe::view::{is_readonly, is_shallow, to_raw, wrap, View, ViewMode};
use crate::reactivity::tracking::{track, trigger};

// =============================================================================
// HELPERS
// =============================================================================

/// Reduce an incoming value to its raw form on deep views.
///
/// Readonly and shallow views keep their wrapped identity when stored.
fn coerce_incoming(mode: ViewMode, value: Value) -> Value {
    if !mode.is_shallow() && !(is_readonly(&value) || is_shallow(&value)) {
        to_raw(&value)
    } else {
        value
    }
}

/// Wrap a fetched structured value for the reader's mode.
fn wrap_nested(mode: ViewMode, value: Value) -> Value {
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

fn list_snapshot(raw: &ObjRef) -> Vec<Value> {
    match &*raw.data.borrow() {
        RawData::List(items) => items.clone(),
        _ => Vec::new(),
    }
}

/// Emit the ADD/SET/DELETE/length events a structural list edit produced,
/// by diffing against the pre-edit snapshot.
fn emit_list_diff(raw: &ObjRef, old_items: &[Value]) {
    let new_items = list_snapshot(raw);
    let old_len = old_items.len();
    let new_len = new_items.len();

    for i in 0..new_len.min(old_len) {
        if has_changed(&old_items[i], &new_items[i]) {
            trigger(
                raw,
                TriggerKind::Set,
                Some(Key::Index(i)),
                Some(&new_items[i]),
                Some(&old_items[i]),
            );
        }
    }
    if new_len > old_len {
        // New slots; each ADD also reaches the length set
        for (i, item) in new_items.iter().enumerate().take(new_len).skip(old_len) {
            trigger(raw, TriggerKind::Add, Some(Key::Index(i)), Some(item), None);
        }
    } else if new_len < old_len {
        for (i, item) in old_items.iter().enumerate().take(old_len).skip(new_len) {
            trigger(raw, TriggerKind::Delete, Some(Key::Index(i)), None, Some(item));
        }
        trigger(
            raw,
            TriggerKind::Set,
            Some(Key::Length),
            Some(&Value::Int(new_len as i64)),
            Some(&Value::Int(old_len as i64)),
        );
    }
}

// =============================================================================
// READ
// =============================================================================

/// Tracked property/element read.
pub(crate) fn get(view: &View, key: &Key) -> Value {
    let raw = view.raw();
    let mode = view.mode();

    if !mode.is_readonly() {
        track(raw.id(), OpKind::Get, key.clone());
    }

    let found: Option<Value> = match &*raw.data.borrow() {
        RawData::Record(fields) => match key {
            Key::Prop(name) => fields.get(name).cloned(),
            _ => None,
        },
        RawData::List(items) => match key {
            Key::Index(i) => items.get(*i).cloned(),
            Key::Length => Some(Value::Int(items.len() as i64)),
            _ => None,
        },
        _ => None,
    };

    let Some(value) = found else {
        return Value::Null;
    };

    // Refs unwrap on deep views, but never at list integer indices
    if let Value::Ref(r) = &value {
        let integer_slot = raw.is_list() && matches!(key, Key::Index(_));
        if !mode.is_shallow() && !integer_slot {
            return r.get();
        }
    }

    wrap_nested(mode, value)
}

// =============================================================================
// WRITE
// =============================================================================

/// Property/element write with ADD/SET notification.
pub(crate) fn set(view: &View, key: Key, value: Value) -> bool {
    let mode = view.mode();
    if mode.is_readonly() {
        tracing::warn!(?key, "set ignored: target is readonly");
        return false;
    }

    let raw = view.raw();
    let is_list = raw.is_list();

    if is_list && key == Key::Length {
        return match value.as_i64() {
            Some(len) if len >= 0 => set_len(view, len as usize),
            _ => {
                tracing::warn!("set ignored: list length must be a non-negative integer");
                false
            }
        };
    }

    let mut old: Option<Value> = match (&*raw.data.borrow(), &key) {
        (RawData::Record(fields), Key::Prop(name)) => fields.get(name).cloned(),
        (RawData::List(items), Key::Index(i)) => items.get(*i).cloned(),
        _ => {
            tracing::warn!(?key, "set ignored: key does not address this object");
            return false;
        }
    };

    // A readonly ref cannot be displaced by a plain value
    if let Some(Value::Ref(prior)) = &old {
        if prior.is_readonly() && !matches!(value, Value::Ref(_)) {
            tracing::warn!(?key, "set ignored: slot holds a readonly ref");
            return false;
        }
    }

    let mut value = value;
    if !mode.is_shallow() {
        if !(is_readonly(&value) || is_shallow(&value)) {
            value = to_raw(&value);
            old = old.map(|v| to_raw(&v));
        }
        // Ref passthrough: assignment lands in the ref's slot, which notifies
        // the ref's own subscribers
        if !is_list {
            if let Some(Value::Ref(prior)) = &old {
                if !matches!(value, Value::Ref(_)) {
                    return prior.set(value);
                }
            }
        }
    }

    let had = {
        let mut data = raw.data.borrow_mut();
        match (&mut *data, &key) {
            (RawData::Record(fields), Key::Prop(name)) => {
                fields.insert(name.clone(), value.clone()).is_some()
            }
            (RawData::List(items), Key::Index(i)) => {
                if *i < items.len() {
                    items[*i] = value.clone();
                    true
                } else {
                    // Writing past the end grows the list, holes become null
                    while items.len() < *i {
                        items.push(Value::Null);
                    }
                    items.push(value.clone());
                    false
                }
            }
            _ => unreachable!("key shape checked above"),
        }
    };
    // Data borrow released before notifying

    if !had {
        trigger(raw, TriggerKind::Add, Some(key), Some(&value), None);
    } else if has_changed(old.as_ref().unwrap_or(&Value::Null), &value) {
        trigger(raw, TriggerKind::Set, Some(key), Some(&value), old.as_ref());
    }
    true
}

// =============================================================================
// DELETE
// =============================================================================

/// Remove a key, notifying with the removed value when it existed.
///
/// List deletes leave a null hole without moving later elements or changing
/// the length; use `remove`/`splice` for compacting removal.
pub(crate) fn delete(view: &View, key: &Key) -> bool {
    if view.mode().is_readonly() {
        tracing::warn!(?key, "delete ignored: target is readonly");
        return false;
    }

    let raw = view.raw();
    let removed: Option<Value> = {
        let mut data = raw.data.borrow_mut();
        match (&mut *data, key) {
            (RawData::Record(fields), Key::Prop(name)) => fields.shift_remove(name),
            (RawData::List(items), Key::Index(i)) => {
                if *i < items.len() {
                    Some(std::mem::replace(&mut items[*i], Value::Null))
                } else {
                    None
                }
            }
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

// =============================================================================
// HAS / ENUMERATE
// =============================================================================

/// Containment check; records a HAS edge on every mode.
pub(crate) fn has(view: &View, key: &Key) -> bool {
    let raw = view.raw();
    track(raw.id(), OpKind::Has, key.clone());

    match (&*raw.data.borrow(), key) {
        (RawData::Record(fields), Key::Prop(name)) => fields.contains_key(name),
        (RawData::List(items), Key::Index(i)) => *i < items.len(),
        (RawData::List(_), Key::Length) => true,
        _ => false,
    }
}

/// Key enumeration; records an ITERATE edge (on the length key for lists).
pub(crate) fn keys(view: &View) -> Vec<Key> {
    let raw = view.raw();
    let sentinel = if raw.is_list() { Key::Length } else { Key::Iterate };
    track(raw.id(), OpKind::Iterate, sentinel);

    match &*raw.data.borrow() {
        RawData::Record(fields) => fields.keys().map(|k| Key::Prop(k.clone())).collect(),
        RawData::List(items) => (0..items.len()).map(Key::Index).collect(),
        _ => Vec::new(),
    }
}

/// Element/field count. Lists track the length key, records the iteration
/// sentinel.
pub(crate) fn len(view: &View) -> usize {
    let raw = view.raw();
    if raw.is_list() {
        track(raw.id(), OpKind::Get, Key::Length);
        match &*raw.data.borrow() {
            RawData::List(items) => items.len(),
            _ => 0,
        }
    } else {
        track(raw.id(), OpKind::Iterate, Key::Iterate);
        match &*raw.data.borrow() {
            RawData::Record(fields) => fields.len(),
            _ => 0,
        }
    }
}

// =============================================================================
// LIST IDENTITY SEARCHES
// =============================================================================
//
// Identity-sensitive lookups subscribe to every index plus the length, then
// search once as-given and once with the needle reduced to raw form: a
// reactive element searched for by its wrapped identity must still be found.
// =============================================================================

fn track_all_indices(view: &View) {
    let raw = view.raw();
    if view.mode().is_readonly() {
        return;
    }
    let count = match &*raw.data.borrow() {
        RawData::List(items) => items.len(),
        _ => 0,
    };
    for i in 0..count {
        track(raw.id(), OpKind::Get, Key::Index(i));
    }
    track(raw.id(), OpKind::Get, Key::Length);
}

fn search(view: &View, needle: &Value, from_end: bool) -> Option<usize> {
    let raw = view.raw();
    let find = |wanted: &Value| -> Option<usize> {
        let data = raw.data.borrow();
        let RawData::List(items) = &*data else {
            return None;
        };
        if from_end {
            items.iter().rposition(|item| same_value(item, wanted))
        } else {
            items.iter().position(|item| same_value(item, wanted))
        }
    };

    find(needle).or_else(|| {
        let raw_needle = to_raw(needle);
        if same_value(&raw_needle, needle) {
            None
        } else {
            find(&raw_needle)
        }
    })
}

pub(crate) fn index_of(view: &View, needle: &Value) -> Option<usize> {
    track_all_indices(view);
    search(view, needle, false)
}

pub(crate) fn last_index_of(view: &View, needle: &Value) -> Option<usize> {
    track_all_indices(view);
    search(view, needle, true)
}

pub(crate) fn contains_value(view: &View, needle: &Value) -> bool {
    index_of(view, needle).is_some()
}

// =============================================================================
// LENGTH-MUTATING LIST OPERATIONS
// =============================================================================
//
// Structural edits run with tracking paused so a read of the length inside
// the edit cannot subscribe the running effect to its own write target.
// Notifications are derived by diffing the before/after element snapshots.
// =============================================================================

fn structural_edit<R>(view: &View, op: &'static str, edit: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
    if view.mode().is_readonly() {
        tracing::warn!(op, "list edit ignored: target is readonly");
        return None;
    }
    let raw = view.raw();
    if !raw.is_list() {
        tracing::warn!(op, "list edit ignored: target is not a list");
        return None;
    }

    pause_tracking();
    let old_items = list_snapshot(raw);
    let result = {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::List(items) => edit(items),
            _ => unreachable!("kind checked above"),
        }
    };
    reset_tracking();

    emit_list_diff(raw, &old_items);
    Some(result)
}

pub(crate) fn push(view: &View, value: Value) {
    let value = coerce_incoming(view.mode(), value);
    let _ = structural_edit(view, "push", |items| items.push(value));
}

pub(crate) fn pop(view: &View) -> Value {
    structural_edit(view, "pop", |items| items.pop().unwrap_or(Value::Null))
        .unwrap_or(Value::Null)
}

pub(crate) fn shift(view: &View) -> Value {
    structural_edit(view, "shift", |items| {
        if items.is_empty() {
            Value::Null
        } else {
            items.remove(0)
        }
    })
    .unwrap_or(Value::Null)
}

pub(crate) fn unshift(view: &View, value: Value) {
    let value = coerce_incoming(view.mode(), value);
    let _ = structural_edit(view, "unshift", |items| items.insert(0, value));
}

pub(crate) fn insert(view: &View, index: usize, value: Value) {
    let value = coerce_incoming(view.mode(), value);
    let _ = structural_edit(view, "insert", |items| {
        let at = index.min(items.len());
        items.insert(at, value);
    });
}

pub(crate) fn remove(view: &View, index: usize) -> Value {
    structural_edit(view, "remove", |items| {
        if index < items.len() {
            items.remove(index)
        } else {
            Value::Null
        }
    })
    .unwrap_or(Value::Null)
}

pub(crate) fn splice(
    view: &View,
    start: usize,
    delete_count: usize,
    new_items: Vec<Value>,
) -> Vec<Value> {
    let mode = view.mode();
    let new_items: Vec<Value> = new_items
        .into_iter()
        .map(|v| coerce_incoming(mode, v))
        .collect();
    structural_edit(view, "splice", |items| {
        let start = start.min(items.len());
        let end = (start + delete_count).min(items.len());
        items.splice(start..end, new_items).collect()
    })
    .unwrap_or_default()
}

/// Explicit length write: truncates or null-fills, then notifies through the
/// length-key resolution (length set plus every index at/beyond the new
/// length).
pub(crate) fn set_len(view: &View, len: usize) -> bool {
    if view.mode().is_readonly() {
        tracing::warn!("set_len ignored: target is readonly");
        return false;
    }
    let raw = view.raw();

    let old_len = {
        let mut data = raw.data.borrow_mut();
        match &mut *data {
            RawData::List(items) => {
                let old = items.len();
                items.resize(len, Value::Null);
                old
            }
            _ => {
                tracing::warn!("set_len ignored: target is not a list");
                return false;
            }
        }
    };

    if old_len != len {
        trigger(
            raw,
            TriggerKind::Set,
            Some(Key::Length),
            Some(&Value::Int(len as i64)),
            Some(&Value::Int(old_len as i64)),
        );
    }
    true
}

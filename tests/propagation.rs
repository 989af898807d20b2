// ============================================================================
// Propagation semantics: tracking gating, triggers, lists, maps, sets
// ============================================================================

use trellis_reactive::{
    effect, list, map_of, reactive, record, set_of, untracked, Key, Value,
};

use std::cell::Cell;
use std::rc::Rc;

#[test]
fn reads_outside_effects_create_no_edges() {
    let state = reactive(record([("a", 1.into())]));

    // Plain read, no ambient effect
    assert_eq!(state.get("a"), Value::Int(1));

    // The write still succeeds and simply notifies nobody
    assert!(state.set("a", 2));
    assert_eq!(state.get("a"), Value::Int(2));
}

#[test]
fn writes_re_run_subscribers_before_returning() {
    let state = reactive(record([("a", 1.into())]));
    let result = Rc::new(Cell::new(0));

    let result2 = result.clone();
    let state2 = state.clone();
    let _handle = effect(move || {
        result2.set(state2.get("a").as_i64().unwrap_or(0));
    });
    assert_eq!(result.get(), 1);

    state.set("a", 2);
    // The effect ran synchronously inside set()
    assert_eq!(result.get(), 2);
}

#[test]
fn unchanged_writes_trigger_nothing() {
    let state = reactive(record([("a", 1.into()), ("f", Value::Float(f64::NAN))]));
    let runs = Rc::new(Cell::new(0));

    let runs2 = runs.clone();
    let state2 = state.clone();
    let _handle = effect(move || {
        let _ = state2.get("a");
        let _ = state2.get("f");
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    state.set("a", 1);
    assert_eq!(runs.get(), 1, "identical value: no notification");

    state.set("f", f64::NAN);
    assert_eq!(runs.get(), 1, "NaN over NaN counts as unchanged");

    state.set("f", 0.5);
    assert_eq!(runs.get(), 2);
}

#[test]
fn adds_and_deletes_notify_key_enumerators() {
    let state = reactive(record([("a", 1.into())]));
    let key_count = Rc::new(Cell::new(0usize));

    let count2 = key_count.clone();
    let state2 = state.clone();
    let _handle = effect(move || {
        count2.set(state2.keys().len());
    });
    assert_eq!(key_count.get(), 1);

    state.set("b", 2);
    assert_eq!(key_count.get(), 2, "ADD reaches iteration readers");

    // Value change on an existing record key leaves the key set alone
    state.set("a", 10);
    assert_eq!(key_count.get(), 2);

    state.delete("a");
    assert_eq!(key_count.get(), 1, "DELETE reaches iteration readers");
}

#[test]
fn list_length_reader_follows_pushes_and_index_growth() {
    let arr = reactive(list([1.into()]));
    let seen_len = Rc::new(Cell::new(0usize));

    let seen2 = seen_len.clone();
    let arr2 = arr.clone();
    let _handle = effect(move || {
        seen2.set(arr2.len());
    });
    assert_eq!(seen_len.get(), 1);

    arr.push(2);
    assert_eq!(seen_len.get(), 2, "push notifies length readers");

    // Writing one past the end grows the list the same way
    let end = seen_len.get();
    arr.set(Key::Index(end), 3);
    assert_eq!(seen_len.get(), 3, "index growth notifies length readers");

    // Overwriting an existing index does not change the length
    arr.set(Key::Index(0), 9);
    assert_eq!(seen_len.get(), 3);
}

#[test]
fn length_truncation_notifies_cut_indices() {
    let arr = reactive(list([1.into(), 2.into(), 3.into()]));
    let first = Rc::new(Cell::new(0));
    let last = Rc::new(Cell::new(0));

    let first2 = first.clone();
    let arr2 = arr.clone();
    let _head = effect(move || {
        first2.set(arr2.get(0usize).as_i64().unwrap_or(-1));
    });
    let last2 = last.clone();
    let arr3 = arr.clone();
    let _tail = effect(move || {
        last2.set(arr3.get(2usize).as_i64().unwrap_or(-1));
    });
    assert_eq!((first.get(), last.get()), (1, 3));

    arr.set_len(1);
    assert_eq!(first.get(), 1, "index below the new length is untouched");
    assert_eq!(last.get(), -1, "truncated index re-ran and sees nothing");
}

#[test]
fn structural_list_edits_notify_shifted_indices() {
    let arr = reactive(list([1.into(), 2.into(), 3.into()]));
    let at_zero = Rc::new(Cell::new(0));

    let at0 = at_zero.clone();
    let arr2 = arr.clone();
    let _handle = effect(move || {
        at0.set(arr2.get(0usize).as_i64().unwrap_or(-1));
    });
    assert_eq!(at_zero.get(), 1);

    assert_eq!(arr.shift(), Value::Int(1));
    assert_eq!(at_zero.get(), 2, "shift moved index 1 into slot 0");

    arr.unshift(0);
    assert_eq!(at_zero.get(), 0);

    let removed = arr.splice(0, 2, vec![Value::Int(7)]);
    assert_eq!(removed, vec![Value::Int(0), Value::Int(2)]);
    assert_eq!(at_zero.get(), 7);
}

#[test]
fn effects_reading_length_inside_structural_edits_do_not_self_subscribe() {
    let arr = reactive(list([1.into()]));
    let runs = Rc::new(Cell::new(0));

    let runs2 = runs.clone();
    let arr2 = arr.clone();
    let _handle = effect(move || {
        runs2.set(runs2.get() + 1);
        // push reads and writes the length; tracking is paused around it
        arr2.push(0);
    });
    assert_eq!(runs.get(), 1, "the push must not subscribe the effect to length");

    arr.push(99);
    assert_eq!(runs.get(), 1, "no length edge was recorded for this effect");
}

#[test]
fn map_value_write_notifies_key_and_iteration_readers() {
    let scores = reactive(map_of([("ada", 1.into())]));
    let value_runs = Rc::new(Cell::new(0));
    let size_runs = Rc::new(Cell::new(0));
    let key_runs = Rc::new(Cell::new(0));

    let v2 = value_runs.clone();
    let scores2 = scores.clone();
    let _value_reader = effect(move || {
        let _ = scores2.get("ada");
        v2.set(v2.get() + 1);
    });
    let s2 = size_runs.clone();
    let scores3 = scores.clone();
    let _size_reader = effect(move || {
        let _ = scores3.len();
        s2.set(s2.get() + 1);
    });
    let k2 = key_runs.clone();
    let scores4 = scores.clone();
    let _key_reader = effect(move || {
        let _ = scores4.keys();
        k2.set(k2.get() + 1);
    });
    assert_eq!((value_runs.get(), size_runs.get(), key_runs.get()), (1, 1, 1));

    // SET on an existing key: key readers and iteration readers re-run,
    // key-only enumeration does not
    scores.set("ada", 2);
    assert_eq!(value_runs.get(), 2);
    assert_eq!(size_runs.get(), 2, "map SET reaches iteration readers");
    assert_eq!(key_runs.get(), 1, "key set is unchanged");

    // ADD: everything re-runs
    scores.set("grace", 1);
    assert_eq!(size_runs.get(), 3);
    assert_eq!(key_runs.get(), 2);

    // DELETE: everything re-runs
    scores.delete("ada");
    assert_eq!(size_runs.get(), 4);
    assert_eq!(key_runs.get(), 3);
}

#[test]
fn set_membership_propagates() {
    let tags = reactive(set_of(["a"]));
    let has_b = Rc::new(Cell::new(false));
    let size = Rc::new(Cell::new(0usize));

    let b2 = has_b.clone();
    let tags2 = tags.clone();
    let _member = effect(move || {
        b2.set(tags2.has("b"));
    });
    let size2 = size.clone();
    let tags3 = tags.clone();
    let _size = effect(move || {
        size2.set(tags3.len());
    });
    assert!(!has_b.get());
    assert_eq!(size.get(), 1);

    assert!(tags.add("b"));
    assert!(has_b.get(), "HAS edge saw the add");
    assert_eq!(size.get(), 2);

    // Re-adding an existing item notifies nobody
    assert!(!tags.add("b"));
    assert_eq!(size.get(), 2);

    tags.delete("b");
    assert!(!has_b.get());
    assert_eq!(size.get(), 1);
}

#[test]
fn clear_notifies_every_reader_once_each() {
    let scores = reactive(map_of([("a", 1.into()), ("b", 2.into())]));
    let runs = Rc::new(Cell::new(0));

    let runs2 = runs.clone();
    let scores2 = scores.clone();
    let _handle = effect(move || {
        let _ = scores2.get("a");
        let _ = scores2.len();
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    scores.clear();
    assert_eq!(runs.get(), 2, "clear unions the resolved sets");
    assert_eq!(scores.len(), 0);

    // Clearing an already-empty collection is silent
    scores.clear();
    assert_eq!(runs.get(), 2);
}

#[test]
fn untracked_reads_are_invisible_to_the_effect() {
    let state = reactive(record([("seen", 1.into()), ("ignored", 1.into())]));
    let runs = Rc::new(Cell::new(0));

    let runs2 = runs.clone();
    let state2 = state.clone();
    let _handle = effect(move || {
        let _ = state2.get("seen");
        let _ = untracked(|| state2.get("ignored"));
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    state.set("ignored", 2);
    assert_eq!(runs.get(), 1, "untracked read recorded no edge");

    state.set("seen", 2);
    assert_eq!(runs.get(), 2);
}

#[test]
fn mutating_the_raw_object_notifies_nobody() {
    let raw = record([("a", 1.into())]);
    let state = reactive(raw.clone());
    let runs = Rc::new(Cell::new(0));

    let runs2 = runs.clone();
    let state2 = state.clone();
    let _handle = effect(move || {
        let _ = state2.get("a");
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    raw.set("a", 99);
    assert_eq!(runs.get(), 1, "raw writes bypass the trigger path");
    // The view still reads through to the shared raw data
    assert_eq!(state.get("a"), Value::Int(99));
}

// ============================================================================
// Wrapping semantics: cache identity, flags, readonly, shallow, refs
// ============================================================================

use trellis_reactive::{
    effect, is_reactive, is_readonly, is_ref, is_shallow, list, mark_skip, reactive, readonly,
    readonly_ref_box, record, ref_box, seal, shallow_reactive, shallow_readonly, to_raw, unref,
    Value,
};

use std::cell::Cell;
use std::rc::Rc;

#[test]
fn wrapping_is_idempotent_and_identity_stable() {
    let raw = record([("a", 1.into())]);

    let v1 = reactive(raw.clone());
    let v2 = reactive(raw.clone());
    assert_eq!(v1, v2, "same raw, same mode: same view");

    let v3 = reactive(v1.clone());
    assert_eq!(v1, v3, "wrapping a view returns it unchanged");
}

#[test]
fn unwrap_round_trips_to_the_original() {
    let raw = record([("a", 1.into())]);
    assert_eq!(to_raw(&reactive(raw.clone())), raw);
    assert_eq!(to_raw(&readonly(raw.clone())), raw);
    assert_eq!(to_raw(&shallow_reactive(raw.clone())), raw);
    assert_eq!(to_raw(&shallow_readonly(raw.clone())), raw);
}

#[test]
fn readonly_over_reactive_is_a_distinct_view() {
    let raw = record([("a", 1.into())]);
    let mutable = reactive(raw.clone());
    let frozen = readonly(mutable.clone());

    assert_ne!(mutable, frozen, "readonly constructor makes a new view");
    assert!(is_readonly(&frozen));
    assert!(is_reactive(&mutable));
    assert_eq!(to_raw(&mutable), to_raw(&frozen), "both observe the same raw");
}

#[test]
fn readonly_writes_and_deletes_are_silent_no_ops() {
    let frozen = readonly(record([("a", 1.into())]));

    assert!(!frozen.set("a", 2), "write is rejected");
    assert!(!frozen.delete("a"), "delete is rejected");
    assert_eq!(frozen.get("a"), Value::Int(1), "state unchanged");
    assert!(frozen.has("a"));
}

#[test]
fn readonly_reads_do_not_subscribe() {
    let raw = record([("a", 1.into())]);
    let mutable = reactive(raw.clone());
    let frozen = readonly(raw);

    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let frozen2 = frozen.clone();
    let _handle = effect(move || {
        let _ = frozen2.get("a");
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    mutable.set("a", 2);
    assert_eq!(runs.get(), 1, "readonly GET records no edge");
}

#[test]
fn readonly_has_does_subscribe() {
    let raw = record([("a", 1.into())]);
    let mutable = reactive(raw.clone());
    let frozen = readonly(raw);

    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let frozen2 = frozen.clone();
    let _handle = effect(move || {
        let _ = frozen2.has("b");
        runs2.set(runs2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    mutable.set("b", 2);
    assert_eq!(runs.get(), 2, "HAS edges are recorded on every mode");
}

#[test]
fn nested_objects_wrap_lazily_per_mode() {
    let inner = record([("x", 1.into())]);
    let outer = record([("inner", inner.clone())]);

    let mutable = reactive(outer.clone());
    let child = mutable.get("inner");
    assert!(is_reactive(&child), "nested read wraps mutably");
    assert_eq!(to_raw(&child), inner);

    let frozen = readonly(outer);
    let frozen_child = frozen.get("inner");
    assert!(
        is_readonly(&frozen_child),
        "readonly views wrap nested reads readonly"
    );
}

#[test]
fn shallow_views_return_nested_objects_raw() {
    let inner = record([("x", 1.into())]);
    let outer = record([("inner", inner.clone())]);

    let shallow = shallow_reactive(outer);
    assert!(is_shallow(&shallow));

    let child = shallow.get("inner");
    assert!(!is_reactive(&child), "no recursive wrapping");
    assert_eq!(child, inner);
}

#[test]
fn skipped_and_sealed_objects_pass_through() {
    let skipped = record([("a", 1.into())]);
    mark_skip(&skipped);
    assert_eq!(reactive(skipped.clone()), skipped);

    let sealed = record([("a", 1.into())]);
    seal(&sealed);
    assert_eq!(reactive(sealed.clone()), sealed);

    // Primitives are never wrapped, returned unchanged
    assert_eq!(reactive(Value::Int(1)), Value::Int(1));
    assert_eq!(readonly(Value::Null), Value::Null);
}

#[test]
fn refs_unwrap_on_deep_record_reads() {
    let boxed = ref_box(1);
    let state = reactive(record([("r", boxed.clone())]));

    assert_eq!(state.get("r"), Value::Int(1), "ref unwraps to its inner value");

    // Writing the slot forwards into the ref (passthrough)
    assert!(state.set("r", 5));
    assert_eq!(state.get("r"), Value::Int(5));
    assert_eq!(unref(&boxed), Value::Int(5), "write landed inside the ref");
    assert!(is_ref(&to_raw(&state).get("r")), "slot still holds the ref");
}

#[test]
fn refs_do_not_unwrap_at_list_indices_or_through_shallow_views() {
    let arr = reactive(list([ref_box(1)]));
    assert!(is_ref(&arr.get(0usize)), "lists never auto-unwrap element refs");

    let shallow = shallow_reactive(record([("r", ref_box(1))]));
    assert!(is_ref(&shallow.get("r")), "shallow views never unwrap refs");
}

#[test]
fn readonly_ref_cannot_be_displaced_by_a_plain_value() {
    let state = reactive(record([("r", readonly_ref_box(1))]));

    assert!(!state.set("r", 5), "write is rejected");
    assert_eq!(state.get("r"), Value::Int(1));

    // Replacing it with another ref is allowed
    assert!(state.set("r", ref_box(9)));
    assert_eq!(state.get("r"), Value::Int(9));
}

#[test]
fn effects_follow_refs_read_through_views() {
    let boxed = ref_box(1);
    let Value::Ref(handle) = boxed.clone() else {
        panic!("expected a ref");
    };
    let state = reactive(record([("r", boxed)]));

    let seen = Rc::new(Cell::new(0));
    let seen2 = seen.clone();
    let state2 = state.clone();
    let _handle = effect(move || {
        seen2.set(state2.get("r").as_i64().unwrap_or(0));
    });
    assert_eq!(seen.get(), 1);

    // Writing the ref directly re-runs the reader that unwrapped it
    handle.set(Value::Int(42));
    assert_eq!(seen.get(), 42);
}

#[test]
fn identity_searches_find_elements_by_either_form() {
    let child = record([("x", 1.into())]);
    let arr = reactive(list([child.clone(), 2.into()]));

    let wrapped_child = arr.get(0usize);
    assert!(is_reactive(&wrapped_child));

    // Stored form is raw; both identities must be found
    assert!(arr.contains(&child));
    assert!(arr.contains(&wrapped_child), "wrapped needle falls back to raw");
    assert_eq!(arr.index_of(&wrapped_child), Some(0));
    assert_eq!(arr.last_index_of(&child), Some(0));

    assert!(arr.contains(&Value::Int(2)));
    assert!(!arr.contains(&Value::Int(3)));
}

#[test]
fn deep_writes_store_raw_forms() {
    let state = reactive(record([("child", record([("x", 1.into())]))]));
    let other = reactive(record([("y", 2.into())]));

    // Writing a view into a deep view stores the raw object
    assert!(state.set("other", other.clone()));
    let stored = to_raw(&state).get("other");
    assert!(
        !is_reactive(&stored),
        "deep views reduce incoming values to raw"
    );
    assert_eq!(stored, to_raw(&other));
}

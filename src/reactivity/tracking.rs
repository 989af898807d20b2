// ============================================================================
// trellis-reactive - Dependency Store & Track/Trigger Protocol
// The core of the engine - recording reads and propagating writes
// ============================================================================
//
// The store maps observed-object identity to a per-key map of dependency
// sets. Reads call `track`, writes call `trigger`. Propagation is fully
// synchronous: every resolved effect runs (or is handed to its scheduler)
// before the triggering write returns.
//
// Borrow discipline: subscriber lists are snapshotted before invocation
// ("collect-then-invoke"), because invoked effects re-enter the store to
// track their own reads.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::constants::{OpKind, TriggerKind, MAX_MARKER_BITS};
use crate::core::context::with_context;
use crate::core::types::{effect_ptr, AnyEffect, TrackEvent, TriggerEvent};
use crate::core::value::{Key, ObjRef, Value};
use crate::reactivity::dep::Dep;

// =============================================================================
// DEPENDENCY STORE
// =============================================================================

thread_local! {
    /// Observed-object identity -> key -> dependency set.
    ///
    /// Levels are created lazily on first track; entries are only ever
    /// emptied by effects unsubscribing themselves.
    static TARGET_MAP: RefCell<HashMap<u64, HashMap<Key, Rc<Dep>>>> =
        RefCell::new(HashMap::new());
}

/// Fetch or create the dependency set for one (target, key) pair.
fn dep_for(target: u64, key: &Key) -> Rc<Dep> {
    TARGET_MAP.with(|map| {
        map.borrow_mut()
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_insert_with(Dep::new)
            .clone()
    })
}

/// Fetch the existing dependency set for one (target, key) pair, if any.
fn existing_dep(target: u64, key: &Key) -> Option<Rc<Dep>> {
    TARGET_MAP.with(|map| map.borrow().get(&target)?.get(key).cloned())
}

#[cfg(test)]
pub(crate) fn subscriber_count(target: u64, key: &Key) -> usize {
    existing_dep(target, key).map_or(0, |dep| dep.subscriber_count())
}

// =============================================================================
// TRACK - Record a dependency edge on a read
// =============================================================================

/// Record a dependency edge from (target, key) to the active effect.
///
/// No-op when tracking is paused or no effect is running. At nesting depth
/// within the marker bound, membership is decided by the generation bitmasks
/// (no set scan); beyond it, by a direct membership check.
pub fn track(target: u64, op: OpKind, key: Key) {
    let Some(effect) = with_context(|ctx| {
        if ctx.is_tracking() {
            ctx.get_active_effect()
        } else {
            None
        }
    }) else {
        return;
    };

    let dep = dep_for(target, &key);
    track_effect(&dep, &effect, || TrackEvent { target, op, key });
}

/// Subscribe `effect` to `dep` unless it is already a member this run.
fn track_effect(
    dep: &Rc<Dep>,
    effect: &Rc<dyn AnyEffect>,
    event: impl FnOnce() -> TrackEvent,
) {
    let (depth, bit) =
        with_context(|ctx| (ctx.effect_track_depth.get(), ctx.track_op_bit.get()));

    let should_add = if depth <= MAX_MARKER_BITS {
        if dep.new_tracked(bit) {
            false
        } else {
            dep.mark_new_tracked(bit);
            // Already a member from the previous run: the marker alone keeps it
            !dep.was_tracked(bit)
        }
    } else {
        // Depth overflow fallback: exact membership scan
        !dep.contains(effect_ptr(effect))
    };

    if should_add {
        dep.add(effect);
        effect.add_dep(dep.clone());
        effect.notify_track(&event());
    }
}

// =============================================================================
// TRIGGER - Propagate a write to subscribed effects
// =============================================================================

/// Notify every effect affected by a write on `raw`.
///
/// Resolution by operation kind:
/// - `Clear` affects every key's set.
/// - A `Length` write on a list affects the length set plus every index set
///   at or beyond the new length.
/// - Otherwise the addressed key's set, plus: `Add`/`Delete` on non-lists
///   reach the iteration sentinel (and the map-key sentinel on maps);
///   `Add` at a list index reaches the length set; `Set` on a map reaches the
///   iteration sentinel (size/iteration readers observe value changes too).
pub fn trigger(
    raw: &ObjRef,
    kind: TriggerKind,
    key: Option<Key>,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
) {
    let target = raw.id();
    let deps: Vec<Rc<Dep>> = TARGET_MAP.with(|map| {
        let map = map.borrow();
        let Some(key_deps) = map.get(&target) else {
            // Never read: nothing to do
            return Vec::new();
        };

        let mut deps = Vec::new();
        let is_list = raw.is_list();

        if kind == TriggerKind::Clear {
            deps.extend(key_deps.values().cloned());
            return deps;
        }

        if is_list && key == Some(Key::Length) {
            let new_len = new_value
                .and_then(Value::as_i64)
                .map_or(0, |len| len.max(0) as usize);
            for (k, dep) in key_deps {
                match k {
                    Key::Length => deps.push(dep.clone()),
                    Key::Index(i) if *i >= new_len => deps.push(dep.clone()),
                    _ => {}
                }
            }
            return deps;
        }

        if let Some(k) = &key {
            if let Some(dep) = key_deps.get(k) {
                deps.push(dep.clone());
            }
        }

        match kind {
            TriggerKind::Add => {
                if !is_list {
                    if let Some(dep) = key_deps.get(&Key::Iterate) {
                        deps.push(dep.clone());
                    }
                    if raw.is_map() {
                        if let Some(dep) = key_deps.get(&Key::MapKeyIterate) {
                            deps.push(dep.clone());
                        }
                    }
                } else if matches!(key, Some(Key::Index(_))) {
                    if let Some(dep) = key_deps.get(&Key::Length) {
                        deps.push(dep.clone());
                    }
                }
            }
            TriggerKind::Delete => {
                if !is_list {
                    if let Some(dep) = key_deps.get(&Key::Iterate) {
                        deps.push(dep.clone());
                    }
                    if raw.is_map() {
                        if let Some(dep) = key_deps.get(&Key::MapKeyIterate) {
                            deps.push(dep.clone());
                        }
                    }
                }
            }
            TriggerKind::Set => {
                if raw.is_map() {
                    if let Some(dep) = key_deps.get(&Key::Iterate) {
                        deps.push(dep.clone());
                    }
                }
            }
            TriggerKind::Clear => unreachable!("handled above"),
        }

        deps
    });

    if deps.is_empty() {
        return;
    }

    trigger_effects(
        deps,
        TriggerEvent {
            target,
            op: kind,
            key,
            new_value: new_value.cloned(),
            old_value: old_value.cloned(),
        },
    );
}

/// Single-key trigger used by ref-like boxes and computed values, which have
/// exactly one observable slot.
pub fn trigger_key(target: u64, kind: TriggerKind, key: Key) {
    let Some(dep) = existing_dep(target, &key) else {
        return;
    };
    trigger_effects(
        vec![dep],
        TriggerEvent {
            target,
            op: kind,
            key: Some(key),
            new_value: None,
            old_value: None,
        },
    );
}

/// Union the subscribers of the resolved sets and invoke each at most once.
///
/// Computed invalidators go first so an effect subscribed to both a source
/// and a computed over that source never reads a stale cache.
fn trigger_effects(deps: Vec<Rc<Dep>>, event: TriggerEvent) {
    let mut effects: Vec<Rc<dyn AnyEffect>> = Vec::new();
    let mut seen: Vec<*const ()> = Vec::new();

    for dep in &deps {
        for effect in dep.collect_live() {
            let ptr = effect_ptr(&effect);
            if !seen.contains(&ptr) {
                seen.push(ptr);
                effects.push(effect);
            }
        }
    }
    // Dep borrows are released; invoked effects may freely re-track

    for effect in effects.iter().filter(|e| e.is_computed()) {
        trigger_effect(effect, &event);
    }
    for effect in effects.iter().filter(|e| !e.is_computed()) {
        trigger_effect(effect, &event);
    }
}

fn trigger_effect(effect: &Rc<dyn AnyEffect>, event: &TriggerEvent) {
    // The running effect never re-triggers itself unless it opted in
    let is_self = with_context(|ctx| {
        ctx.get_active_effect()
            .is_some_and(|active| effect_ptr(&active) == effect_ptr(effect))
    });
    if is_self && !effect.allow_recurse() {
        return;
    }
    // Stopped earlier in this same propagation pass
    if !effect.is_active() {
        return;
    }

    effect.notify_trigger(event);

    if effect.has_scheduler() {
        effect.run_scheduler();
    } else {
        effect.run_erased();
    }
}

// =============================================================================
// EFFECT CLEANUP - Full unsubscribe
// =============================================================================

/// Remove `effect` from every dependency set it belongs to and forget its
/// memberships. Used by `stop()` and by runs beyond the marker-depth bound.
pub(crate) fn cleanup_effect(effect: &Rc<dyn AnyEffect>) {
    let ptr = effect_ptr(effect);

    let mut deps: Vec<Rc<Dep>> = Vec::new();
    effect.for_each_dep(&mut |dep| deps.push(dep.clone()));
    // Borrow on the effect's dep list is released before mutating the sets

    for dep in deps {
        dep.remove(ptr);
    }
    effect.clear_deps();
}

// =============================================================================
// TESTS
// =============================================================================

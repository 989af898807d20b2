// ============================================================================
// trellis-reactive - A Fine-Grained Reactive Observation Engine
// ============================================================================
//
// Transparent dependency tracking over plain data: effects re-run when the
// state they read changes, without declaring dependencies. Reads through a
// wrapped view record (object, key) edges against the running effect; writes
// look up the affected edges and re-invoke their subscribers synchronously.
//
//     let state = reactive(record([("count", 0.into())]));
//
//     let s = state.clone();
//     let handle = effect(move || println!("count = {:?}", s.get("count")));
//
//     state.set("count", 1); // the effect has re-run before this returns
//     handle.stop();
//
// Single-threaded by design: all ambient state is thread-local, every
// propagation completes within the triggering call stack.
// ============================================================================

pub mod core;
pub mod observe;
pub mod primitives;
pub mod reactivity;

// Re-export the public surface at the crate root for ergonomic access
pub use crate::core::constants::{OpKind, TriggerKind, MAX_MARKER_BITS};
pub use crate::core::context::{
    enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked, with_context,
    ReactiveContext,
};
pub use crate::core::types::{AnyEffect, TrackEvent, TriggerEvent};
pub use crate::core::value::{
    has_changed, list, map_of, record, same_value, set_of, Key, KeyError, ObjRef, RawData,
    RawObject, Value,
};
pub use crate::observe::reference::{is_ref, readonly_ref_box, ref_box, unref, RefBox};
pub use crate::observe::view::{
    is_reactive, is_readonly, is_shallow, mark_skip, reactive, readonly, seal, shallow_reactive,
    shallow_readonly, to_raw, View, ViewMode,
};
pub use crate::primitives::computed::{computed, computed_uncached, computed_writable, Computed};
pub use crate::primitives::effect::{
    effect, effect_with_options, Effect, EffectFn, EffectInner, EffectOptions, SchedulerFn,
};
pub use crate::primitives::scope::{
    effect_scope, get_current_scope, on_scope_dispose, EffectScope, ScopeCleanupFn,
};
pub use crate::reactivity::dep::Dep;
pub use crate::reactivity::tracking::{track, trigger, trigger_key};

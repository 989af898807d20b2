// ============================================================================
// trellis-reactive - Computed Value
// Lazily-cached derived values: push-based invalidation, pull-based recompute
// ============================================================================
//
// A computed value wraps one internal effect whose scheduler flips a dirty
// flag and notifies the computed's own subscribers instead of recomputing.
// Any number of upstream writes between two reads therefore coalesce into a
// single recompute on the next read.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::constants::{OpKind, TriggerKind};
use crate::core::context::next_id;
use crate::core::value::Key;
use crate::primitives::effect::{EffectFn, EffectInner};
use crate::primitives::scope::register_effect;
use crate::reactivity::tracking::{track, trigger_key};

// =============================================================================
// COMPUTED INNER
// =============================================================================

struct ComputedInner<T> {
    /// Identity under which readers subscribe to this computed
    id: u64,

    /// Cache is stale and must recompute before the next read
    dirty: Cell<bool>,

    /// False disables caching entirely: every read recomputes, untracked
    /// (non-interactive evaluation contexts)
    cacheable: bool,

    /// Cached result of the last getter run
    value: RefCell<Option<T>>,

    /// The internal effect wrapping the getter
    effect: RefCell<Option<Rc<EffectInner<T>>>>,

    setter: Option<Box<dyn Fn(T)>>,
}

// =============================================================================
// PUBLIC HANDLE
// =============================================================================

/// A cached derived value.
///
/// Reading inside an effect subscribes that effect to the computed itself,
/// exactly like an ordinary observed value.
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Computed<T> {
    fn create(getter: EffectFn<T>, setter: Option<Box<dyn Fn(T)>>, cacheable: bool) -> Self {
        let inner = Rc::new(ComputedInner {
            id: next_id(),
            dirty: Cell::new(true),
            cacheable,
            value: RefCell::new(None),
            effect: RefCell::new(None),
            setter,
        });

        let effect = EffectInner::new(getter);
        effect.computed_marker.set(true);

        let weak = Rc::downgrade(&inner);
        *effect.scheduler.borrow_mut() = Some(Box::new(move || {
            let Some(computed) = weak.upgrade() else {
                return;
            };
            // Flip the flag once; further upstream writes before the next
            // read are already covered
            if !computed.dirty.replace(true) {
                trigger_key(computed.id, TriggerKind::Set, Key::value_slot());
            }
        }));

        if !cacheable {
            // Uncached computeds run their getter through the inactive path:
            // no dependency bookkeeping of their own
            effect.active.set(false);
        }

        if let Some(erased) = effect.as_any_effect() {
            if let Some(owner) = register_effect(erased, None) {
                *effect.scope.borrow_mut() = Some(Rc::downgrade(&owner));
            }
        }

        *inner.effect.borrow_mut() = Some(effect);
        Self { inner }
    }

    /// Read the computed value, recomputing if an upstream write invalidated
    /// the cache (or if caching is disabled).
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        track(self.inner.id, OpKind::Get, Key::value_slot());

        if self.inner.dirty.get() || !self.inner.cacheable {
            self.inner.dirty.set(false);
            let effect = self.inner.effect.borrow().clone();
            if let Some(effect) = effect {
                if let Some(value) = effect.run() {
                    *self.inner.value.borrow_mut() = Some(value);
                }
            }
        }

        self.inner
            .value
            .borrow()
            .as_ref()
            .expect("computed getter produced no value")
            .clone()
    }

    /// Forward a write to the setter. A computed constructed without one
    /// rejects the write with a diagnostic.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => tracing::warn!("computed value has no setter; write ignored"),
        }
    }

    /// Whether the next read will recompute
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Drop for Computed<T> {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) == 1 {
            if let Some(effect) = self.inner.effect.borrow().as_ref() {
                effect.stop();
            }
        }
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create a cached computed value from a getter.
///
/// # Example
///
/// ```ignore
/// let state = reactive(record([("n", 2.into())]));
///
/// let state2 = state.clone();
/// let doubled = computed(move || state2.get("n").as_i64().unwrap_or(0) * 2);
///
/// assert_eq!(doubled.get(), 4);
/// state.set("n", 5);           // invalidates, does not recompute
/// assert_eq!(doubled.get(), 10); // recomputes once
/// ```
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: 'static,
    F: FnMut() -> T + 'static,
{
    Computed::create(Box::new(getter), None, true)
}

/// Create a computed value with a write path; writes are forwarded to
/// `setter` and perform no caching logic.
pub fn computed_writable<T, F, S>(getter: F, setter: S) -> Computed<T>
where
    T: 'static,
    F: FnMut() -> T + 'static,
    S: Fn(T) + 'static,
{
    Computed::create(Box::new(getter), Some(Box::new(setter)), true)
}

/// Create a computed value with caching disabled: every read recomputes.
pub fn computed_uncached<T, F>(getter: F) -> Computed<T>
where
    T: 'static,
    F: FnMut() -> T + 'static,
{
    Computed::create(Box::new(getter), None, false)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::core::value::{record, Value};
    use crate::observe::view::reactive;
    use crate::primitives::effect::effect;

    #[test]
    fn computed_caches_until_invalidated() {
        let computes = Rc::new(Cell::new(0));
        let state = reactive(record([("n", 1.into())]));

        let state2 = state.clone();
        let computes2 = computes.clone();
        let doubled = computed(move || {
            computes2.set(computes2.get() + 1);
            state2.get("n").as_i64().unwrap_or(0) * 2
        });

        assert_eq!(doubled.get(), 2);
        assert_eq!(computes.get(), 1);

        // Cached read
        assert_eq!(doubled.get(), 2);
        assert_eq!(computes.get(), 1);

        // Invalidate, then recompute on read
        state.set("n", 5);
        assert!(doubled.is_dirty());
        assert_eq!(computes.get(), 1, "write alone does not recompute");
        assert_eq!(doubled.get(), 10);
        assert_eq!(computes.get(), 2);
    }

    #[test]
    fn multiple_writes_coalesce_into_one_recompute() {
        let computes = Rc::new(Cell::new(0));
        let state = reactive(record([("a", 1.into()), ("b", 2.into())]));

        let state2 = state.clone();
        let computes2 = computes.clone();
        let sum = computed(move || {
            computes2.set(computes2.get() + 1);
            state2.get("a").as_i64().unwrap_or(0) + state2.get("b").as_i64().unwrap_or(0)
        });

        assert_eq!(sum.get(), 3);
        assert_eq!(computes.get(), 1);

        state.set("a", 10);
        state.set("b", 20);
        assert_eq!(computes.get(), 1, "both invalidations coalesce");

        assert_eq!(sum.get(), 30);
        assert_eq!(computes.get(), 2, "exactly one recompute for two writes");
    }

    #[test]
    fn effects_subscribe_to_computed_values() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let state = reactive(record([("n", 1.into())]));

        let state2 = state.clone();
        let doubled = computed(move || state2.get("n").as_i64().unwrap_or(0) * 2);

        let doubled2 = doubled.clone();
        let seen2 = seen.clone();
        let _handle = effect(move || {
            seen2.borrow_mut().push(doubled2.get());
        });
        assert_eq!(*seen.borrow(), vec![2]);

        state.set("n", 3);
        assert_eq!(*seen.borrow(), vec![2, 6], "invalidation reaches the effect");
    }

    #[test]
    fn chained_computeds_propagate() {
        let state = reactive(record([("n", 1.into())]));

        let state2 = state.clone();
        let doubled = computed(move || state2.get("n").as_i64().unwrap_or(0) * 2);
        let doubled2 = doubled.clone();
        let plus_ten = computed(move || doubled2.get() + 10);

        assert_eq!(plus_ten.get(), 12);

        state.set("n", 5);
        assert_eq!(plus_ten.get(), 20);
    }

    #[test]
    fn writable_computed_forwards_to_setter() {
        let state = reactive(record([("n", 1.into())]));

        let get_state = state.clone();
        let set_state = state.clone();
        let n = computed_writable(
            move || get_state.get("n").as_i64().unwrap_or(0),
            move |value: i64| {
                set_state.set("n", value);
            },
        );

        assert_eq!(n.get(), 1);
        n.set(7);
        assert_eq!(state.get("n"), Value::Int(7));
        assert_eq!(n.get(), 7);
    }

    #[test]
    fn setterless_computed_rejects_writes() {
        let state = reactive(record([("n", 1.into())]));
        let state2 = state.clone();
        let n = computed(move || state2.get("n").as_i64().unwrap_or(0));

        n.set(99); // diagnostic only
        assert_eq!(state.get("n"), Value::Int(1));
        assert_eq!(n.get(), 1);
    }

    #[test]
    fn uncached_computed_recomputes_every_read() {
        let computes = Rc::new(Cell::new(0));
        let state = reactive(record([("n", 1.into())]));

        let state2 = state.clone();
        let computes2 = computes.clone();
        let n = computed_uncached(move || {
            computes2.set(computes2.get() + 1);
            state2.get("n").as_i64().unwrap_or(0)
        });

        assert_eq!(n.get(), 1);
        assert_eq!(n.get(), 1);
        assert_eq!(computes.get(), 2, "every read recomputes");
    }

    #[test]
    fn dropping_last_handle_stops_the_internal_effect() {
        let computes = Rc::new(Cell::new(0));
        let state = reactive(record([("n", 1.into())]));

        {
            let state2 = state.clone();
            let computes2 = computes.clone();
            let n = computed(move || {
                computes2.set(computes2.get() + 1);
                state2.get("n").as_i64().unwrap_or(0)
            });
            assert_eq!(n.get(), 1);
        }

        // The internal effect is stopped; writes must not reach it
        state.set("n", 2);
        assert_eq!(computes.get(), 1);
    }
}

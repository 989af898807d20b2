// ============================================================================
// trellis-reactive - Effect Scope
// Group effects and cleanup callbacks for coordinated disposal
// ============================================================================
//
// Effects and disposal callbacks created while a scope is ambient register
// into it; stopping the scope stops every owned effect, runs the cleanups in
// registration order, and cascades into child scopes. Detachment from the
// parent is O(1): each child knows its index and is swap-removed.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::core::types::AnyEffect;

// =============================================================================
// THREAD-LOCAL SCOPE STATE
// =============================================================================

thread_local! {
    /// Currently ambient scope (if any)
    static ACTIVE_SCOPE: RefCell<Option<Rc<EffectScopeInner>>> = const { RefCell::new(None) };
}

pub(crate) fn get_active_scope() -> Option<Rc<EffectScopeInner>> {
    ACTIVE_SCOPE.with(|slot| slot.borrow().clone())
}

fn set_active_scope(scope: Option<Rc<EffectScopeInner>>) -> Option<Rc<EffectScopeInner>> {
    ACTIVE_SCOPE.with(|slot| slot.replace(scope))
}

// =============================================================================
// CLEANUP TYPE
// =============================================================================

/// Cleanup callback run when the owning scope stops
pub type ScopeCleanupFn = Box<dyn FnOnce()>;

// =============================================================================
// EFFECT SCOPE INNER
// =============================================================================

pub struct EffectScopeInner {
    /// False once stopped
    active: Cell<bool>,

    /// Effects owned by this scope, in creation order
    effects: RefCell<Vec<Rc<dyn AnyEffect>>>,

    /// Cleanup callbacks, run in registration order on stop
    cleanups: RefCell<Vec<ScopeCleanupFn>>,

    /// Parent scope; detached scopes never have one
    parent: RefCell<Option<Weak<EffectScopeInner>>>,

    /// Child scopes, in creation order
    scopes: RefCell<Vec<Rc<EffectScopeInner>>>,

    /// Own position in the parent's child list, for O(1) detachment
    index: Cell<usize>,

    /// Ambient scope displaced by `on()`, restored by `off()`
    prev_scope: RefCell<Option<Rc<EffectScopeInner>>>,

    /// Self-reference for becoming the ambient scope
    self_weak: RefCell<Weak<EffectScopeInner>>,
}

impl EffectScopeInner {
    fn new(detached: bool) -> Rc<Self> {
        let parent = if detached { None } else { get_active_scope() };

        let scope = Rc::new(Self {
            active: Cell::new(true),
            effects: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            parent: RefCell::new(parent.as_ref().map(Rc::downgrade)),
            scopes: RefCell::new(Vec::new()),
            index: Cell::new(0),
            prev_scope: RefCell::new(None),
            self_weak: RefCell::new(Weak::new()),
        });
        *scope.self_weak.borrow_mut() = Rc::downgrade(&scope);

        if let Some(parent) = parent {
            let mut children = parent.scopes.borrow_mut();
            scope.index.set(children.len());
            children.push(scope.clone());
        }

        scope
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Run `f` with this scope ambient, restoring the previous ambient scope
    /// on every exit path.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.active.get() {
            tracing::warn!("cannot run on an inactive scope");
            return None;
        }
        let self_rc = self.self_weak.borrow().upgrade()?;

        struct RestoreGuard {
            prev: Option<Rc<EffectScopeInner>>,
        }
        impl Drop for RestoreGuard {
            fn drop(&mut self) {
                set_active_scope(self.prev.take());
            }
        }

        let _guard = RestoreGuard {
            prev: set_active_scope(Some(self_rc)),
        };
        Some(f())
    }

    /// Make this scope ambient outside a `run` call
    pub fn on(&self) {
        if let Some(self_rc) = self.self_weak.borrow().upgrade() {
            *self.prev_scope.borrow_mut() = set_active_scope(Some(self_rc));
        }
    }

    /// Undo a matching `on()`
    pub fn off(&self) {
        set_active_scope(self.prev_scope.borrow_mut().take());
    }

    /// Stop every owned effect, run cleanups in registration order, cascade
    /// into children, and detach from the parent (unless the parent's own
    /// cascade is what is stopping us). Idempotent.
    pub fn stop(&self, from_parent: bool) {
        if !self.active.get() {
            return;
        }
        self.active.set(false);

        let effects: Vec<_> = self.effects.borrow_mut().drain(..).collect();
        for effect in effects {
            effect.stop_erased();
        }

        let cleanups: Vec<_> = self.cleanups.borrow_mut().drain(..).collect();
        for cleanup in cleanups {
            // A failing cleanup must not abort the rest of the disposal
            let _ = catch_unwind(AssertUnwindSafe(cleanup));
        }

        let children: Vec<_> = self.scopes.borrow_mut().drain(..).collect();
        for child in children {
            child.stop(true);
        }

        if !from_parent {
            if let Some(parent) = self.parent.borrow().as_ref().and_then(Weak::upgrade) {
                let mut siblings = parent.scopes.borrow_mut();
                let i = self.index.get();
                if i < siblings.len() {
                    let removed = siblings.swap_remove(i);
                    debug_assert!(
                        self.self_weak
                            .borrow()
                            .upgrade()
                            .is_some_and(|s| Rc::ptr_eq(&removed, &s)),
                        "child index out of sync with parent list"
                    );
                    if i < siblings.len() {
                        // The swapped-in sibling inherits the vacated slot
                        siblings[i].index.set(i);
                    }
                }
            }
        }
        *self.parent.borrow_mut() = None;
    }

    pub(crate) fn add_effect(&self, effect: Rc<dyn AnyEffect>) {
        self.effects.borrow_mut().push(effect);
    }

    pub(crate) fn add_cleanup(&self, cleanup: ScopeCleanupFn) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

// =============================================================================
// PUBLIC WRAPPER
// =============================================================================

/// A lifetime container grouping effects and cleanups for bulk disposal.
///
/// # Example
///
/// ```ignore
/// let scope = effect_scope(false);
///
/// scope.run(|| {
///     effect(|| { /* owned by the scope */ });
///     on_scope_dispose(|| println!("scope stopped"));
/// });
///
/// scope.stop(); // stops the effect, runs the cleanup
/// ```
#[derive(Clone)]
pub struct EffectScope {
    pub(crate) inner: Rc<EffectScopeInner>,
}

impl EffectScope {
    /// Whether the scope has not been stopped
    pub fn active(&self) -> bool {
        self.inner.is_active()
    }

    /// Run `f` with this scope ambient; effects created inside register into
    /// it. Returns `None` (with a diagnostic) on a stopped scope.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        self.inner.run(f)
    }

    /// Manually push this scope as the ambient scope
    pub fn on(&self) {
        self.inner.on();
    }

    /// Manually pop this scope, restoring the previous ambient scope
    pub fn off(&self) {
        self.inner.off();
    }

    /// Stop every owned effect and child scope, run all cleanups, and detach
    /// from the parent scope. Idempotent.
    pub fn stop(&self) {
        self.inner.stop(false);
    }
}

impl Drop for EffectScope {
    fn drop(&mut self) {
        // The parent (or a clone) keeps the scope alive; the last handle of
        // an unowned scope disposes it
        if Rc::strong_count(&self.inner) == 1 {
            self.inner.stop(false);
        }
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect scope. A detached scope ignores the ambient scope and is
/// not stopped by it.
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope {
        inner: EffectScopeInner::new(detached),
    }
}

/// The currently ambient scope, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    get_active_scope().map(|inner| EffectScope { inner })
}

/// Register a cleanup on the ambient scope.
///
/// With no ambient scope the callback is dropped with a diagnostic.
pub fn on_scope_dispose<F: FnOnce() + 'static>(f: F) {
    match get_active_scope() {
        Some(scope) => scope.add_cleanup(Box::new(f)),
        None => {
            tracing::warn!("on_scope_dispose called with no ambient scope; callback dropped");
        }
    }
}

/// Record a freshly created effect into its owning scope.
///
/// An explicit scope wins over the ambient one. Returns the chosen scope so
/// the effect can keep a back-reference.
pub(crate) fn register_effect(
    effect: Rc<dyn AnyEffect>,
    explicit: Option<&EffectScope>,
) -> Option<Rc<EffectScopeInner>> {
    let owner = match explicit {
        Some(scope) => Some(scope.inner.clone()),
        None => get_active_scope(),
    };
    match owner {
        Some(scope) if scope.is_active() => {
            scope.add_effect(effect);
            Some(scope)
        }
        Some(_) => {
            tracing::warn!("effect created against a stopped scope; not registered");
            None
        }
        None => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::core::value::record;
    use crate::observe::view::reactive;
    use crate::primitives::effect::effect;

    #[test]
    fn scope_run_returns_value_and_restores_ambient() {
        let scope = effect_scope(false);
        assert!(get_current_scope().is_none());

        let result = scope.run(|| {
            assert!(get_current_scope().is_some());
            42
        });

        assert_eq!(result, Some(42));
        assert!(get_current_scope().is_none());
    }

    #[test]
    fn stopped_scope_run_returns_none() {
        let scope = effect_scope(false);
        scope.stop();
        assert_eq!(scope.run(|| 42), None);
    }

    #[test]
    fn stop_disposes_owned_effects() {
        let runs = Rc::new(Cell::new(0));
        let state = reactive(record([("a", 1.into())]));
        let scope = effect_scope(false);

        scope.run(|| {
            let runs2 = runs.clone();
            let state2 = state.clone();
            let _owned = effect(move || {
                let _ = state2.get("a");
                runs2.set(runs2.get() + 1);
            });
        });
        assert_eq!(runs.get(), 1);

        state.set("a", 2);
        assert_eq!(runs.get(), 2);

        scope.stop();
        state.set("a", 3);
        assert_eq!(runs.get(), 2, "owned effect is stopped with the scope");
    }

    #[test]
    fn cleanups_run_once_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let scope = effect_scope(false);

        scope.run(|| {
            let o1 = order.clone();
            let o2 = order.clone();
            let o3 = order.clone();
            on_scope_dispose(move || o1.borrow_mut().push(1));
            on_scope_dispose(move || o2.borrow_mut().push(2));
            on_scope_dispose(move || o3.borrow_mut().push(3));
        });

        scope.stop();
        assert_eq!(*order.borrow(), vec![1, 2, 3]);

        scope.stop();
        assert_eq!(*order.borrow(), vec![1, 2, 3], "stop is idempotent");
    }

    #[test]
    fn nested_scopes_stop_transitively() {
        let outer_cleanup = Rc::new(Cell::new(false));
        let inner_cleanup = Rc::new(Cell::new(false));
        let outer = effect_scope(false);

        let inner = outer
            .run(|| {
                let oc = outer_cleanup.clone();
                on_scope_dispose(move || oc.set(true));

                let inner = effect_scope(false);
                let ic = inner_cleanup.clone();
                inner.run(move || on_scope_dispose(move || ic.set(true)));
                inner
            })
            .unwrap();

        outer.stop();
        assert!(outer_cleanup.get());
        assert!(inner_cleanup.get(), "child scope stopped by cascade");
        assert!(!inner.active());
    }

    #[test]
    fn detached_scope_survives_parent_stop() {
        let cleanup = Rc::new(Cell::new(false));
        let parent = effect_scope(false);

        let detached = parent
            .run(|| {
                let scope = effect_scope(true);
                let c = cleanup.clone();
                scope.run(move || on_scope_dispose(move || c.set(true)));
                scope
            })
            .unwrap();

        parent.stop();
        assert!(!cleanup.get(), "detached scope ignores the cascade");
        assert!(detached.active());

        detached.stop();
        assert!(cleanup.get());
    }

    #[test]
    fn child_stop_detaches_with_swap_remove() {
        let parent = effect_scope(false);

        let (first, second, third) = parent
            .run(|| (effect_scope(false), effect_scope(false), effect_scope(false)))
            .unwrap();

        // Stopping the first child swaps the last into its slot
        first.stop();
        assert!(!first.active());
        assert!(second.active() && third.active());

        // The swapped child must still detach cleanly from its new slot
        third.stop();
        assert!(!third.active());

        parent.stop();
        assert!(!second.active());
    }

    #[test]
    fn on_off_manually_manage_ambient_scope() {
        let scope = effect_scope(false);
        assert!(get_current_scope().is_none());

        scope.on();
        assert!(get_current_scope().is_some());

        let cleanup = Rc::new(Cell::new(false));
        let c = cleanup.clone();
        on_scope_dispose(move || c.set(true));

        scope.off();
        assert!(get_current_scope().is_none());

        scope.stop();
        assert!(cleanup.get(), "cleanup registered during on/off window ran");
    }

    #[test]
    fn dispose_outside_scope_is_dropped() {
        // Must not panic, the callback is simply never called
        on_scope_dispose(|| panic!("must not run"));
    }

    #[test]
    fn explicit_scope_option_overrides_ambient() {
        use crate::primitives::effect::{effect_with_options, EffectOptions};

        let runs = Rc::new(Cell::new(0));
        let state = reactive(record([("a", 1.into())]));
        let explicit = effect_scope(false);
        let ambient = effect_scope(false);

        ambient.run(|| {
            let runs2 = runs.clone();
            let state2 = state.clone();
            let _handle = effect_with_options(
                move || {
                    let _ = state2.get("a");
                    runs2.set(runs2.get() + 1);
                },
                EffectOptions {
                    scope: Some(explicit.clone()),
                    ..Default::default()
                },
            );
        });
        assert_eq!(runs.get(), 1);

        // Stopping the ambient scope must not touch the effect
        ambient.stop();
        state.set("a", 2);
        assert_eq!(runs.get(), 2);

        explicit.stop();
        state.set("a", 3);
        assert_eq!(runs.get(), 2, "explicit owner stops the effect");
    }
}

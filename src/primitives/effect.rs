// ============================================================================
// trellis-reactive - Effect
// The unit of reactive computation: re-runs when its reads change
// ============================================================================
//
// An effect makes itself the ambient subscriber while its function runs, so
// every tracked read inside subscribes it. Stale subscriptions are pruned
// with the generation-bitmask algorithm at bounded nesting depth, and by a
// full unsubscribe-then-resubscribe beyond it.
//
// Reentrancy is handled by an ancestor-chain walk: a trigger that resolves an
// effect already on the call stack is silently dropped unless the effect
// opted into recursion.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::core::constants::MAX_MARKER_BITS;
use crate::core::context::with_context;
use crate::core::types::{effect_ptr, AnyEffect, TrackEvent, TriggerEvent};
use crate::primitives::scope::{register_effect, EffectScope, EffectScopeInner};
use crate::reactivity::dep::Dep;
use crate::reactivity::tracking::cleanup_effect;

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// The wrapped computation of an effect
pub type EffectFn<T> = Box<dyn FnMut() -> T>;

/// Custom invocation policy installed instead of a direct re-run
pub type SchedulerFn = Box<dyn Fn()>;

// =============================================================================
// OPTIONS
// =============================================================================

/// Configuration for `effect_with_options`.
#[derive(Default)]
pub struct EffectOptions {
    /// Skip the first immediate run
    pub lazy: bool,
    /// Invoked by triggers instead of re-running directly
    pub scheduler: Option<SchedulerFn>,
    /// Explicit owning scope (ambient scope is used otherwise)
    pub scope: Option<EffectScope>,
    /// Permit the effect to re-trigger itself (meaningful with a scheduler)
    pub allow_recurse: bool,
    /// Invoked once when the effect is stopped
    pub on_stop: Option<Box<dyn FnOnce()>>,
    /// Diagnostic hook: a dependency edge was recorded for this effect
    pub on_track: Option<Box<dyn Fn(&TrackEvent)>>,
    /// Diagnostic hook: a write is about to re-invoke this effect
    pub on_trigger: Option<Box<dyn Fn(&TriggerEvent)>>,
}

// =============================================================================
// EFFECT INNER
// =============================================================================

/// The inner effect implementation. `T` is the function's result type; the
/// dependency graph only ever sees the type-erased `AnyEffect` face.
pub struct EffectInner<T> {
    /// False once stopped; inactive effects run untracked
    pub(crate) active: Cell<bool>,

    /// Stop requested while this effect was the running effect
    defer_stop: Cell<bool>,

    pub(crate) allow_recurse: Cell<bool>,

    /// Marks the invalidator effect inside a computed value
    pub(crate) computed_marker: Cell<bool>,

    /// The wrapped function
    fn_: RefCell<Option<EffectFn<T>>>,

    /// Dependency sets this effect belongs to (its own back-references)
    deps: RefCell<SmallVec<[Rc<Dep>; 4]>>,

    pub(crate) scheduler: RefCell<Option<SchedulerFn>>,

    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    on_track: RefCell<Option<Box<dyn Fn(&TrackEvent)>>>,
    on_trigger: RefCell<Option<Box<dyn Fn(&TriggerEvent)>>>,

    /// The previously-active effect; set for the duration of a run only
    parent: RefCell<Option<Weak<dyn AnyEffect>>>,

    /// The owning scope recorded at construction, if any
    pub(crate) scope: RefCell<Option<Weak<EffectScopeInner>>>,

    /// Weak self-reference for trait-object conversion
    self_weak: RefCell<Weak<EffectInner<T>>>,
}

impl<T: 'static> EffectInner<T> {
    pub(crate) fn new(f: EffectFn<T>) -> Rc<Self> {
        let effect = Rc::new(Self {
            active: Cell::new(true),
            defer_stop: Cell::new(false),
            allow_recurse: Cell::new(false),
            computed_marker: Cell::new(false),
            fn_: RefCell::new(Some(f)),
            deps: RefCell::new(SmallVec::new()),
            scheduler: RefCell::new(None),
            on_stop: RefCell::new(None),
            on_track: RefCell::new(None),
            on_trigger: RefCell::new(None),
            parent: RefCell::new(None),
            scope: RefCell::new(None),
            self_weak: RefCell::new(Weak::new()),
        });
        *effect.self_weak.borrow_mut() = Rc::downgrade(&effect);
        effect
    }

    /// This effect as a graph subscriber
    pub(crate) fn as_any_effect(&self) -> Option<Rc<dyn AnyEffect>> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnyEffect>)
    }

    /// Run the wrapped function.
    ///
    /// Inactive effects execute once with no dependency bookkeeping. Active
    /// effects become the ambient subscriber for the duration, prepare the
    /// held dependency sets for stale pruning, and finalize on every exit
    /// path. Returns `None` only when the run was aborted by the reentrancy
    /// guard (this effect is already on the call stack).
    pub fn run(self: &Rc<Self>) -> Option<T> {
        if !self.active.get() {
            let mut slot = self.fn_.borrow_mut();
            return slot.as_mut().map(|f| f());
        }

        // Ancestor-chain cycle guard
        let self_ptr = Rc::as_ptr(self) as *const ();
        let mut cursor = with_context(|ctx| ctx.get_active_effect());
        while let Some(ancestor) = cursor {
            if effect_ptr(&ancestor) == self_ptr {
                return None;
            }
            cursor = ancestor.parent();
        }

        let erased: Rc<dyn AnyEffect> = self.clone();

        let (prev_effect, prev_track, depth, bit) = with_context(|ctx| {
            let prev_effect = ctx.set_active_effect(Some(erased.clone()));
            let prev_track = ctx.should_track.replace(true);
            let depth = ctx.enter_depth();
            (prev_effect, prev_track, depth, ctx.track_op_bit.get())
        });
        *self.parent.borrow_mut() = prev_effect.as_ref().map(Rc::downgrade);

        if depth <= MAX_MARKER_BITS {
            // Stamp every held set; sets not re-stamped by reads are stale
            for dep in self.deps.borrow().iter() {
                dep.mark_was_tracked(bit);
            }
        } else {
            // Depth overflow: plain full unsubscribe, reads resubscribe
            cleanup_effect(&erased);
        }

        // Finalization must happen even when the function panics through us
        struct RunGuard<T: 'static> {
            effect: Rc<EffectInner<T>>,
            prev_effect: Option<Rc<dyn AnyEffect>>,
            prev_track: bool,
            depth: u32,
            bit: u32,
        }

        impl<T: 'static> Drop for RunGuard<T> {
            fn drop(&mut self) {
                if self.depth <= MAX_MARKER_BITS {
                    let ptr = Rc::as_ptr(&self.effect) as *const ();
                    self.effect.finalize_markers(self.bit, ptr);
                }
                with_context(|ctx| {
                    ctx.exit_depth();
                    ctx.set_active_effect(self.prev_effect.take());
                    ctx.should_track.set(self.prev_track);
                });
                *self.effect.parent.borrow_mut() = None;
                if self.effect.defer_stop.replace(false) {
                    self.effect.stop_now();
                }
            }
        }

        let _guard = RunGuard {
            effect: self.clone(),
            prev_effect,
            prev_track,
            depth,
            bit,
        };

        let mut slot = self.fn_.borrow_mut();
        slot.as_mut().map(|f| f())
    }

    /// Drop memberships that were held before this run but not re-tracked
    /// during it, and clear this depth's generation bits.
    fn finalize_markers(&self, bit: u32, self_ptr: *const ()) {
        let mut deps = self.deps.borrow_mut();
        deps.retain(|dep| {
            let stale = dep.was_tracked(bit) && !dep.new_tracked(bit);
            if stale {
                dep.remove(self_ptr);
            }
            dep.clear_marker_bits(bit);
            !stale
        });
    }

    /// Stop the effect: sever every dependency-set membership, run the
    /// disposal callback, and go permanently inactive. Idempotent. Stopping
    /// the currently-running effect is honored when its run finishes.
    pub fn stop(self: &Rc<Self>) {
        let self_ptr = Rc::as_ptr(self) as *const ();
        let is_running = with_context(|ctx| {
            ctx.get_active_effect()
                .is_some_and(|active| effect_ptr(&active) == self_ptr)
        });
        if is_running {
            self.defer_stop.set(true);
            return;
        }
        self.stop_now();
    }

    fn stop_now(self: &Rc<Self>) {
        if !self.active.get() {
            return;
        }
        self.active.set(false);
        if let Some(erased) = self.as_any_effect() {
            cleanup_effect(&erased);
        }
        if let Some(callback) = self.on_stop.borrow_mut().take() {
            callback();
        }
    }
}

// =============================================================================
// AnyEffect IMPLEMENTATION
// =============================================================================

impl<T: 'static> AnyEffect for EffectInner<T> {
    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn allow_recurse(&self) -> bool {
        self.allow_recurse.get()
    }

    fn is_computed(&self) -> bool {
        self.computed_marker.get()
    }

    fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    fn add_dep(&self, dep: Rc<Dep>) {
        self.deps.borrow_mut().push(dep);
    }

    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<Dep>)) {
        for dep in self.deps.borrow().iter() {
            f(dep);
        }
    }

    fn clear_deps(&self) {
        self.deps.borrow_mut().clear();
    }

    fn run_erased(&self) {
        if let Some(rc) = self.self_weak.borrow().upgrade() {
            let _ = rc.run();
        }
    }

    fn stop_erased(&self) {
        if let Some(rc) = self.self_weak.borrow().upgrade() {
            rc.stop();
        }
    }

    fn has_scheduler(&self) -> bool {
        self.scheduler.borrow().is_some()
    }

    fn run_scheduler(&self) {
        let slot = self.scheduler.borrow();
        if let Some(scheduler) = &*slot {
            scheduler();
        }
    }

    fn parent(&self) -> Option<Rc<dyn AnyEffect>> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn notify_track(&self, event: &TrackEvent) {
        let slot = self.on_track.borrow();
        if let Some(hook) = &*slot {
            hook(event);
        }
    }

    fn notify_trigger(&self, event: &TriggerEvent) {
        let slot = self.on_trigger.borrow();
        if let Some(hook) = &*slot {
            hook(event);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// PUBLIC HANDLE
// =============================================================================

/// Disposable handle to a running effect.
///
/// Cloning shares the underlying effect. Dropping the last handle of an
/// effect that no scope owns stops it.
pub struct Effect {
    inner: Rc<EffectInner<()>>,
}

impl Effect {
    /// Re-run the effect function immediately
    pub fn run(&self) {
        let _ = self.inner.run();
    }

    /// Stop the effect permanently; subsequent calls are no-ops
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        // A scope (or another handle) holding the effect keeps it alive;
        // otherwise the last handle going away disposes it
        if Rc::strong_count(&self.inner) == 1 {
            self.inner.stop();
        }
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect that re-runs `f` whenever its tracked reads change.
///
/// Runs `f` once immediately to collect the initial dependencies.
///
/// # Example
///
/// ```ignore
/// let state = reactive(record([("count", 0.into())]));
///
/// let state2 = state.clone();
/// let handle = effect(move || {
///     println!("count is {:?}", state2.get("count"));
/// });
///
/// state.set("count", 1); // effect re-runs before set returns
/// handle.stop();
/// state.set("count", 2); // no longer observed
/// ```
pub fn effect<F>(f: F) -> Effect
where
    F: FnMut() + 'static,
{
    effect_with_options(f, EffectOptions::default())
}

/// Create an effect with explicit configuration.
pub fn effect_with_options<F>(mut f: F, options: EffectOptions) -> Effect
where
    F: FnMut() + 'static,
{
    let inner = EffectInner::new(Box::new(move || {
        f();
    }));

    inner.allow_recurse.set(options.allow_recurse);
    *inner.scheduler.borrow_mut() = options.scheduler;
    *inner.on_stop.borrow_mut() = options.on_stop;
    *inner.on_track.borrow_mut() = options.on_track;
    *inner.on_trigger.borrow_mut() = options.on_trigger;

    if let Some(erased) = inner.as_any_effect() {
        if let Some(owner) = register_effect(erased, options.scope.as_ref()) {
            *inner.scope.borrow_mut() = Some(Rc::downgrade(&owner));
        }
    }

    if !options.lazy {
        let _ = inner.run();
    }

    Effect { inner }
}

// =============================================================================
// TESTS
// =============================================================================

// ============================================================================
// trellis-reactive - Type Definitions
// Type-erased effect interface for the dependency graph
// ============================================================================

use std::any::Any;
use std::rc::Rc;

use crate::core::constants::{OpKind, TriggerKind};
use crate::core::value::{Key, Value};
use crate::reactivity::dep::Dep;

// =============================================================================
// DEBUGGER EVENTS
// =============================================================================

/// Payload handed to an effect's `on_track` hook when a dependency edge is
/// recorded on its behalf.
#[derive(Debug, Clone)]
pub struct TrackEvent {
    /// Identity of the observed object (or ref/computed)
    pub target: u64,
    /// The read operation that created the edge
    pub op: OpKind,
    /// The key the edge is recorded under
    pub key: Key,
}

/// Payload handed to an effect's `on_trigger` hook just before a write
/// re-invokes it.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    /// Identity of the written object
    pub target: u64,
    /// The write operation that resolved this effect
    pub op: TriggerKind,
    /// The written key (`None` for whole-object clears)
    pub key: Option<Key>,
    /// The incoming value, when the operation has one
    pub new_value: Option<Value>,
    /// The replaced/removed value, when known
    pub old_value: Option<Value>,
}

// =============================================================================
// TYPE-ERASED EFFECT TRAIT
// =============================================================================
//
// Graph operations (subscribe, invalidate, invoke) don't need to know the
// result type of the effect function. Only `run()` on the concrete
// `EffectInner<T>` does. Dependency sets therefore store `Weak<dyn AnyEffect>`
// while the typed wrappers (`Effect`, `Computed<T>`) keep the concrete Rc.
// =============================================================================

/// Type-erased subscriber interface implemented by `EffectInner<T>`.
pub trait AnyEffect: Any {
    /// Whether the effect has not been stopped
    fn is_active(&self) -> bool;

    /// Whether the effect may re-trigger itself from within its own run
    fn allow_recurse(&self) -> bool;

    /// Whether this effect is the invalidator of a cached computed value.
    /// Computed invalidators are invoked before plain effects so a dependent
    /// effect never reads a stale cache mid-propagation.
    fn is_computed(&self) -> bool {
        false
    }

    /// Number of dependency sets this effect currently belongs to
    fn dep_count(&self) -> usize;

    /// Record membership in a dependency set (the effect's own back-reference)
    fn add_dep(&self, dep: Rc<Dep>);

    /// Iterate the dependency sets this effect belongs to
    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<Dep>));

    /// Forget all dependency-set memberships (sets themselves already updated)
    fn clear_deps(&self);

    /// Re-run the effect, discarding its result
    fn run_erased(&self);

    /// Stop the effect through the erased interface (scope cascades)
    fn stop_erased(&self);

    /// Whether a custom scheduler overrides direct invocation
    fn has_scheduler(&self) -> bool;

    /// Invoke the scheduler (only called when `has_scheduler`)
    fn run_scheduler(&self);

    /// The effect that was active when this one started running, if any.
    /// Only meaningful while the effect is on the call stack.
    fn parent(&self) -> Option<Rc<dyn AnyEffect>>;

    /// Dispatch the `on_track` diagnostic hook, if installed
    fn notify_track(&self, event: &TrackEvent);

    /// Dispatch the `on_trigger` diagnostic hook, if installed
    fn notify_trigger(&self, event: &TriggerEvent);

    /// Upcast for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Stable identity of an effect, used for membership and self-trigger checks.
pub fn effect_ptr(effect: &Rc<dyn AnyEffect>) -> *const () {
    Rc::as_ptr(effect) as *const ()
}

// ============================================================================
// trellis-reactive - Views & View Caches
// Wrapped handles over raw objects, one cache per wrapping mode
// ============================================================================
//
// A view is a capability-tagged handle {raw, mode}; all interception is
// dispatched on the static mode tag. The four caches guarantee referential
// stability: wrapping the same raw object in the same mode always yields the
// same view allocation.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::value::{ObjRef, Value};

// =============================================================================
// VIEW MODE
// =============================================================================

/// The four wrapping-mode combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl ViewMode {
    /// Writes through this mode are rejected
    pub fn is_readonly(self) -> bool {
        matches!(self, ViewMode::Readonly | ViewMode::ShallowReadonly)
    }

    /// Nested objects are returned unwrapped and refs are not unwrapped
    pub fn is_shallow(self) -> bool {
        matches!(self, ViewMode::ShallowReactive | ViewMode::ShallowReadonly)
    }

    fn cache_slot(self) -> usize {
        match self {
            ViewMode::Reactive => 0,
            ViewMode::ShallowReactive => 1,
            ViewMode::Readonly => 2,
            ViewMode::ShallowReadonly => 3,
        }
    }
}

// =============================================================================
// VIEW
// =============================================================================

struct ViewInner {
    raw: ObjRef,
    mode: ViewMode,
}

/// A wrapped, intercepted handle over a raw object.
#[derive(Clone)]
pub struct View {
    inner: Rc<ViewInner>,
}

impl View {
    /// The raw object this view observes
    pub fn raw(&self) -> &ObjRef {
        &self.inner.raw
    }

    pub fn mode(&self) -> ViewMode {
        self.inner.mode
    }

    /// Referential identity: true only for the same cached view allocation
    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View<{:?}>({:?})", self.inner.mode, self.inner.raw)
    }
}

// =============================================================================
// VIEW CACHES
// =============================================================================

thread_local! {
    /// raw id -> view, one map per mode. Weak-valued so an otherwise
    /// unreferenced view (and its raw) can be collected.
    static VIEW_CACHES: RefCell<[HashMap<u64, Weak<ViewInner>>; 4]> =
        RefCell::new([HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new()]);
}

fn cached_or_new(raw: ObjRef, mode: ViewMode) -> View {
    VIEW_CACHES.with(|caches| {
        let mut caches = caches.borrow_mut();
        let cache = &mut caches[mode.cache_slot()];

        if let Some(existing) = cache.get(&raw.id()).and_then(Weak::upgrade) {
            return View { inner: existing };
        }

        let inner = Rc::new(ViewInner { raw, mode });
        cache.insert(inner.raw.id(), Rc::downgrade(&inner));
        View { inner }
    })
}

// =============================================================================
// WRAPPING
// =============================================================================

/// Wrap a value in the given mode, honoring the cache invariants.
///
/// - Primitives, skipped and sealed objects pass through unchanged.
/// - An existing view passes through unchanged, except when a readonly mode
///   wraps a mutable view: that produces the readonly view over the same raw.
pub(crate) fn wrap(value: Value, mode: ViewMode) -> Value {
    match value {
        Value::View(view) => {
            if mode.is_readonly() && !view.mode().is_readonly() {
                Value::View(cached_or_new(view.raw().clone(), mode))
            } else {
                Value::View(view)
            }
        }
        Value::Obj(raw) => {
            if raw.is_skipped() || raw.is_sealed() {
                tracing::debug!(id = raw.id(), "object is opted out of wrapping");
                return Value::Obj(raw);
            }
            Value::View(cached_or_new(raw, mode))
        }
        other => {
            tracing::debug!("value is not a structured object and cannot be wrapped");
            other
        }
    }
}

/// Wrap a value as a deep mutable view.
///
/// Idempotent and identity-stable: wrapping the same raw object twice yields
/// the same view, and wrapping an existing view returns it unchanged.
///
/// # Example
///
/// ```ignore
/// let state = reactive(record([("count", 0.into())]));
/// let again = reactive(state.clone());
/// assert_eq!(state, again);
/// ```
pub fn reactive(value: Value) -> Value {
    wrap(value, ViewMode::Reactive)
}

/// Wrap a value as a deep readonly view. Writes and deletes through it are
/// rejected with a diagnostic and no state change.
pub fn readonly(value: Value) -> Value {
    wrap(value, ViewMode::Readonly)
}

/// Wrap a value as a root-only mutable view: nested objects come back raw and
/// refs are not unwrapped.
pub fn shallow_reactive(value: Value) -> Value {
    wrap(value, ViewMode::ShallowReactive)
}

/// Wrap a value as a root-only readonly view.
pub fn shallow_readonly(value: Value) -> Value {
    wrap(value, ViewMode::ShallowReadonly)
}

// =============================================================================
// FLAGS & RAW ACCESS
// =============================================================================

/// The raw form of a value: the observed object for views, the value itself
/// otherwise.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::View(view) => Value::Obj(view.raw().clone()),
        other => other.clone(),
    }
}

/// Whether the value is a mutable (reactive) view.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::View(view) if !view.mode().is_readonly())
}

/// Whether the value is a readonly view or a readonly ref.
pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::View(view) => view.mode().is_readonly(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

/// Whether the value is a shallow view of either mutability.
pub fn is_shallow(value: &Value) -> bool {
    matches!(value, Value::View(view) if view.mode().is_shallow())
}

/// Opt an object out of wrapping permanently.
///
/// Future wrap calls return the raw object unchanged. Views cached before the
/// mark keep working; marking through a view marks its raw object.
pub fn mark_skip(value: &Value) {
    match value {
        Value::Obj(raw) => raw.set_skip(),
        Value::View(view) => view.raw().set_skip(),
        _ => tracing::debug!("mark_skip ignored: value is not a structured object"),
    }
}

/// Mark an object non-extensible; non-extensible objects are never wrapped.
pub fn seal(value: &Value) {
    match value {
        Value::Obj(raw) => raw.set_sealed(),
        Value::View(view) => view.raw().set_sealed(),
        _ => tracing::debug!("seal ignored: value is not a structured object"),
    }
}

// =============================================================================
// TESTS
// =============================================================================

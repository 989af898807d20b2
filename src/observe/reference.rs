// ============================================================================
// trellis-reactive - Ref-like Boxes
// Single-slot reactive containers, auto-unwrapped by deep record reads
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::core::constants::{OpKind, TriggerKind};
use crate::core::context::next_id;
use crate::core::value::{has_changed, Key, Value};
use crate::observe::view::{is_readonly, is_shallow, to_raw, wrap, ViewMode};
use crate::reactivity::tracking::{track, trigger_key};

// =============================================================================
// REF BOX
// =============================================================================

struct RefInner {
    id: u64,
    value: RefCell<Value>,
    readonly: bool,
}

/// A ref-like box: one observable slot with its own dependency edge.
///
/// Stored inside a deep view, a ref is unwrapped on read and written through
/// on assignment (except at list integer indices). The slot always holds the
/// raw form of its payload; structured payloads are wrapped on read.
#[derive(Clone)]
pub struct RefBox {
    inner: Rc<RefInner>,
}

impl RefBox {
    fn new(value: Value, readonly: bool) -> Self {
        Self {
            inner: Rc::new(RefInner {
                id: next_id(),
                value: RefCell::new(to_raw(&value)),
                readonly,
            }),
        }
    }

    /// Identity of this box in the dependency store
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether writes to this box are rejected
    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    pub fn ptr_eq(&self, other: &RefBox) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the boxed value, recording a dependency edge.
    ///
    /// Structured payloads come back wrapped: readonly for readonly boxes,
    /// reactive otherwise.
    pub fn get(&self) -> Value {
        track(self.inner.id, OpKind::Get, Key::value_slot());
        let value = self.inner.value.borrow().clone();
        match value {
            Value::Obj(_) => {
                let mode = if self.inner.readonly {
                    ViewMode::Readonly
                } else {
                    ViewMode::Reactive
                };
                wrap(value, mode)
            }
            other => other,
        }
    }

    /// Read without recording a dependency edge or wrapping.
    pub fn get_untracked(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Replace the boxed value, notifying subscribers on change.
    ///
    /// Readonly boxes reject the write (diagnostic only, returns `false`).
    pub fn set(&self, value: Value) -> bool {
        if self.inner.readonly {
            tracing::warn!("set ignored: ref is readonly");
            return false;
        }

        // Readonly/shallow views keep their identity; everything else is
        // stored in raw form
        let incoming = if is_readonly(&value) || is_shallow(&value) {
            value
        } else {
            to_raw(&value)
        };

        let changed = {
            let slot = self.inner.value.borrow();
            has_changed(&slot, &incoming)
        };
        if changed {
            *self.inner.value.borrow_mut() = incoming;
            // Borrow released before subscribers run
            trigger_key(self.inner.id, TriggerKind::Set, Key::value_slot());
        }
        true
    }
}

impl fmt::Debug for RefBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RefBox#{}{}",
            self.inner.id,
            if self.inner.readonly { "<readonly>" } else { "" }
        )
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create a mutable ref-like box holding `value`.
pub fn ref_box(value: impl Into<Value>) -> Value {
    Value::Ref(RefBox::new(value.into(), false))
}

/// Create a readonly ref-like box holding `value`.
///
/// Writing through it is rejected, and overwriting it with a plain value
/// through a containing view is rejected as well.
pub fn readonly_ref_box(value: impl Into<Value>) -> Value {
    Value::Ref(RefBox::new(value.into(), true))
}

/// Whether a value is a ref-like box.
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// Unwrap one level of ref-like boxing: the tracked inner value for refs,
/// the value itself otherwise.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_box_round_trip() {
        let boxed = ref_box(5);
        let Value::Ref(r) = &boxed else {
            panic!("expected a ref");
        };
        assert_eq!(r.get(), Value::Int(5));
        assert!(r.set(Value::Int(7)));
        assert_eq!(r.get(), Value::Int(7));
    }

    #[test]
    fn readonly_ref_rejects_writes() {
        let boxed = readonly_ref_box("fixed");
        let Value::Ref(r) = &boxed else {
            panic!("expected a ref");
        };
        assert!(!r.set(Value::from("changed")));
        assert_eq!(r.get(), Value::from("fixed"));
    }

    #[test]
    fn unref_passes_plain_values_through() {
        assert_eq!(unref(&Value::Int(3)), Value::Int(3));
        let boxed = ref_box(3);
        assert_eq!(unref(&boxed), Value::Int(3));
    }

    #[test]
    fn is_ref_predicate() {
        assert!(is_ref(&ref_box(1)));
        assert!(!is_ref(&Value::Int(1)));
    }
}

// ============================================================================
// trellis-reactive - Reactive Context
// Thread-local ambient state for tracking and identity allocation
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::constants::INITIAL_TRACK_BIT;
use crate::core::types::AnyEffect;

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local context holding the ambient state of the reactive engine.
///
/// Everything here is mutated only on the single logical thread of execution;
/// a fresh context per thread also gives each test thread an isolated graph.
pub struct ReactiveContext {
    /// Currently executing effect, if any
    pub active_effect: RefCell<Option<Rc<dyn AnyEffect>>>,

    /// Whether reads currently record dependency edges
    pub should_track: Cell<bool>,

    /// Saved `should_track` values for pause/enable + reset
    pub track_stack: RefCell<Vec<bool>>,

    /// Current effect nesting depth (0 = no effect running)
    pub effect_track_depth: Cell<u32>,

    /// Bit identifying the current depth level in dep `w`/`n` masks
    pub track_op_bit: Cell<u32>,

    /// Identity allocator for observed objects, refs, and computed values
    next_id: Cell<u64>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            active_effect: RefCell::new(None),
            should_track: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
            effect_track_depth: Cell::new(0),
            track_op_bit: Cell::new(INITIAL_TRACK_BIT),
            next_id: Cell::new(1),
        }
    }

    /// Replace the active effect, returning the previous one
    pub fn set_active_effect(
        &self,
        effect: Option<Rc<dyn AnyEffect>>,
    ) -> Option<Rc<dyn AnyEffect>> {
        self.active_effect.replace(effect)
    }

    /// Get the active effect
    pub fn get_active_effect(&self) -> Option<Rc<dyn AnyEffect>> {
        self.active_effect.borrow().clone()
    }

    /// Whether reads should currently record edges
    pub fn is_tracking(&self) -> bool {
        self.should_track.get() && self.active_effect.borrow().is_some()
    }

    /// Enter the next effect nesting level, returning the new depth
    pub fn enter_depth(&self) -> u32 {
        let depth = self.effect_track_depth.get() + 1;
        self.effect_track_depth.set(depth);
        self.track_op_bit.set(1 << depth.min(31));
        depth
    }

    /// Leave the current effect nesting level
    pub fn exit_depth(&self) {
        let depth = self.effect_track_depth.get().saturating_sub(1);
        self.effect_track_depth.set(depth);
        self.track_op_bit.set(1 << depth.min(31));
    }

    /// Allocate a fresh identity
    pub fn alloc_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Whether an effect is active and reads are being tracked
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.is_tracking())
}

/// Allocate a fresh object/ref/computed identity
pub fn next_id() -> u64 {
    with_context(|ctx| ctx.alloc_id())
}

/// Suspend dependency tracking until the matching `reset_tracking`
pub fn pause_tracking() {
    with_context(|ctx| {
        ctx.track_stack.borrow_mut().push(ctx.should_track.get());
        ctx.should_track.set(false);
    });
}

/// Force-enable dependency tracking until the matching `reset_tracking`
pub fn enable_tracking() {
    with_context(|ctx| {
        ctx.track_stack.borrow_mut().push(ctx.should_track.get());
        ctx.should_track.set(true);
    });
}

/// Restore the tracking state saved by the last pause/enable
pub fn reset_tracking() {
    with_context(|ctx| {
        let last = ctx.track_stack.borrow_mut().pop();
        ctx.should_track.set(last.unwrap_or(true));
    });
}

/// Run a closure with dependency tracking suspended.
///
/// Reads inside the closure do not subscribe the surrounding effect.
///
/// # Example
///
/// ```ignore
/// let _run = effect(move || {
///     let a = state.get("a");            // tracked
///     let b = untracked(|| state.get("b")); // not tracked
/// });
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    pause_tracking();

    struct ResetGuard;
    impl Drop for ResetGuard {
        fn drop(&mut self) {
            reset_tracking();
        }
    }

    let _guard = ResetGuard;
    f()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_defaults() {
        with_context(|ctx| {
            assert!(ctx.should_track.get());
            assert!(ctx.active_effect.borrow().is_none());
            assert_eq!(ctx.effect_track_depth.get(), 0);
            assert_eq!(ctx.track_op_bit.get(), INITIAL_TRACK_BIT);
        });
        // No active effect means nothing is tracking
        assert!(!is_tracking());
    }

    #[test]
    fn depth_moves_track_bit() {
        with_context(|ctx| {
            assert_eq!(ctx.enter_depth(), 1);
            assert_eq!(ctx.track_op_bit.get(), 1 << 1);

            assert_eq!(ctx.enter_depth(), 2);
            assert_eq!(ctx.track_op_bit.get(), 1 << 2);

            ctx.exit_depth();
            assert_eq!(ctx.track_op_bit.get(), 1 << 1);

            ctx.exit_depth();
            assert_eq!(ctx.track_op_bit.get(), INITIAL_TRACK_BIT);
        });
    }

    #[test]
    fn pause_and_reset_nest() {
        with_context(|ctx| assert!(ctx.should_track.get()));

        pause_tracking();
        with_context(|ctx| assert!(!ctx.should_track.get()));

        pause_tracking();
        enable_tracking();
        with_context(|ctx| assert!(ctx.should_track.get()));

        reset_tracking();
        reset_tracking();
        with_context(|ctx| assert!(!ctx.should_track.get()));

        reset_tracking();
        with_context(|ctx| assert!(ctx.should_track.get()));
    }

    #[test]
    fn untracked_restores_on_exit() {
        let inside = untracked(|| with_context(|ctx| ctx.should_track.get()));
        assert!(!inside);
        with_context(|ctx| assert!(ctx.should_track.get()));
    }

    #[test]
    fn ids_are_unique() {
        let a = next_id();
        let b = next_id();
        let c = next_id();
        assert!(a < b && b < c);
    }
}

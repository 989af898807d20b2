// ============================================================================
// trellis-reactive - Dependency Set
// One subscriber set per (object, key) pair, with generation bitmasks
// ============================================================================
//
// The `w` ("was tracked") and `n` ("newly tracked") bitmasks implement the
// O(1)-amortized incremental cleanup: before an effect re-runs, it stamps the
// current depth bit into `w` on every set it belongs to; reads during the run
// stamp `n`. Sets whose `w` bit is still unmatched by `n` at the end of the
// run are stale and drop the effect. Both masks are meaningful only while a
// run at depth <= MAX_MARKER_BITS is in flight.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::core::types::{effect_ptr, AnyEffect};

/// A set of subscriber effects for one observed (object, key) pair.
pub struct Dep {
    /// Subscribers, held weakly so a dropped effect never leaks its sets
    subscribers: RefCell<SmallVec<[Weak<dyn AnyEffect>; 2]>>,

    /// Depth bits of runs that held this set before re-running
    pub(crate) w: Cell<u32>,

    /// Depth bits of runs that re-tracked this set
    pub(crate) n: Cell<u32>,
}

impl Dep {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            subscribers: RefCell::new(SmallVec::new()),
            w: Cell::new(0),
            n: Cell::new(0),
        })
    }

    /// Whether the set belonged to the run identified by `bit` before it started
    pub fn was_tracked(&self, bit: u32) -> bool {
        self.w.get() & bit > 0
    }

    /// Whether the set has been re-tracked during the run identified by `bit`
    pub fn new_tracked(&self, bit: u32) -> bool {
        self.n.get() & bit > 0
    }

    pub fn mark_was_tracked(&self, bit: u32) {
        self.w.set(self.w.get() | bit);
    }

    pub fn mark_new_tracked(&self, bit: u32) {
        self.n.set(self.n.get() | bit);
    }

    /// Clear this depth's generation bits once its run finalizes
    pub fn clear_marker_bits(&self, bit: u32) {
        self.w.set(self.w.get() & !bit);
        self.n.set(self.n.get() & !bit);
    }

    /// Direct membership check, used beyond the marker-depth bound
    pub fn contains(&self, ptr: *const ()) -> bool {
        self.subscribers.borrow().iter().any(|weak| {
            weak.upgrade()
                .is_some_and(|rc| effect_ptr(&rc) == ptr)
        })
    }

    pub fn add(&self, effect: &Rc<dyn AnyEffect>) {
        self.subscribers.borrow_mut().push(Rc::downgrade(effect));
    }

    /// Remove one subscriber by identity, sweeping dead entries on the way
    pub fn remove(&self, ptr: *const ()) {
        self.subscribers.borrow_mut().retain(|weak| {
            weak.upgrade()
                .is_some_and(|rc| effect_ptr(&rc) != ptr)
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Snapshot the live subscribers.
    ///
    /// Invocation must not happen while the subscriber list is borrowed (an
    /// invoked effect may re-track into this very set), so triggering always
    /// collects first.
    pub fn collect_live(&self) -> Vec<Rc<dyn AnyEffect>> {
        self.subscribers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

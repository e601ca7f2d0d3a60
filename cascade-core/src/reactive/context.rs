//! Propagation Context
//!
//! Notifications run inline: a `set` calls observers, which call `set` on
//! other cells, and so on. The propagation context records which nodes are
//! currently delivering notifications on this thread.
//!
//! # Implementation
//!
//! We use a thread-local stack. A node (an observable or an algorithm) pushes
//! its id before it calls out to user code and pops it when done. The stack
//! depth is the nesting level reported in trace logs, and membership lets an
//! algorithm notice that it is being re-triggered from inside its own update.

use std::cell::RefCell;

thread_local! {
    static PROPAGATION_STACK: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
///
/// The stack stays balanced even if a callback panics or returns an error.
pub struct PropagationContext {
    node_id: u64,
}

impl PropagationContext {
    /// Enter a propagation context for the given node.
    pub fn enter(node_id: u64) -> Self {
        PROPAGATION_STACK.with(|stack| stack.borrow_mut().push(node_id));
        Self { node_id }
    }

    /// Number of nested propagation contexts on this thread.
    pub fn depth() -> usize {
        PROPAGATION_STACK.with(|stack| stack.borrow().len())
    }

    /// The innermost node currently propagating, if any.
    pub fn current() -> Option<u64> {
        PROPAGATION_STACK.with(|stack| stack.borrow().last().copied())
    }

    /// Whether `node_id` is anywhere on the stack.
    pub fn contains(node_id: u64) -> bool {
        PROPAGATION_STACK.with(|stack| stack.borrow().contains(&node_id))
    }
}

impl Drop for PropagationContext {
    fn drop(&mut self) {
        PROPAGATION_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.node_id),
                "PropagationContext mismatch: expected {:?}, got {:?}",
                self.node_id,
                popped
            );
        });
    }
}

/// Allocate an id for a node. Observables and algorithms share one space so
/// their ids never collide on the stack.
pub(crate) fn next_node_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

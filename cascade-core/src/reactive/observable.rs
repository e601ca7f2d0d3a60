//! Observable Implementation
//!
//! An Observable is the fundamental reactive cell. It holds a value and a
//! list of observers that hear about every change.
//!
//! # How Observables Work
//!
//! 1. `set` compares the new value with the current one using the cell's
//!    equality test. Equal values are a no-op: nothing is stored and nobody
//!    is notified.
//!
//! 2. A changed value is stored first, then every observer is called in
//!    registration order.
//!
//! 3. Each observer receives the value current at the moment it is called.
//!    If an earlier observer re-enters and changes the cell, later observers
//!    see the newer value, never an older one.
//!
//! # Errors
//!
//! Observers may fail. The first error stops the notification pass and is
//! returned from `set`. Observers after the failing one are not called for
//! that change, and nothing is rolled back.
//!
//! # Thread Safety
//!
//! Handles are `Send + Sync` and clone cheaply. No lock is held while an
//! observer runs, so observers are free to read or write any cell.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::context::{next_node_id, PropagationContext};
use super::observer::{Callback, ObserverId, ObserverList};
use crate::error::Result;

/// Equality test deciding whether a write is a change.
///
/// Returns `true` when the two values count as the same.
pub type Equality<T> = fn(&T, &T) -> bool;

fn never_equal<T>(_: &T, _: &T) -> bool {
    false
}

struct ObservableInner<T> {
    /// Unique identifier for this cell.
    id: u64,

    /// The current value.
    value: RwLock<T>,

    /// Registered observers, in notification order.
    observers: ObserverList<T>,

    /// Change-detection test.
    equal: Equality<T>,
}

/// An observable value cell.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use cascade_core::reactive::Observable;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let o = Observable::new(1);
///
/// let sink = seen.clone();
/// o.observe(move |v| sink.lock().unwrap().push(*v));
///
/// o.set(2).unwrap();
/// o.set(2).unwrap(); // unchanged, no notification
/// assert_eq!(*seen.lock().unwrap(), vec![2]);
/// ```
pub struct Observable<T> {
    inner: Arc<ObservableInner<T>>,
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a cell that notifies when the value changes by `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, <T as PartialEq>::eq)
    }
}

impl<U> Observable<Option<U>>
where
    U: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a cell holding no value yet.
    pub fn unset() -> Self {
        Self::new(None)
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cell with a custom change-detection test.
    ///
    /// For identity semantics on shared values use `Arc::ptr_eq`.
    pub fn with_equality(value: T, equal: Equality<T>) -> Self {
        Self {
            inner: Arc::new(ObservableInner {
                id: next_node_id(),
                value: RwLock::new(value),
                observers: ObserverList::new(),
                equal,
            }),
        }
    }

    /// Create a cell that notifies on every write, even an equal one.
    pub fn always_notify(value: T) -> Self {
        Self::with_equality(value, never_equal::<T>)
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.value.read();
        f(&*guard)
    }

    /// Store a value and notify observers if it changed.
    pub fn set(&self, value: T) -> Result<()> {
        if self.store(value) {
            self.notify_observers()
        } else {
            Ok(())
        }
    }

    /// Register an observer that cannot fail.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.try_observe(move |value| {
            observer(value);
            Ok(())
        })
    }

    /// Register an observer whose error aborts the notification pass.
    pub fn try_observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.add_callback(Arc::new(observer))
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Call every observer with the current value, changed or not.
    pub fn notify_observers(&self) -> Result<()> {
        let observers = self.inner.observers.snapshot();
        if observers.is_empty() {
            return Ok(());
        }

        let _ctx = PropagationContext::enter(self.inner.id);
        trace!(
            observable = self.inner.id,
            depth = PropagationContext::depth(),
            observers = observers.len(),
            "notifying observers"
        );

        for observer in observers {
            // Re-read per observer so a re-entrant write is never overtaken
            let value = self.get();
            observer(&value)?;
        }
        Ok(())
    }

    /// Get the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn add_callback(&self, callback: Callback<T>) -> ObserverId {
        self.inner.observers.add(callback)
    }

    /// Write without notifying. Returns whether the value changed.
    pub(crate) fn store(&self, value: T) -> bool {
        let mut guard = self.inner.value.write();
        if (self.inner.equal)(&*guard, &value) {
            return false;
        }
        *guard = value;
        true
    }

    /// Apply this cell's equality test to two arbitrary values.
    pub(crate) fn same(&self, a: &T, b: &T) -> bool {
        (self.inner.equal)(a, b)
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Observable<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Observable<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("observer_count", &self.inner.observers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

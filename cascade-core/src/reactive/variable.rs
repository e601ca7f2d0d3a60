//! Variable Implementation
//!
//! A Variable is an [`Observable`] whose notifications can be held back.
//!
//! # Blocking
//!
//! Every Variable carries a second observable, the `blocked` flag. While the
//! flag is set:
//!
//! - `set` still stores the value, so `get` always returns the latest write.
//! - The notification is deferred. The written value is kept as `pending`.
//!
//! `unblock` delivers at most one notification, carrying the latest value,
//! and only if that value differs from the one held when the block started.
//! Any number of intermediate writes collapse into that single notification.
//!
//! The value notification is delivered while the flag is still set, and the
//! flag clears afterwards. Anything watching both (trackers, algorithms) sees
//! the new value arrive first and the "ready" signal second.
//!
//! # Diamonds
//!
//! In a graph `v1 -> (v2, v3) -> v4`, changing `v1` would recompute `v4` once
//! per path and briefly expose a mix of old and new inputs. Block the nodes
//! between the change and the convergence point, write, then unblock in any
//! order. Each node fires once, and algorithms re-read all of their inputs
//! when they run, so a late sibling never produces a stale result.
//!
//! # Tracking
//!
//! `track_variable` makes one Variable mirror another. Both the value and the
//! blocked flag follow the source, so blocking the root of a tracking chain
//! holds back the whole chain. A Variable tracks at most one source.
//!
//! # Thread Safety
//!
//! Individual operations are safe to call from any thread, but a
//! block / write / unblock sequence is not atomic. Drive each graph from one
//! thread at a time.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::link::LinkEntry;
use super::observable::{Equality, Observable};
use super::observer::ObserverId;
use crate::error::{Error, Result};

/// Subscriptions held on a tracked source.
struct Tracking<T>
where
    T: Clone + Send + Sync + 'static,
{
    source_id: u64,
    source: WeakVariable<T>,
    value_observer: ObserverId,
    blocked_observer: ObserverId,
}

impl<T> Tracking<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn detach(self) {
        if let Some(source) = self.source.upgrade() {
            source.inner.value.unobserve(self.value_observer);
            source.inner.blocked.unobserve(self.blocked_observer);
        }
    }
}

pub(crate) struct VariableInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    value: Observable<T>,
    blocked: Observable<bool>,

    /// Last value written while blocked and not yet announced.
    pending: Mutex<Option<T>>,

    /// Value held when the current block started.
    baseline: Mutex<Option<T>>,

    tracking: Mutex<Option<Tracking<T>>>,

    /// Link subscriptions this variable holds on its peers.
    pub(crate) links: Mutex<Vec<LinkEntry<T>>>,
}

impl<T> Drop for VariableInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(tracking) = self.tracking.get_mut().take() {
            tracking.detach();
        }
        for entry in self.links.get_mut().drain(..) {
            entry.detach();
        }
    }
}

/// A blockable observable value.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use cascade_core::reactive::Variable;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let v = Variable::new(3);
/// let sink = seen.clone();
/// v.observe(move |x| sink.lock().unwrap().push(*x));
///
/// v.block().unwrap();
/// v.set(4).unwrap();
/// v.set(5).unwrap();
/// assert_eq!(v.get(), 5);
/// v.unblock().unwrap();
///
/// assert_eq!(*seen.lock().unwrap(), vec![5]);
/// ```
pub struct Variable<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<VariableInner<T>>,
}

impl<T> Variable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a variable that notifies when the value changes by `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::from_cell(Observable::new(value))
    }
}

impl<U> Variable<Option<U>>
where
    U: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a variable holding no value yet.
    pub fn unset() -> Self {
        Self::new(None)
    }
}

impl<T> Variable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a variable with a custom change-detection test.
    pub fn with_equality(value: T, equal: Equality<T>) -> Self {
        Self::from_cell(Observable::with_equality(value, equal))
    }

    /// Create a variable that notifies on every write, even an equal one.
    pub fn always_notify(value: T) -> Self {
        Self::from_cell(Observable::always_notify(value))
    }

    fn from_cell(value: Observable<T>) -> Self {
        Self {
            inner: Arc::new(VariableInner {
                value,
                blocked: Observable::new(false),
                pending: Mutex::new(None),
                baseline: Mutex::new(None),
                tracking: Mutex::new(None),
                links: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get the variable's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.value.id()
    }

    /// Get the latest written value, blocked or not.
    pub fn get(&self) -> T {
        self.inner.value.get()
    }

    /// Borrow the latest written value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.value.with(f)
    }

    /// Write a value.
    ///
    /// Unblocked, this behaves like [`Observable::set`]. Blocked, the value is
    /// stored and the notification waits for [`unblock`](Self::unblock).
    pub fn set(&self, value: T) -> Result<()> {
        if self.is_blocked() {
            let pending = value.clone();
            self.inner.value.store(value);
            *self.inner.pending.lock() = Some(pending);
            trace!(variable = self.id(), "value held while blocked");
            return Ok(());
        }
        self.inner.value.set(value)
    }

    /// Register an observer that cannot fail.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.value.observe(observer)
    }

    /// Register an observer whose error aborts the notification pass.
    pub fn try_observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.value.try_observe(observer)
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.inner.value.unobserve(id)
    }

    /// Call every observer with the current value, bypassing change detection
    /// and the blocked flag.
    pub fn notify_observers(&self) -> Result<()> {
        self.inner.value.notify_observers()
    }

    /// Get the number of value observers.
    pub fn observer_count(&self) -> usize {
        self.inner.value.observer_count()
    }

    /// The observable blocked flag.
    ///
    /// Observe it to react to blocking, e.g. to show a busy indicator.
    pub fn blocked(&self) -> Observable<bool> {
        self.inner.blocked.clone()
    }

    /// Whether notifications are currently held back.
    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.get()
    }

    /// Start holding back notifications. Does nothing if already blocked.
    pub fn block(&self) -> Result<()> {
        if self.is_blocked() {
            return Ok(());
        }
        *self.inner.baseline.lock() = Some(self.get());
        debug!(variable = self.id(), "block");
        self.inner.blocked.set(true)
    }

    /// Stop holding back notifications and flush at most one of them.
    ///
    /// Does nothing if not blocked. If an observer fails during the flush the
    /// variable stays blocked with nothing pending; calling `unblock` again
    /// clears the flag.
    pub fn unblock(&self) -> Result<()> {
        if !self.is_blocked() {
            return Ok(());
        }

        // Writes made by our own observers during the flush land in
        // `pending` again and are flushed on the next turn.
        loop {
            let Some(pending) = self.inner.pending.lock().take() else {
                break;
            };
            let changed = match self.inner.baseline.lock().replace(pending.clone()) {
                Some(baseline) => !self.inner.value.same(&baseline, &pending),
                None => true,
            };
            if changed {
                debug!(variable = self.id(), "delivering coalesced value");
                self.inner.value.notify_observers()?;
            }
        }

        self.inner.baseline.lock().take();
        debug!(variable = self.id(), "unblock");
        self.inner.blocked.set(false)
    }

    /// Block or unblock.
    pub fn set_blocked(&self, blocked: bool) -> Result<()> {
        if blocked {
            self.block()
        } else {
            self.unblock()
        }
    }

    /// Run `f` with notifications held back, then flush once.
    pub fn coalesced<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.block()?;
        let result = f();
        self.unblock()?;
        Ok(result)
    }

    /// Mirror `source`: its value now, and every later change to its value
    /// and blocked flag.
    ///
    /// Replaces any source tracked before.
    pub fn track_variable(&self, source: &Variable<T>) -> Result<()> {
        if self.ptr_eq(source) {
            return Err(Error::SelfTracking);
        }
        // A block mirrored from the old source has no one left to lift it
        if self.detach_tracking() && self.is_blocked() && !source.is_blocked() {
            self.unblock()?;
        }

        let target = self.downgrade();
        let value_observer = source.inner.value.add_callback(Arc::new(move |value: &T| {
            match target.upgrade() {
                Some(target) => target.set(value.clone()),
                None => Ok(()),
            }
        }));
        let target = self.downgrade();
        let blocked_observer = source.inner.blocked.add_callback(Arc::new(move |blocked: &bool| {
            match target.upgrade() {
                Some(target) => target.set_blocked(*blocked),
                None => Ok(()),
            }
        }));

        *self.inner.tracking.lock() = Some(Tracking {
            source_id: source.id(),
            source: source.downgrade(),
            value_observer,
            blocked_observer,
        });
        debug!(variable = self.id(), source = source.id(), "track");

        if source.is_blocked() {
            self.block()?;
        }
        self.set(source.get())
    }

    /// Stop mirroring the tracked source and unblock.
    ///
    /// Returns `false` if nothing was tracked.
    pub fn stop_tracking(&self) -> Result<bool> {
        if !self.detach_tracking() {
            return Ok(false);
        }
        debug!(variable = self.id(), "stop tracking");
        self.unblock()?;
        Ok(true)
    }

    /// ID of the tracked source, if any.
    pub fn tracked_source_id(&self) -> Option<u64> {
        self.inner
            .tracking
            .lock()
            .as_ref()
            .map(|tracking| tracking.source_id)
    }

    /// Whether two handles refer to the same variable.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakVariable<T> {
        WeakVariable(Arc::downgrade(&self.inner))
    }

    pub(crate) fn value_cell(&self) -> &Observable<T> {
        &self.inner.value
    }

    pub(crate) fn blocked_cell(&self) -> &Observable<bool> {
        &self.inner.blocked
    }

    pub(crate) fn links(&self) -> &Mutex<Vec<LinkEntry<T>>> {
        &self.inner.links
    }

    fn detach_tracking(&self) -> bool {
        let previous = self.inner.tracking.lock().take();
        match previous {
            Some(tracking) => {
                tracking.detach();
                true
            }
            None => false,
        }
    }
}

/// Non-owning handle used inside observer closures, so that subscriptions
/// never keep their target alive.
pub(crate) struct WeakVariable<T>(Weak<VariableInner<T>>)
where
    T: Clone + Send + Sync + 'static;

impl<T> WeakVariable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn upgrade(&self) -> Option<Variable<T>> {
        self.0.upgrade().map(|inner| Variable { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl<T> Clone for Variable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Variable<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Variable<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.id())
            .field("value", &self.get())
            .field("blocked", &self.is_blocked())
            .field("tracking", &self.tracked_source_id())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn recorder<T: Clone + Send + Sync + 'static>(v: &Variable<T>) -> Arc<Mutex<Vec<T>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        v.observe(move |x| sink.lock().push(x.clone()));
        seen
    }

    #[test]
    fn unblocked_variable_behaves_like_observable() {
        let v = Variable::new(3);
        let seen = recorder(&v);

        v.set(3).unwrap();
        v.set(4).unwrap();
        assert_eq!(*seen.lock(), vec![4]);
    }

    #[test]
    fn blocked_writes_coalesce_into_one_notification() {
        let v = Variable::new(0);
        let seen = recorder(&v);

        v.block().unwrap();
        for i in 1..=10 {
            v.set(i).unwrap();
            // Readers always see the latest write
            assert_eq!(v.get(), i);
        }
        assert!(seen.lock().is_empty());

        v.unblock().unwrap();
        assert_eq!(*seen.lock(), vec![10]);
        assert!(!v.is_blocked());
    }

    #[test]
    fn unblock_without_change_is_silent() {
        let v = Variable::new(7);
        let seen = recorder(&v);

        v.block().unwrap();
        v.set(8).unwrap();
        v.set(7).unwrap();
        v.unblock().unwrap();

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn block_and_unblock_are_idempotent() {
        let v = Variable::new(1);
        let flag_changes = Arc::new(AtomicI32::new(0));
        let flag_clone = flag_changes.clone();
        v.blocked().observe(move |_| {
            flag_clone.fetch_add(1, Ordering::SeqCst);
        });

        v.unblock().unwrap();
        v.block().unwrap();
        v.block().unwrap();
        v.unblock().unwrap();
        v.unblock().unwrap();

        assert_eq!(flag_changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn value_arrives_before_flag_clears() {
        let v = Variable::new(0);
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink = events.clone();
        let probe = v.clone();
        v.observe(move |x| sink.lock().push(format!("value {x} blocked={}", probe.is_blocked())));
        let sink = events.clone();
        v.blocked().observe(move |b| sink.lock().push(format!("blocked {b}")));

        v.block().unwrap();
        v.set(1).unwrap();
        v.unblock().unwrap();

        assert_eq!(
            *events.lock(),
            vec!["blocked true", "value 1 blocked=true", "blocked false"]
        );
    }

    #[test]
    fn coalesced_delivers_last_value() {
        let v = Variable::new("start");
        let seen = recorder(&v);

        let out = v
            .coalesced(|| {
                v.set("hello").unwrap();
                v.set("you won't see this").unwrap();
                v.set("you will see this").unwrap();
                42
            })
            .unwrap();

        assert_eq!(out, 42);
        assert_eq!(*seen.lock(), vec!["you will see this"]);
    }

    #[test]
    fn always_notify_flushes_even_when_equal() {
        let v = Variable::always_notify(1);
        let seen = recorder(&v);

        v.block().unwrap();
        v.set(1).unwrap();
        v.unblock().unwrap();
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn track_variable_seeds_and_follows() {
        let source = Variable::new(2);
        let v = Variable::new(0);
        let seen = recorder(&v);

        v.track_variable(&source).unwrap();
        assert_eq!(v.get(), 2);
        assert_eq!(v.tracked_source_id(), Some(source.id()));

        source.set(7).unwrap();
        assert_eq!(v.get(), 7);
        assert_eq!(*seen.lock(), vec![2, 7]);
    }

    #[test]
    fn tracking_mirrors_the_blocked_flag() {
        let source = Variable::new(3);
        let v = Variable::new(0);
        v.track_variable(&source).unwrap();
        let seen = recorder(&v);

        source.block().unwrap();
        assert!(v.is_blocked());

        source.set(155).unwrap();
        assert!(seen.lock().is_empty());

        source.unblock().unwrap();
        assert!(!v.is_blocked());
        assert_eq!(*seen.lock(), vec![155]);
    }

    #[test]
    fn track_variable_replaces_previous_source() {
        let first = Variable::new(1);
        let second = Variable::new(2);
        let v = Variable::new(0);

        v.track_variable(&first).unwrap();
        v.track_variable(&second).unwrap();
        assert_eq!(first.observer_count(), 0);
        assert_eq!(v.get(), 2);

        first.set(10).unwrap();
        assert_eq!(v.get(), 2);
        second.set(20).unwrap();
        assert_eq!(v.get(), 20);
    }

    #[test]
    fn switching_away_from_a_blocked_source_releases_the_block() {
        let blocked_source = Variable::new(1);
        let open_source = Variable::new(2);
        let v = Variable::new(0);
        v.track_variable(&blocked_source).unwrap();
        let seen = recorder(&v);

        blocked_source.block().unwrap();
        assert!(v.is_blocked());

        v.track_variable(&open_source).unwrap();
        assert!(!v.is_blocked());
        open_source.set(9).unwrap();

        assert_eq!(v.get(), 9);
        assert_eq!(*seen.lock(), vec![2, 9]);
    }

    #[test]
    fn switching_between_blocked_sources_stays_blocked() {
        let first = Variable::new(1);
        let second = Variable::new(2);
        let v = Variable::new(0);
        v.track_variable(&first).unwrap();

        first.block().unwrap();
        second.block().unwrap();
        v.track_variable(&second).unwrap();
        assert!(v.is_blocked());

        second.unblock().unwrap();
        assert!(!v.is_blocked());
        assert_eq!(v.get(), 2);
    }

    #[test]
    fn failed_flush_leaves_variable_blocked_until_next_unblock() {
        let v = Variable::new(0);
        v.try_observe(|x| {
            if *x == 13 {
                return Err(Error::callback("unlucky"));
            }
            Ok(())
        });
        let seen = recorder(&v);

        v.block().unwrap();
        v.set(13).unwrap();
        assert!(matches!(v.unblock(), Err(Error::Callback(_))));
        assert!(v.is_blocked());
        assert!(seen.lock().is_empty());

        // Nothing is pending any more; the second unblock only clears the flag
        v.unblock().unwrap();
        assert!(!v.is_blocked());
        assert!(seen.lock().is_empty());
        assert_eq!(v.get(), 13);
    }

    #[test]
    fn tracking_itself_is_rejected() {
        let v = Variable::new(0);
        assert!(matches!(v.track_variable(&v.clone()), Err(Error::SelfTracking)));
    }

    #[test]
    fn stop_tracking_detaches() {
        let source = Variable::new(1);
        let v = Variable::new(0);
        v.track_variable(&source).unwrap();

        source.block().unwrap();
        assert!(v.is_blocked());

        assert!(v.stop_tracking().unwrap());
        assert!(!v.is_blocked());
        assert!(!v.stop_tracking().unwrap());

        source.set(5).unwrap();
        source.unblock().unwrap();
        assert_eq!(v.get(), 1);
    }

    #[test]
    fn dropping_tracker_releases_subscriptions() {
        let source = Variable::new(1);
        {
            let v = Variable::new(0);
            v.track_variable(&source).unwrap();
            assert_eq!(source.observer_count(), 1);
        }
        assert_eq!(source.observer_count(), 0);
        source.set(2).unwrap();
    }

    #[test]
    fn reentrant_write_during_flush_is_delivered() {
        let v = Variable::new(0);
        let seen = recorder(&v);

        // Round odd values up to even
        let writer = v.clone();
        v.try_observe(move |x| {
            if x % 2 == 1 {
                writer.set(x + 1)?;
            }
            Ok(())
        });

        v.block().unwrap();
        v.set(5).unwrap();
        v.unblock().unwrap();

        assert_eq!(v.get(), 6);
        assert_eq!(seen.lock().last(), Some(&6));
        assert!(!v.is_blocked());
    }
}

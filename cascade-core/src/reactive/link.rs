//! Bidirectional links between variables.
//!
//! Linking two variables keeps them equal: a write to either is copied to the
//! other, and so is blocking. The two directions share one guard flag. While
//! a copy is in flight the flag is set, and the reverse direction ignores the
//! echo instead of writing it back. This holds even for variables created
//! with [`Variable::always_notify`], whose equality test would never stop the
//! ping-pong on its own.
//!
//! Links are kept apart from tracking: a variable can track one source and be
//! linked to any number of peers at the same time.
//!
//! When linked variables diverge while blocked, the one unblocked first
//! decides the settled value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::observer::ObserverId;
use super::variable::{Variable, WeakVariable};
use crate::error::{Error, Result};

/// Subscriptions one side of a link holds on its peer.
pub(crate) struct LinkEntry<T>
where
    T: Clone + Send + Sync + 'static,
{
    peer_id: u64,
    peer: WeakVariable<T>,
    value_observer: ObserverId,
    blocked_observer: ObserverId,
}

impl<T> LinkEntry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn detach(self) {
        if let Some(peer) = self.peer.upgrade() {
            peer.value_cell().unobserve(self.value_observer);
            peer.blocked_cell().unobserve(self.blocked_observer);
        }
    }
}

/// Holds a link's guard flag for the duration of one copy.
struct Propagating<'a>(&'a AtomicBool);

impl<'a> Propagating<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for Propagating<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Subscribe `target` to `peer`'s value and blocked flag.
fn mirror<T>(target: &Variable<T>, peer: &Variable<T>, flag: &Arc<AtomicBool>) -> LinkEntry<T>
where
    T: Clone + Send + Sync + 'static,
{
    let weak = target.downgrade();
    let guard = Arc::clone(flag);
    let value_observer = peer.value_cell().add_callback(Arc::new(move |value: &T| {
        let Some(_propagating) = Propagating::enter(&guard) else {
            return Ok(());
        };
        match weak.upgrade() {
            Some(target) => target.set(value.clone()),
            None => Ok(()),
        }
    }));

    let weak = target.downgrade();
    let guard = Arc::clone(flag);
    let blocked_observer = peer.blocked_cell().add_callback(Arc::new(move |blocked: &bool| {
        let Some(_propagating) = Propagating::enter(&guard) else {
            return Ok(());
        };
        match weak.upgrade() {
            Some(target) => target.set_blocked(*blocked),
            None => Ok(()),
        }
    }));

    LinkEntry {
        peer_id: peer.id(),
        peer: peer.downgrade(),
        value_observer,
        blocked_observer,
    }
}

/// Keep `a` and `b` equal from now on.
///
/// `b` takes `a`'s current value: the first argument wins. Linking an
/// already linked pair does nothing.
pub fn link_variables<T>(a: &Variable<T>, b: &Variable<T>) -> Result<()>
where
    T: Clone + Send + Sync + 'static,
{
    if a.ptr_eq(b) {
        return Err(Error::SelfLink);
    }
    prune(b);
    if are_linked(a, b) {
        return Ok(());
    }

    let flag = Arc::new(AtomicBool::new(false));
    let b_follows_a = mirror(b, a, &flag);
    b.links().lock().push(b_follows_a);
    let a_follows_b = mirror(a, b, &flag);
    a.links().lock().push(a_follows_b);
    debug!(a = a.id(), b = b.id(), "link");

    if a.is_blocked() {
        b.block()?;
    }
    b.set(a.get())
}

/// Remove the link between `a` and `b`.
///
/// Both variables are unblocked afterwards. Returns `false`, and changes
/// nothing, if they were not linked.
pub fn unlink_variables<T>(a: &Variable<T>, b: &Variable<T>) -> Result<bool>
where
    T: Clone + Send + Sync + 'static,
{
    let a_entry = take_entry(a, b.id());
    let b_entry = take_entry(b, a.id());
    let existed = a_entry.is_some() || b_entry.is_some();

    for entry in [a_entry, b_entry].into_iter().flatten() {
        entry.detach();
    }

    if existed {
        debug!(a = a.id(), b = b.id(), "unlink");
        a.unblock()?;
        b.unblock()?;
    }
    Ok(existed)
}

/// Whether `a` currently follows `b` through a link.
pub fn are_linked<T>(a: &Variable<T>, b: &Variable<T>) -> bool
where
    T: Clone + Send + Sync + 'static,
{
    prune(a);
    let peer_id = b.id();
    a.links().lock().iter().any(|entry| entry.peer_id == peer_id)
}

/// Forget links to peers that have been dropped.
///
/// A dropped peer already removed its own observers; only our entry remains.
fn prune<T>(owner: &Variable<T>)
where
    T: Clone + Send + Sync + 'static,
{
    owner.links().lock().retain(|entry| entry.peer.is_alive());
}

fn take_entry<T>(owner: &Variable<T>, peer_id: u64) -> Option<LinkEntry<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let mut links = owner.links().lock();
    let index = links.iter().position(|entry| entry.peer_id == peer_id)?;
    Some(links.remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn log<T>(v: &Variable<T>, name: &'static str, events: &Arc<Mutex<Vec<String>>>)
    where
        T: Clone + Send + Sync + std::fmt::Debug + 'static,
    {
        let sink = events.clone();
        v.observe(move |x| sink.lock().push(format!("{name}: {x:?}")));
        let sink = events.clone();
        v.blocked()
            .observe(move |b| sink.lock().push(format!("{name} blocked: {b}")));
    }

    #[test]
    fn first_argument_wins_on_link() {
        let v1 = Variable::new(3);
        let v2 = Variable::new(4);

        link_variables(&v1, &v2).unwrap();
        assert_eq!(v1.get(), 3);
        assert_eq!(v2.get(), 3);
        assert!(are_linked(&v1, &v2));
        assert!(are_linked(&v2, &v1));
    }

    #[test]
    fn writes_flow_both_ways_exactly_once() {
        let v1 = Variable::new(3);
        let v2 = Variable::new(4);
        let events = Arc::new(Mutex::new(Vec::new()));
        log(&v1, "v1", &events);
        log(&v2, "v2", &events);

        link_variables(&v1, &v2).unwrap();
        v1.set(6).unwrap();
        v2.set(9).unwrap();

        assert_eq!(
            *events.lock(),
            vec!["v2: 3", "v1: 6", "v2: 6", "v2: 9", "v1: 9"]
        );
    }

    #[test]
    fn first_to_unblock_decides_the_value() {
        let v1 = Variable::new(3);
        let v2 = Variable::new(4);
        let events = Arc::new(Mutex::new(Vec::new()));
        log(&v1, "v1", &events);
        log(&v2, "v2", &events);

        link_variables(&v1, &v2).unwrap();
        v1.set(6).unwrap();
        events.lock().clear();

        // Blocking one blocks both
        v2.block().unwrap();
        v2.set(19).unwrap();
        v2.set(20).unwrap();
        v1.set(18).unwrap();
        v2.set(21).unwrap();
        v2.unblock().unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                "v2 blocked: true",
                "v1 blocked: true",
                "v2: 21",
                "v2 blocked: false",
                "v1: 21",
                "v1 blocked: false",
            ]
        );
        events.lock().clear();

        v1.coalesced(|| {
            v2.set(22).unwrap();
            v1.set(23).unwrap();
            v2.set(24).unwrap();
        })
        .unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                "v1 blocked: true",
                "v2 blocked: true",
                "v1: 23",
                "v1 blocked: false",
                "v2: 23",
                "v2 blocked: false",
            ]
        );
        assert_eq!(v2.get(), 23);
    }

    #[test]
    fn unlink_stops_mutual_influence() {
        let a = Variable::new(1);
        let b = Variable::new(2);
        link_variables(&a, &b).unwrap();

        assert!(unlink_variables(&a, &b).unwrap());
        assert!(!are_linked(&a, &b));
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 0);

        a.set(10).unwrap();
        assert_eq!(b.get(), 1);
        b.set(20).unwrap();
        assert_eq!(a.get(), 10);

        // Second unlink is a no-op
        assert!(!unlink_variables(&a, &b).unwrap());
    }

    #[test]
    fn guard_stops_ping_pong_without_equality() {
        let a = Variable::always_notify(0);
        let b = Variable::always_notify(0);
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        b.observe(move |_| *counter.lock() += 1);

        link_variables(&a, &b).unwrap();
        a.set(5).unwrap();

        assert_eq!(b.get(), 5);
        // One for the initial sync, one for the write
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn dropped_peers_are_forgotten() {
        let hub = Variable::new(0);
        for i in 0..10 {
            let peer = Variable::new(i);
            link_variables(&hub, &peer).unwrap();
        }
        assert_eq!(hub.observer_count(), 0);

        let survivor = Variable::new(0);
        link_variables(&hub, &survivor).unwrap();
        assert_eq!(hub.links().lock().len(), 1);
        assert_eq!(survivor.links().lock().len(), 1);

        hub.set(7).unwrap();
        assert_eq!(survivor.get(), 7);
    }

    #[test]
    fn linking_to_itself_is_rejected() {
        let a = Variable::new(0);
        assert!(matches!(link_variables(&a, &a), Err(Error::SelfLink)));
    }

    #[test]
    fn link_and_track_coexist() {
        let source = Variable::new(String::from("one"));
        let v = Variable::new(String::new());
        let v_copy = Variable::new(String::new());

        v.track_variable(&source).unwrap();
        link_variables(&v, &v_copy).unwrap();
        assert_eq!(v_copy.get(), "one");

        source.set("two places at once".into()).unwrap();
        assert_eq!(v.get(), "two places at once");
        assert_eq!(v_copy.get(), "two places at once");

        unlink_variables(&v, &v_copy).unwrap();
        source.set("three".into()).unwrap();
        assert_eq!(v.get(), "three");
        assert_eq!(v_copy.get(), "two places at once");
    }
}

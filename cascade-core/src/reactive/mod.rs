//! Reactive Primitives
//!
//! This module implements the value cells everything else is built on:
//! observables, blockable variables, and the links and trackers that keep
//! variables in sync.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] holds a value and a list of observers. Writing a value
//! that differs from the current one calls every observer, inline and in
//! registration order.
//!
//! ## Variables
//!
//! A [`Variable`] is an observable with a `blocked` flag. While blocked it
//! still stores writes but holds back notifications, and unblocking
//! delivers at most one, carrying the latest value. Blocking is how a
//! caller makes a burst of writes, or a diamond-shaped update, look like a
//! single change to everything downstream.
//!
//! ## Tracking and Links
//!
//! A variable can track one source, following its value and blocked flag.
//! Two variables can be linked so that each follows the other; see
//! [`link_variables`].
//!
//! # Implementation Notes
//!
//! Propagation is push-based and synchronous: by the time `set` returns,
//! every observer reachable from the write has run. A thread-local
//! [`PropagationContext`] records which nodes are mid-notification, for
//! trace output and for re-entrancy checks.

pub(crate) mod context;
mod link;
mod observable;
mod observer;
mod variable;

pub use context::PropagationContext;
pub use link::{are_linked, link_variables, unlink_variables};
pub use observable::{Equality, Observable};
pub use observer::ObserverId;
pub use variable::Variable;

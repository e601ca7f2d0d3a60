//! Computation Graph
//!
//! Variables on their own only hold values. This module adds computation:
//! an [`Algorithm`] reads a set of input variables, runs an update step, and
//! writes a set of output variables. Outputs of one algorithm can be inputs
//! of the next, which builds an acyclic graph of variables and algorithms.
//!
//! # Overview
//!
//! - Edges are plain observer subscriptions. There is no central scheduler;
//!   a write propagates through the graph before `set` returns.
//! - An algorithm runs when it is enabled, none of its inputs is blocked,
//!   and an input changed since its last run.
//! - A blocked input blocks the algorithm's outputs in turn, so blocking
//!   the root of a graph holds back the whole graph, and unblocking it runs
//!   each algorithm once.
//!
//! The [`derive`] family wraps the common case of one output computed from
//! one or two inputs.

mod algorithm;
mod derive;
mod ports;

pub use algorithm::{Algorithm, AlgorithmBuilder, Update};
pub use derive::{
    add, add_constant, derive, derive2, divide, divide_constant, multiply, multiply_constant,
    subtract, Derived,
};
pub use ports::{PortKind, Ports};

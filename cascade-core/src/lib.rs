//! Cascade Core
//!
//! Observable values with blockable, coalesced change propagation.
//!
//! The crate provides:
//!
//! - Observable cells that notify observers when their value changes
//! - Variables whose notifications can be blocked and later flushed once
//! - Tracking and bidirectional links between variables
//! - Algorithms: named inputs, named outputs, and an update step that runs
//!   once all inputs have settled
//!
//! # Architecture
//!
//! - `reactive`: observables, variables, tracking and links
//! - `graph`: algorithms, their ports, and derived-variable combinators
//! - `error`: the crate-wide error type
//!
//! # Example
//!
//! ```rust
//! use cascade_core::graph::{Algorithm, Ports};
//! use cascade_core::reactive::Variable;
//!
//! let a = Variable::new(1);
//! let b = Variable::new(2);
//!
//! let adder = Algorithm::builder("adder")
//!     .input_from("a", &a)
//!     .input_from("b", &b)
//!     .output("sum", 0)
//!     .enabled(true)
//!     .build(|ports: &Ports| {
//!         let sum = ports.get::<i32>("a")? + ports.get::<i32>("b")?;
//!         ports.set("sum", sum)
//!     })?;
//! assert_eq!(adder.get::<i32>("sum")?, 3);
//!
//! // Change both inputs, recompute once
//! a.block()?;
//! b.block()?;
//! a.set(10)?;
//! b.set(20)?;
//! a.unblock()?;
//! b.unblock()?;
//! assert_eq!(adder.get::<i32>("sum")?, 30);
//! # Ok::<(), cascade_core::Error>(())
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{Error, Result};
pub use graph::{Algorithm, Ports, Update};
pub use reactive::{link_variables, unlink_variables, Observable, ObserverId, Variable};

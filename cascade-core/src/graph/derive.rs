//! Derived variables.
//!
//! Small combinators that build an [`Algorithm`] under the hood and hand back
//! its output. They are the explicit spelling of `(v1 + 3) / 5`:
//!
//! ```rust
//! use cascade_core::graph::derive;
//! use cascade_core::reactive::Variable;
//!
//! let v1 = Variable::new(3);
//! let v2 = derive(&v1, |x| (x + 3) / 5).unwrap();
//! assert_eq!(v2.get(), 1);
//!
//! v1.set(27).unwrap();
//! assert_eq!(v2.get(), 6);
//! ```

use std::ops::{Add, Deref, Div, Mul, Sub};

use super::algorithm::Algorithm;
use super::ports::Ports;
use crate::error::Result;
use crate::reactive::Variable;

/// A variable computed from other variables.
///
/// The closure runs on clones of the inputs with no lock held, so it may
/// read or write any variable.
///
/// Owns the algorithm doing the computation; dropping it stops updates while
/// clones of the variable keep their last value.
pub struct Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    variable: Variable<T>,
    algorithm: Algorithm,
}

impl<T> Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn variable(&self) -> &Variable<T> {
        &self.variable
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    pub fn into_parts(self) -> (Variable<T>, Algorithm) {
        (self.variable, self.algorithm)
    }
}

impl<T> Deref for Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Target = Variable<T>;

    fn deref(&self) -> &Variable<T> {
        &self.variable
    }
}

impl<T> std::fmt::Debug for Derived<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("variable", &self.variable)
            .field("algorithm", &self.algorithm.name())
            .finish()
    }
}

/// `f(source)`, kept up to date.
pub fn derive<A, B, F>(source: &Variable<A>, f: F) -> Result<Derived<B>>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&A) -> B + Send + Sync + 'static,
{
    let initial = f(&source.get());
    let algorithm = Algorithm::builder("derive")
        .input_from("source", source)
        .output("value", initial)
        .enabled(true)
        .build(move |ports: &Ports| {
            let value = f(&ports.get::<A>("source")?);
            ports.set("value", value)
        })?;
    finish(algorithm)
}

/// `f(a, b)`, kept up to date.
pub fn derive2<A, B, C, F>(a: &Variable<A>, b: &Variable<B>, f: F) -> Result<Derived<C>>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&A, &B) -> C + Send + Sync + 'static,
{
    let initial = f(&a.get(), &b.get());
    let algorithm = Algorithm::builder("derive2")
        .input_from("a", a)
        .input_from("b", b)
        .output("value", initial)
        .enabled(true)
        .build(move |ports: &Ports| {
            let value = f(&ports.get::<A>("a")?, &ports.get::<B>("b")?);
            ports.set("value", value)
        })?;
    finish(algorithm)
}

fn finish<T>(algorithm: Algorithm) -> Result<Derived<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let variable = algorithm.output::<T>("value")?;
    Ok(Derived {
        variable,
        algorithm,
    })
}

pub fn add<T>(a: &Variable<T>, b: &Variable<T>) -> Result<Derived<T>>
where
    T: Add<Output = T> + Clone + PartialEq + Send + Sync + 'static,
{
    derive2(a, b, |x: &T, y: &T| x.clone() + y.clone())
}

pub fn subtract<T>(a: &Variable<T>, b: &Variable<T>) -> Result<Derived<T>>
where
    T: Sub<Output = T> + Clone + PartialEq + Send + Sync + 'static,
{
    derive2(a, b, |x: &T, y: &T| x.clone() - y.clone())
}

pub fn multiply<T>(a: &Variable<T>, b: &Variable<T>) -> Result<Derived<T>>
where
    T: Mul<Output = T> + Clone + PartialEq + Send + Sync + 'static,
{
    derive2(a, b, |x: &T, y: &T| x.clone() * y.clone())
}

/// `a / b`. Integer division by zero panics, as it would outside a variable.
pub fn divide<T>(a: &Variable<T>, b: &Variable<T>) -> Result<Derived<T>>
where
    T: Div<Output = T> + Clone + PartialEq + Send + Sync + 'static,
{
    derive2(a, b, |x: &T, y: &T| x.clone() / y.clone())
}

pub fn add_constant<T>(a: &Variable<T>, k: T) -> Result<Derived<T>>
where
    T: Add<Output = T> + Clone + PartialEq + Send + Sync + 'static,
{
    derive(a, move |x: &T| x.clone() + k.clone())
}

pub fn multiply_constant<T>(a: &Variable<T>, k: T) -> Result<Derived<T>>
where
    T: Mul<Output = T> + Clone + PartialEq + Send + Sync + 'static,
{
    derive(a, move |x: &T| x.clone() * k.clone())
}

pub fn divide_constant<T>(a: &Variable<T>, k: T) -> Result<Derived<T>>
where
    T: Div<Output = T> + Clone + PartialEq + Send + Sync + 'static,
{
    derive(a, move |x: &T| x.clone() / k.clone())
}

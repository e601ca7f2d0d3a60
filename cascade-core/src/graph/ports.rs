//! Algorithm Ports
//!
//! An algorithm's inputs and outputs are named variables of arbitrary,
//! possibly different, value types. Ports store them type-erased and hand
//! back typed [`Variable`] handles on request.

use std::any::{type_name, Any};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::reactive::{ObserverId, Variable};

/// Callback type used for type-erased change subscriptions.
pub(crate) type Trigger = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// The parts of a [`Variable`] an algorithm needs without knowing its type.
pub(crate) trait Port: Send + Sync {
    fn is_blocked(&self) -> bool;

    fn set_blocked(&self, blocked: bool) -> Result<()>;

    /// Call `trigger` on every value notification.
    fn on_change(&self, trigger: Trigger) -> ObserverId;

    /// Call `trigger` on every blocked-flag change.
    fn on_blocked(&self, trigger: Trigger) -> ObserverId;

    fn detach(&self, value_observer: ObserverId, blocked_observer: ObserverId);

    fn as_any(&self) -> &dyn Any;
}

impl<T> Port for Variable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn is_blocked(&self) -> bool {
        Variable::is_blocked(self)
    }

    fn set_blocked(&self, blocked: bool) -> Result<()> {
        Variable::set_blocked(self, blocked)
    }

    fn on_change(&self, trigger: Trigger) -> ObserverId {
        self.value_cell().add_callback(Arc::new(move |_: &T| trigger()))
    }

    fn on_blocked(&self, trigger: Trigger) -> ObserverId {
        self.blocked_cell().add_callback(Arc::new(move |_: &bool| trigger()))
    }

    fn detach(&self, value_observer: ObserverId, blocked_observer: ObserverId) {
        self.value_cell().unobserve(value_observer);
        self.blocked_cell().unobserve(blocked_observer);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Which side of the algorithm a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Input,
    Output,
}

/// Named inputs and outputs of one algorithm, in declaration order.
///
/// Names are unique across both sides.
pub struct Ports {
    algorithm: String,
    inputs: IndexMap<String, Box<dyn Port>>,
    outputs: IndexMap<String, Box<dyn Port>>,
}

impl Ports {
    pub(crate) fn new(algorithm: String) -> Self {
        Self {
            algorithm,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, kind: PortKind, name: String, port: Box<dyn Port>) -> Result<()> {
        if self.inputs.contains_key(&name) || self.outputs.contains_key(&name) {
            return Err(Error::DuplicatePort {
                algorithm: self.algorithm.clone(),
                name,
            });
        }
        match kind {
            PortKind::Input => self.inputs.insert(name, port),
            PortKind::Output => self.outputs.insert(name, port),
        };
        Ok(())
    }

    /// Typed handle to an input variable.
    pub fn input<T>(&self, name: &str) -> Result<Variable<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.typed(self.inputs.get(name), name)
    }

    /// Typed handle to an output variable.
    pub fn output<T>(&self, name: &str) -> Result<Variable<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.typed(self.outputs.get(name), name)
    }

    /// Current value of the port called `name`, input or output.
    pub fn get<T>(&self, name: &str) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok(self.variable::<T>(name)?.get())
    }

    /// Write the port called `name`, input or output.
    pub fn set<T>(&self, name: &str, value: T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.variable::<T>(name)?.set(value)
    }

    /// Where the port called `name` sits, if it exists.
    pub fn kind(&self, name: &str) -> Option<PortKind> {
        if self.inputs.contains_key(name) {
            Some(PortKind::Input)
        } else if self.outputs.contains_key(name) {
            Some(PortKind::Output)
        } else {
            None
        }
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub(crate) fn input_ports(&self) -> impl Iterator<Item = &dyn Port> {
        self.inputs.values().map(|port| port.as_ref())
    }

    pub(crate) fn output_ports(&self) -> impl Iterator<Item = &dyn Port> {
        self.outputs.values().map(|port| port.as_ref())
    }

    fn variable<T>(&self, name: &str) -> Result<Variable<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let port = self.inputs.get(name).or_else(|| self.outputs.get(name));
        self.typed(port, name)
    }

    fn typed<T>(&self, port: Option<&Box<dyn Port>>, name: &str) -> Result<Variable<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let port = port.ok_or_else(|| Error::UnknownPort {
            algorithm: self.algorithm.clone(),
            name: name.to_string(),
        })?;
        port.as_any()
            .downcast_ref::<Variable<T>>()
            .cloned()
            .ok_or_else(|| Error::PortType {
                algorithm: self.algorithm.clone(),
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }
}

impl std::fmt::Debug for Ports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ports")
            .field("algorithm", &self.algorithm)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ports {
        let mut ports = Ports::new("sample".into());
        ports
            .insert(PortKind::Input, "count".into(), Box::new(Variable::new(3_i32)))
            .unwrap();
        ports
            .insert(PortKind::Input, "label".into(), Box::new(Variable::new(String::from("x"))))
            .unwrap();
        ports
            .insert(PortKind::Output, "ready".into(), Box::new(Variable::new(false)))
            .unwrap();
        ports
    }

    #[test]
    fn typed_access_across_value_types() {
        let ports = sample();

        assert_eq!(ports.get::<i32>("count").unwrap(), 3);
        assert_eq!(ports.input::<String>("label").unwrap().get(), "x");

        ports.set("ready", true).unwrap();
        assert!(ports.output::<bool>("ready").unwrap().get());
        assert_eq!(ports.kind("ready"), Some(PortKind::Output));
    }

    #[test]
    fn handles_share_the_stored_variable() {
        let ports = sample();
        ports.input::<i32>("count").unwrap().set(9).unwrap();
        assert_eq!(ports.get::<i32>("count").unwrap(), 9);
    }

    #[test]
    fn wrong_side_or_type_is_an_error() {
        let ports = sample();

        assert!(matches!(
            ports.output::<i32>("count"),
            Err(Error::UnknownPort { .. })
        ));
        assert!(matches!(
            ports.get::<u64>("count"),
            Err(Error::PortType { expected, .. }) if expected == "u64"
        ));
        assert!(matches!(ports.get::<i32>("missing"), Err(Error::UnknownPort { .. })));
    }

    #[test]
    fn names_are_unique_and_ordered() {
        let mut ports = sample();
        let err = ports
            .insert(PortKind::Output, "count".into(), Box::new(Variable::new(0_i32)))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePort { .. }));

        assert_eq!(ports.input_names().collect::<Vec<_>>(), ["count", "label"]);
        assert_eq!(ports.output_names().collect::<Vec<_>>(), ["ready"]);
    }
}

//! Algorithm Implementation
//!
//! An Algorithm connects named input variables to named output variables
//! through a user-supplied [`Update`] step.
//!
//! # When `update` Runs
//!
//! The algorithm is *ready* when its `enabled` flag is set and none of its
//! inputs is blocked. It is *dirty* when an input changed since the last run.
//!
//! 1. An input value notification marks the algorithm dirty.
//! 2. Any input value or blocked-flag change re-checks: if ready and dirty,
//!    `update` runs once and the dirty mark clears.
//! 3. Setting `enabled` to `true` forces a pass. If an input is blocked at
//!    that moment, the pass waits for the unblock.
//!
//! Because an unblocking input announces its value before it clears its
//! blocked flag, an algorithm whose inputs unblock one by one runs exactly
//! once, after the last one, with every input already current.
//!
//! # Output Blocking
//!
//! While an algorithm is not ready, its outputs are blocked too. This carries
//! a block at the root of a graph all the way down: nothing downstream fires
//! until the inputs settle, and then everything fires once.
//!
//! # Feedback
//!
//! Wiring an output back into one of the same algorithm's inputs is not
//! supported. A trigger that arrives while the algorithm's own `update` is on
//! the stack is not run; it is logged and leaves the algorithm dirty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::ports::{Port, PortKind, Ports, Trigger};
use crate::error::Result;
use crate::reactive::context::{next_node_id, PropagationContext};
use crate::reactive::{Observable, ObserverId, Variable};

/// The recomputation step of an algorithm.
///
/// Read inputs through `ports` and write outputs back through it. Closures
/// `Fn(&Ports) -> Result<()>` implement this trait.
pub trait Update: Send + Sync + 'static {
    fn update(&self, ports: &Ports) -> Result<()>;
}

impl<F> Update for F
where
    F: Fn(&Ports) -> Result<()> + Send + Sync + 'static,
{
    fn update(&self, ports: &Ports) -> Result<()> {
        self(ports)
    }
}

/// Declares the ports and options of an [`Algorithm`].
pub struct AlgorithmBuilder {
    name: String,
    ports: Vec<(PortKind, String, Box<dyn Port>)>,
    enabled: bool,
}

impl AlgorithmBuilder {
    /// Declare an input backed by a new variable.
    pub fn input<T>(self, name: impl Into<String>, initial: T) -> Self
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.input_from(name, &Variable::new(initial))
    }

    /// Declare an input backed by an existing variable.
    pub fn input_from<T>(mut self, name: impl Into<String>, variable: &Variable<T>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let port: Box<dyn Port> = Box::new(variable.clone());
        self.ports.push((PortKind::Input, name.into(), port));
        self
    }

    /// Declare an output backed by a new variable.
    pub fn output<T>(self, name: impl Into<String>, initial: T) -> Self
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.output_from(name, &Variable::new(initial))
    }

    /// Declare an output backed by an existing variable.
    pub fn output_from<T>(mut self, name: impl Into<String>, variable: &Variable<T>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let port: Box<dyn Port> = Box::new(variable.clone());
        self.ports.push((PortKind::Output, name.into(), port));
        self
    }

    /// Whether the algorithm starts enabled. Defaults to `false`, so that all
    /// inputs can be wired before the first run.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Wire everything up. An enabled algorithm runs its first pass here.
    pub fn build(self, update: impl Update) -> Result<Algorithm> {
        let mut ports = Ports::new(self.name.clone());
        for (kind, name, port) in self.ports {
            ports.insert(kind, name, port)?;
        }

        let inner = Arc::new(AlgorithmInner {
            id: next_node_id(),
            name: self.name,
            ports,
            enabled: Variable::new(self.enabled),
            outputs_blocked: Observable::new(false),
            dirty: AtomicBool::new(self.enabled),
            update: Box::new(update),
            subscriptions: Mutex::new(Subscriptions::default()),
        });
        inner.wire();

        debug!(algorithm = %inner.name, enabled = self.enabled, "built");
        inner.check_blocks_and_update()?;
        Ok(Algorithm { inner })
    }
}

#[derive(Default)]
struct Subscriptions {
    inputs: Vec<(ObserverId, ObserverId)>,
    enabled: Option<ObserverId>,
}

struct AlgorithmInner {
    id: u64,
    name: String,
    ports: Ports,
    enabled: Variable<bool>,
    outputs_blocked: Observable<bool>,

    /// An input changed since the last run.
    dirty: AtomicBool,

    update: Box<dyn Update>,
    subscriptions: Mutex<Subscriptions>,
}

impl AlgorithmInner {
    fn wire(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock();

        for port in self.ports.input_ports() {
            let value = port.on_change(self.trigger(Self::input_changed));
            let blocked = port.on_blocked(self.trigger(Self::check_blocks_and_update));
            subscriptions.inputs.push((value, blocked));
        }

        let weak = Arc::downgrade(self);
        subscriptions.enabled = Some(self.enabled.try_observe(move |enabled| {
            match weak.upgrade() {
                Some(inner) => inner.enabled_changed(*enabled),
                None => Ok(()),
            }
        }));

        let weak = Arc::downgrade(self);
        self.outputs_blocked.try_observe(move |blocked| match weak.upgrade() {
            Some(inner) => inner.block_outputs(*blocked),
            None => Ok(()),
        });
    }

    fn trigger(self: &Arc<Self>, action: fn(&Self) -> Result<()>) -> Trigger {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || match weak.upgrade() {
            Some(inner) => action(&inner),
            None => Ok(()),
        })
    }

    fn is_ready(&self) -> bool {
        self.enabled.get() && !self.ports.input_ports().any(|port| port.is_blocked())
    }

    fn input_changed(&self) -> Result<()> {
        self.dirty.store(true, Ordering::SeqCst);
        if PropagationContext::contains(self.id) {
            warn!(algorithm = %self.name, "input changed during own update; feedback is not recomputed");
            return Ok(());
        }
        self.check_blocks_and_update()
    }

    fn enabled_changed(&self, enabled: bool) -> Result<()> {
        debug!(algorithm = %self.name, enabled, "enabled changed");
        if enabled {
            self.dirty.store(true, Ordering::SeqCst);
        }
        self.check_blocks_and_update()
    }

    fn check_blocks_and_update(&self) -> Result<()> {
        if PropagationContext::contains(self.id) {
            return Ok(());
        }
        if !self.is_ready() {
            return self.outputs_blocked.set(true);
        }
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.run_update()?;
        }
        self.outputs_blocked.set(false)
    }

    fn run_update(&self) -> Result<()> {
        let _ctx = PropagationContext::enter(self.id);
        debug!(
            algorithm = %self.name,
            depth = PropagationContext::depth(),
            "update"
        );
        self.update.update(&self.ports)
    }

    fn block_outputs(&self, blocked: bool) -> Result<()> {
        for port in self.ports.output_ports() {
            port.set_blocked(blocked)?;
        }
        Ok(())
    }
}

impl Drop for AlgorithmInner {
    fn drop(&mut self) {
        let subscriptions = std::mem::take(self.subscriptions.get_mut());
        for (port, (value, blocked)) in self.ports.input_ports().zip(subscriptions.inputs) {
            port.detach(value, blocked);
        }
        if let Some(id) = subscriptions.enabled {
            self.enabled.unobserve(id);
        }
    }
}

/// A named bundle of input and output variables plus the step that
/// recomputes the outputs.
///
/// Cloning shares the algorithm. Dropping the last handle unhooks it from its
/// inputs; the variables themselves live on.
///
/// # Example
///
/// ```rust
/// use cascade_core::graph::{Algorithm, Ports};
///
/// let inverter = Algorithm::builder("inverter")
///     .input("input", false)
///     .output("output", false)
///     .build(|ports: &Ports| {
///         let input: bool = ports.get("input")?;
///         ports.set("output", !input)
///     })
///     .unwrap();
///
/// inverter.set_enabled(true).unwrap();
/// assert!(inverter.get::<bool>("output").unwrap());
///
/// inverter.set("input", true).unwrap();
/// assert!(!inverter.get::<bool>("output").unwrap());
/// ```
#[derive(Clone)]
pub struct Algorithm {
    inner: Arc<AlgorithmInner>,
}

impl Algorithm {
    /// Start declaring an algorithm.
    pub fn builder(name: impl Into<String>) -> AlgorithmBuilder {
        AlgorithmBuilder {
            name: name.into(),
            ports: Vec::new(),
            enabled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The `enabled` flag. Observable and settable like any variable.
    pub fn enabled(&self) -> &Variable<bool> {
        &self.inner.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.enabled.set(enabled)
    }

    /// Whether the outputs are currently held back by this algorithm.
    pub fn outputs_blocked(&self) -> Observable<bool> {
        self.inner.outputs_blocked.clone()
    }

    /// Whether an input changed since the last run.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    pub fn ports(&self) -> &Ports {
        &self.inner.ports
    }

    pub fn input<T>(&self, name: &str) -> Result<Variable<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner.ports.input(name)
    }

    pub fn output<T>(&self, name: &str) -> Result<Variable<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner.ports.output(name)
    }

    pub fn get<T>(&self, name: &str) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner.ports.get(name)
    }

    pub fn set<T>(&self, name: &str, value: T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner.ports.set(name, value)
    }

    /// Run the update step now, even if disabled or blocked.
    pub fn run_update(&self) -> Result<()> {
        self.inner.dirty.store(false, Ordering::SeqCst);
        self.inner.run_update()
    }
}

impl std::fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Algorithm")
            .field("name", &self.inner.name)
            .field("enabled", &self.is_enabled())
            .field("dirty", &self.is_dirty())
            .field("ports", &self.inner.ports)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

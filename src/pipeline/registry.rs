//! Module registry: class id → (configurator, factory).
//!
//! Both statically linked modules and dynamically loaded ones register here
//! through the same [`ModuleRegistry::register`] call. Entries are never
//! removed. The map is key-sorted so listings are alphabetical.

use crate::error::{MediaFlowError, Result};
use crate::params::ParameterSet;
use crate::pipeline::node::{Node, NodeInit};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

/// Builds a node from its init bundle.
pub type NodeFactory = Arc<dyn Fn(NodeInit) -> Result<Box<dyn Node>> + Send + Sync>;

/// Produces the default parameter set of a class. Must be side-effect free.
pub type Configurator = Arc<dyn Fn() -> ParameterSet + Send + Sync>;

#[derive(Clone)]
struct RegisteredClass {
    factory: NodeFactory,
    configure: Configurator,
}

/// Thread-safe registry of node classes.
#[derive(Default)]
pub struct ModuleRegistry {
    classes: Mutex<BTreeMap<String, RegisteredClass>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn classes(&self) -> MutexGuard<'_, BTreeMap<String, RegisteredClass>> {
        self.classes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `id`. Returns `false` and keeps the existing entry if taken.
    pub fn register<F, C>(&self, id: impl Into<String>, factory: F, configure: C) -> bool
    where
        F: Fn(NodeInit) -> Result<Box<dyn Node>> + Send + Sync + 'static,
        C: Fn() -> ParameterSet + Send + Sync + 'static,
    {
        let id = id.into();
        let mut classes = self.classes();
        if classes.contains_key(&id) {
            tracing::warn!("Class '{}' is already registered", id);
            return false;
        }
        tracing::debug!("Registered class '{}'", id);
        classes.insert(
            id,
            RegisteredClass {
                factory: Arc::new(factory),
                configure: Arc::new(configure),
            },
        );
        true
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.classes().contains_key(id)
    }

    /// All class ids in alphabetical order.
    pub fn list_registered(&self) -> Vec<String> {
        self.classes().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.classes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes().is_empty()
    }

    fn lookup(&self, id: &str) -> Result<RegisteredClass> {
        self.classes()
            .get(id)
            .cloned()
            .ok_or_else(|| MediaFlowError::UnknownClass(id.to_string()))
    }

    /// Default parameters of `id`.
    pub fn get_params(&self, id: &str) -> Result<ParameterSet> {
        let class = self.lookup(id)?;
        Ok((class.configure)())
    }

    /// Build a node of class `init.class`.
    ///
    /// After construction every parameter is offered to `Node::set_param`.
    /// Factory errors and panics surface as `InitializationFailed`.
    pub fn instantiate(&self, init: NodeInit) -> Result<Box<dyn Node>> {
        // The lock is released before the factory runs.
        let class = self.lookup(&init.class)?;
        let class_id = init.class.clone();
        let params = init.params.clone();
        let span = init.span.clone();
        let _enter = span.enter();

        let mut node = match catch_unwind(AssertUnwindSafe(|| (class.factory)(init))) {
            Ok(Ok(node)) => node,
            Ok(Err(e)) => {
                return Err(match e.root() {
                    MediaFlowError::InitializationFailed { .. } => e,
                    _ => MediaFlowError::init_failed(&class_id, e.to_string()),
                })
            }
            Err(_) => {
                return Err(MediaFlowError::init_failed(&class_id, "factory panicked"));
            }
        };

        for param in params.iter() {
            if !node.set_param(param) {
                tracing::trace!("Parameter '{}' not handled by node", param.name);
            }
        }
        Ok(node)
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("classes", &self.list_registered())
            .finish()
    }
}

//! Registry context: the module and converter registries plus the libraries
//! backing dynamically loaded entries.
//!
//! One context is created at process start and shared (`Arc`) with the
//! application builder and every loaded module. Tests build their own.

use crate::error::Result;
use crate::frame::FormatId;
use crate::params::ParameterSet;
use crate::pipeline::converter::ConverterRegistry;
use crate::pipeline::loader::{self, LoadedModule, ModuleLoadReport};
use crate::pipeline::node::{Node, NodeInit};
use crate::pipeline::registry::ModuleRegistry;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct RegistryContext {
    modules: ModuleRegistry,
    converters: ConverterRegistry,
    // Declared last: dropped after the registries holding code from them.
    libraries: Mutex<Vec<LoadedModule>>,
}

impl RegistryContext {
    /// Empty context.
    pub fn new() -> Self {
        Self {
            modules: ModuleRegistry::new(),
            converters: ConverterRegistry::new(),
            libraries: Mutex::new(Vec::new()),
        }
    }

    /// Context with the statically linked modules registered.
    pub fn with_builtins() -> Self {
        let ctx = Self::new();
        crate::builtin::register_all(&ctx);
        ctx
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Register a node class. See [`ModuleRegistry::register`].
    pub fn register_class<F, C>(&self, id: impl Into<String>, factory: F, configure: C) -> bool
    where
        F: Fn(NodeInit) -> Result<Box<dyn Node>> + Send + Sync + 'static,
        C: Fn() -> ParameterSet + Send + Sync + 'static,
    {
        self.modules.register(id, factory, configure)
    }

    /// Register a converter class for one format pair.
    ///
    /// The class is added to the module registry on first use; later calls
    /// with the same id only add more format pairs.
    pub fn register_converter<F, C>(
        &self,
        input: FormatId,
        output: FormatId,
        id: impl Into<String>,
        factory: F,
        configure: C,
    ) -> bool
    where
        F: Fn(NodeInit) -> Result<Box<dyn Node>> + Send + Sync + 'static,
        C: Fn() -> ParameterSet + Send + Sync + 'static,
    {
        let id = id.into();
        // Losing a registration race to the same id still records the pair.
        if !self.modules.register(id.clone(), factory, configure)
            && !self.modules.is_registered(&id)
        {
            return false;
        }
        self.converters.register(input, output, id)
    }

    /// Load one dynamic module.
    pub fn load_module(&self, path: &Path) -> Result<String> {
        loader::load_module(self, path)
    }

    /// Load several modules, each independently.
    pub fn load_modules(&self, paths: &[PathBuf]) -> Vec<ModuleLoadReport> {
        loader::load_modules(self, paths)
    }

    /// Name and path of every retained module library.
    pub fn loaded_modules(&self) -> Vec<(String, PathBuf)> {
        self.libraries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|m| (m.name().to_string(), m.path().to_path_buf()))
            .collect()
    }

    pub(crate) fn retain_library(&self, module: LoadedModule) {
        self.libraries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(module);
    }

    pub(crate) fn registration_count(&self) -> usize {
        self.modules.len() + self.converters.len()
    }
}

impl Default for RegistryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegistryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryContext")
            .field("classes", &self.modules.len())
            .field("converters", &self.converters.len())
            .field("libraries", &self.loaded_modules().len())
            .finish()
    }
}

//! Dynamic module loading.
//!
//! A module is a shared library exporting two C-ABI entry points:
//!
//! - `mediaflow_1_module_get_name() -> *const c_char`, a static NUL-terminated name
//! - `mediaflow_1_module_register(*const RegistryContext) -> i32`, 0 on success
//!
//! The [`export_module!`](crate::export_module) macro generates both. A module
//! shares Rust types with the host, so it must be built against the same
//! version of this crate with the same compiler.
//!
//! Libraries of successful loads are kept alive by the [`RegistryContext`]
//! for as long as the registries that point into them. A library that fails
//! before registering anything is unloaded immediately.

use crate::error::{MediaFlowError, Result};
use crate::pipeline::context::RegistryContext;
use libloading::Library;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

pub const MODULE_GET_NAME_SYMBOL: &str = "mediaflow_1_module_get_name";
pub const MODULE_REGISTER_SYMBOL: &str = "mediaflow_1_module_register";

pub type ModuleGetNameFn = unsafe extern "C" fn() -> *const c_char;
pub type ModuleRegisterFn = unsafe extern "C" fn(*const RegistryContext) -> i32;

/// A library kept loaded after successful registration.
pub struct LoadedModule {
    name: String,
    path: PathBuf,
    _library: Library,
}

impl LoadedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Outcome of one path in [`load_modules`].
#[derive(Debug)]
pub struct ModuleLoadReport {
    pub path: PathBuf,
    /// Name reported by the module.
    pub result: Result<String>,
}

fn load_error(path: &Path, reason: impl Into<String>) -> MediaFlowError {
    MediaFlowError::ModuleLoad {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn symbol_name(name: &str) -> Vec<u8> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// The two entry points of a module, resolved from a library or linked into
/// the current binary through [`export_module!`](crate::export_module).
#[derive(Clone, Copy)]
pub struct ModuleEntryPoints {
    pub get_name: ModuleGetNameFn,
    pub register: ModuleRegisterFn,
}

/// What running a module's entry points did to a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    /// Classes and converter pairs added by the module.
    pub registered: usize,
    /// Return code of the registration entry point, 0 on success.
    pub code: i32,
}

impl Registration {
    pub fn succeeded(&self) -> bool {
        self.code == 0
    }

    /// Registries point into the module's code and it must not be unloaded.
    pub fn must_stay_loaded(&self) -> bool {
        self.succeeded() || self.registered > 0
    }
}

impl ModuleEntryPoints {
    /// Query the module name, then run registration against `ctx`.
    ///
    /// `fallback_name` is used when the module reports a null or empty name.
    ///
    /// # Safety
    ///
    /// Both functions must follow the module ABI: `get_name` returns null or
    /// a static NUL-terminated string, `register` only uses the context for
    /// registration.
    pub unsafe fn run(&self, ctx: &RegistryContext, fallback_name: &str) -> Registration {
        let ptr = (self.get_name)();
        let reported = if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(str::to_string)
        };
        let name = match reported {
            Some(name) if !name.is_empty() => name,
            _ => {
                tracing::warn!(
                    "Module did not report a usable name, using '{}'",
                    fallback_name
                );
                fallback_name.to_string()
            }
        };

        let before = ctx.registration_count();
        let code = (self.register)(ctx as *const RegistryContext);
        let registered = ctx.registration_count().saturating_sub(before);
        Registration {
            name,
            registered,
            code,
        }
    }
}

/// Load one module and run its registration entry point.
pub fn load_module(ctx: &RegistryContext, path: &Path) -> Result<String> {
    // SAFETY: loading runs the library's initializers; modules are trusted code.
    let library = unsafe { Library::new(path) }.map_err(|e| load_error(path, e.to_string()))?;

    // SAFETY: the symbol types match the documented module ABI.
    let entry_points = unsafe {
        let get_name = library
            .get::<ModuleGetNameFn>(&symbol_name(MODULE_GET_NAME_SYMBOL))
            .map(|s| *s)
            .map_err(|e| load_error(path, format!("missing {}: {}", MODULE_GET_NAME_SYMBOL, e)))?;
        let register = library
            .get::<ModuleRegisterFn>(&symbol_name(MODULE_REGISTER_SYMBOL))
            .map(|s| *s)
            .map_err(|e| load_error(path, format!("missing {}: {}", MODULE_REGISTER_SYMBOL, e)))?;
        ModuleEntryPoints { get_name, register }
    };

    let fallback = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    // SAFETY: the entry points come from a module library; ctx outlives the call.
    let registration = unsafe { entry_points.run(ctx, &fallback) };

    if registration.must_stay_loaded() {
        ctx.retain_library(LoadedModule {
            name: registration.name.clone(),
            path: path.to_path_buf(),
            _library: library,
        });
    }

    if !registration.succeeded() {
        if registration.registered > 0 {
            tracing::warn!(
                "Module '{}' failed after registering {} entries; keeping it loaded",
                registration.name,
                registration.registered
            );
        }
        return Err(load_error(
            path,
            format!(
                "registration of '{}' failed with code {}",
                registration.name, registration.code
            ),
        ));
    }

    tracing::info!(
        "Loaded module '{}' from {} ({} registrations)",
        registration.name,
        path.display(),
        registration.registered
    );
    Ok(registration.name)
}

/// Load every path independently. One failure never stops the others.
pub fn load_modules(ctx: &RegistryContext, paths: &[PathBuf]) -> Vec<ModuleLoadReport> {
    paths
        .iter()
        .map(|path| {
            let result = load_module(ctx, path);
            if let Err(e) = &result {
                tracing::warn!("{}", e);
            }
            ModuleLoadReport {
                path: path.clone(),
                result,
            }
        })
        .collect()
}

/// Whether `path` has this platform's shared library extension.
pub fn is_module_library(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(std::env::consts::DLL_EXTENSION))
}

/// Shared libraries directly inside `dirs`, sorted by path.
///
/// Missing or unreadable directories are skipped.
pub fn find_modules(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Skipping module directory {}: {}", dir.display(), e);
                continue;
            }
        };
        found.extend(
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_module_library(p)),
        );
    }
    found.sort();
    found
}

/// Export the module entry points from a `cdylib`.
///
/// ```ignore
/// mediaflow_rs::export_module!("my_module", |ctx| {
///     ctx.register_class("my_node", my_factory, my_configure);
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! export_module {
    ($name:literal, $register:expr) => {
        #[no_mangle]
        pub extern "C" fn mediaflow_1_module_get_name() -> *const ::std::os::raw::c_char {
            concat!($name, "\0").as_ptr() as *const ::std::os::raw::c_char
        }

        #[no_mangle]
        pub extern "C" fn mediaflow_1_module_register(
            ctx: *const $crate::pipeline::RegistryContext,
        ) -> i32 {
            // SAFETY: the host passes a pointer to a live context.
            let Some(ctx) = (unsafe { ctx.as_ref() }) else {
                return -1;
            };
            let register: fn(&$crate::pipeline::RegistryContext) -> $crate::Result<()> = $register;
            match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| register(ctx))) {
                Ok(Ok(())) => 0,
                Ok(Err(_)) => 1,
                Err(_) => 2,
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::node::{base_params, Node, NodeIo, StepOutcome};

    struct Idle;

    impl Node for Idle {
        fn step(&mut self, _io: &mut NodeIo) -> Result<StepOutcome> {
            Ok(StepOutcome::Finished)
        }
    }

    fn register_one(ctx: *const RegistryContext, id: &str) {
        // SAFETY: tests pass a live context.
        let ctx = unsafe { &*ctx };
        ctx.register_class(id, |_| Ok(Box::new(Idle) as Box<dyn Node>), base_params);
    }

    extern "C" fn named() -> *const c_char {
        b"named\0".as_ptr() as *const c_char
    }

    extern "C" fn unnamed() -> *const c_char {
        std::ptr::null()
    }

    extern "C" fn registers_one(ctx: *const RegistryContext) -> i32 {
        register_one(ctx, "from_module");
        0
    }

    extern "C" fn fails_after_one(ctx: *const RegistryContext) -> i32 {
        register_one(ctx, "half_done");
        1
    }

    extern "C" fn fails_immediately(_ctx: *const RegistryContext) -> i32 {
        7
    }

    #[test]
    fn test_entry_points_register() {
        let ctx = RegistryContext::new();
        let entry = ModuleEntryPoints {
            get_name: named,
            register: registers_one,
        };
        let registration = unsafe { entry.run(&ctx, "fallback") };
        assert_eq!(registration.name, "named");
        assert_eq!(registration.registered, 1);
        assert!(registration.succeeded());
        assert!(registration.must_stay_loaded());
        assert!(ctx.modules().is_registered("from_module"));
    }

    #[test]
    fn test_partial_registration_stays_loaded() {
        let ctx = RegistryContext::new();
        let entry = ModuleEntryPoints {
            get_name: unnamed,
            register: fails_after_one,
        };
        let registration = unsafe { entry.run(&ctx, "libhalf") };
        assert_eq!(registration.name, "libhalf");
        assert!(!registration.succeeded());
        assert!(registration.must_stay_loaded());
        assert!(ctx.modules().is_registered("half_done"));
    }

    #[test]
    fn test_failure_before_registering_can_unload() {
        let ctx = RegistryContext::new();
        let entry = ModuleEntryPoints {
            get_name: named,
            register: fails_immediately,
        };
        let registration = unsafe { entry.run(&ctx, "fallback") };
        assert_eq!(registration.code, 7);
        assert_eq!(registration.registered, 0);
        assert!(!registration.must_stay_loaded());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let ctx = RegistryContext::new();
        let err = load_module(&ctx, Path::new("/definitely/not/here.so")).unwrap_err();
        assert!(matches!(err, MediaFlowError::ModuleLoad { .. }));
        assert_eq!(ctx.loaded_modules().len(), 0);
    }

    #[test]
    fn test_is_module_library() {
        let ext = std::env::consts::DLL_EXTENSION;
        assert!(is_module_library(Path::new(&format!("libfoo.{}", ext))));
        assert!(!is_module_library(Path::new("libfoo.txt")));
        assert!(!is_module_library(Path::new("libfoo")));
    }

    #[test]
    fn test_symbol_name_is_nul_terminated() {
        assert_eq!(symbol_name("abc"), b"abc\0".to_vec());
    }
}

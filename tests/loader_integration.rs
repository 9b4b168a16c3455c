//! Integration tests for dynamic module discovery and loading failures

use mediaflow_rs::app::listing;
use mediaflow_rs::pipeline::loader::MODULE_GET_NAME_SYMBOL;
use mediaflow_rs::pipeline::{find_modules, RegistryContext};
use mediaflow_rs::MediaFlowError;
use std::path::PathBuf;
use tempfile::TempDir;

/// A shared library every host has that exports no module entry points.
#[cfg(target_os = "linux")]
const SYSTEM_LIBRARY: Option<&str> = Some("libm.so.6");
#[cfg(target_os = "macos")]
const SYSTEM_LIBRARY: Option<&str> = Some("/usr/lib/libSystem.B.dylib");
#[cfg(windows)]
const SYSTEM_LIBRARY: Option<&str> = Some("kernel32.dll");
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
const SYSTEM_LIBRARY: Option<&str> = None;

fn library_name(stem: &str) -> String {
    format!("{}.{}", stem, std::env::consts::DLL_EXTENSION)
}

fn write_garbage(dir: &TempDir, stem: &str) -> PathBuf {
    let path = dir.path().join(library_name(stem));
    std::fs::write(&path, b"definitely not a shared library").unwrap();
    path
}

#[test]
fn test_find_modules_filters_and_sorts() {
    let dir = TempDir::new().unwrap();
    write_garbage(&dir, "zeta");
    write_garbage(&dir, "alpha");
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    std::fs::create_dir(dir.path().join(library_name("subdir"))).unwrap();

    let found = find_modules(&[dir.path().to_path_buf(), PathBuf::from("/does/not/exist")]);
    let names: Vec<String> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![library_name("alpha"), library_name("zeta")]);
}

#[test]
fn test_garbage_library_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let path = write_garbage(&dir, "broken");

    let ctx = RegistryContext::with_builtins();
    let before = ctx.modules().len();
    let err = ctx.load_module(&path).unwrap_err();
    assert!(matches!(err, MediaFlowError::ModuleLoad { .. }));
    assert_eq!(ctx.modules().len(), before);
    assert!(ctx.loaded_modules().is_empty());
}

#[test]
fn test_missing_file_is_a_load_error() {
    let ctx = RegistryContext::new();
    let err = ctx
        .load_module(&PathBuf::from(library_name("/nonexistent/module")))
        .unwrap_err();
    assert!(err.to_string().contains("nonexistent"));
}

#[test]
fn test_one_failure_does_not_stop_others() {
    let dir = TempDir::new().unwrap();
    let paths = vec![write_garbage(&dir, "a"), write_garbage(&dir, "b")];

    let ctx = RegistryContext::with_builtins();
    let reports = ctx.load_modules(&paths);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.result.is_err()));
    assert_eq!(reports[1].path, paths[1]);
    // Built-ins are untouched
    assert!(ctx.modules().is_registered("pattern"));
}

#[test]
fn test_check_module_reports_failure() {
    let dir = TempDir::new().unwrap();
    let path = write_garbage(&dir, "bad");
    assert!(listing::check_module(&path).is_err());
}

#[test]
fn test_library_without_entry_points_is_a_load_error() {
    let Some(library) = SYSTEM_LIBRARY else {
        return;
    };

    let ctx = RegistryContext::with_builtins();
    let before = ctx.modules().len();
    let err = ctx.load_module(&PathBuf::from(library)).unwrap_err();
    assert!(matches!(err, MediaFlowError::ModuleLoad { .. }), "{}", err);
    assert!(err.to_string().contains(MODULE_GET_NAME_SYMBOL), "{}", err);
    assert!(ctx.loaded_modules().is_empty());
    assert_eq!(ctx.modules().len(), before);
}

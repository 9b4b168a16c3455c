//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use mediaflow_rs::{RegistryContext, RuntimeConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency used by test pipelines, short so cancellation is observed quickly
pub const TEST_LATENCY_MS: u64 = 20;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Runtime config without module directories and with a short latency
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        module_dirs: Vec::new(),
        default_latency_ms: TEST_LATENCY_MS,
        ..RuntimeConfig::default()
    }
}

/// Context with the built-in classes only
pub fn test_context() -> Arc<RegistryContext> {
    Arc::new(RegistryContext::with_builtins())
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

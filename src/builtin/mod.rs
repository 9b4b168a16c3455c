//! Statically linked modules.
//!
//! These register through the same [`RegistryContext`] calls a dynamic
//! module makes from its `mediaflow_1_module_register` entry point.

pub mod convert;
pub mod dummy;
pub mod frame_info;
pub mod null;
pub mod pattern;

use crate::pipeline::RegistryContext;

/// Register every built-in class and converter.
pub fn register_all(ctx: &RegistryContext) {
    ctx.register_class(dummy::CLASS, dummy::create, dummy::configure);
    ctx.register_class(frame_info::CLASS, frame_info::create, frame_info::configure);
    ctx.register_class(null::CLASS, null::create, null::configure);
    ctx.register_class(pattern::CLASS, pattern::create, pattern::configure);
    convert::register(ctx);
}

//! Dataflow runtime.
//!
//! Nodes run one per thread and only talk through pipes:
//!
//! ```text
//! [pattern] ──pipe(rgb24)──► [rgb_to_y8] ──pipe(y8)──► [frame_info]
//!                                 ▲ inserted at build time
//! ```
//!
//! - [`registry`] / [`converter`]: what classes exist and which convert formats.
//! - [`context`]: both registries plus the dynamic libraries behind them.
//! - [`node`] / [`scheduler`]: the node contract and its thread.
//! - [`pipe`]: frame transport with an explicit backpressure policy.
//! - [`executor`]: a built graph, started and stopped as a whole.

pub mod cancel;
pub mod context;
pub mod converter;
pub mod executor;
pub mod loader;
pub mod node;
pub mod pipe;
pub mod registry;
pub mod scheduler;

pub use cancel::CancellationToken;
pub use context::RegistryContext;
pub use converter::{ConverterChoice, ConverterEntry, ConverterRegistry};
pub use executor::{Edge, Pipeline, RunSummary};
pub use loader::{
    find_modules, load_modules, LoadedModule, ModuleEntryPoints, ModuleLoadReport, Registration,
};
pub use node::{
    base_params, FilterNode, IoFilter, Node, NodeEvent, NodeInit, NodeIo, ParentHandle, StepOutcome,
};
pub use pipe::{Pipe, PipePolicy, PipeReader, PipeStats, PipeWriter, PushOutcome};
pub use registry::{Configurator, ModuleRegistry, NodeFactory};
pub use scheduler::{NodeState, NodeThread, ThreadOptions};

//! # MediaFlow-RS: plugin-based real-time media dataflow runtime
//!
//! Pipelines are graphs of nodes, each running on its own thread and
//! exchanging reference-counted frames through bounded pipes. Node classes
//! come from a registry that statically linked code and dynamically loaded
//! modules fill at startup.
//!
//! ## Architecture
//!
//! - **Frames**: raw video, compressed video and raw audio, backed by
//!   shareable planes allocated from the heap or a fixed-size block pool
//! - **Registry**: node classes with their default parameters, and
//!   converters between formats
//! - **Builder**: negotiates formats on every link, inserting converters
//!   where producer and consumer have no format in common
//! - **Scheduler**: one thread per node, cooperative cancellation, each node
//!   bounded by its latency budget
//!
//! ## Configuration
//!
//! Modules are searched in the platform-appropriate data directory under
//! `dev.mediaflow.mediaflow-rs/modules`, plus any directory listed in the
//! runtime config or passed on the command line.
//!
//! ## Example
//!
//! ```no_run
//! use mediaflow_rs::{
//!     app::ApplicationBuilder,
//!     config::{LinkDescription, NodeDescription, PipelineDescription, RuntimeConfig},
//!     pipeline::RegistryContext,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> mediaflow_rs::Result<()> {
//!     let description = PipelineDescription::new("demo")
//!         .with_node(NodeDescription::new("src", "pattern").with_param("frames", 100))
//!         .with_node(NodeDescription::new("sink", "null"))
//!         .with_link(LinkDescription::new("src", "sink"));
//!
//!     let context = Arc::new(RegistryContext::with_builtins());
//!     let builder = ApplicationBuilder::new(context, RuntimeConfig::default());
//!     let summary = builder.build(&description)?.run()?;
//!     println!("{} nodes finished", summary.finished.len());
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod builtin;
pub mod config;
pub mod error;
pub mod frame;
pub mod params;
pub mod pipeline;

// Re-export commonly used types
pub use app::ApplicationBuilder;
pub use config::{PipelineDescription, RuntimeConfig};
pub use error::{MediaFlowError, Result};
pub use frame::{Frame, FormatId, RawVideoFrame, Resolution};
pub use params::{ParamValue, ParameterSet};
pub use pipeline::{CancellationToken, Pipeline, RegistryContext};

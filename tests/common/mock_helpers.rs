//! Mock node classes for driving pipelines from tests

use mediaflow_rs::frame::Frame;
use mediaflow_rs::pipeline::{base_params, Node, NodeInit, NodeIo, RegistryContext, StepOutcome};
use mediaflow_rs::{FormatId, MediaFlowError, ParameterSet, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Frames received by a collector sink
pub type Collected = Arc<Mutex<Vec<Frame>>>;

/// Sink that stores every frame it receives
struct Collector {
    frames: Collected,
}

impl Node for Collector {
    fn step(&mut self, io: &mut NodeIo) -> Result<StepOutcome> {
        if let Some(frame) = io.pop_wait(0) {
            self.frames.lock().unwrap().push(frame);
        }
        Ok(StepOutcome::Continue)
    }
}

/// Register a sink class accepting `accepts` (empty: anything)
pub fn register_collector(ctx: &RegistryContext, class: &str, accepts: &[FormatId]) -> Collected {
    let frames: Collected = Arc::default();
    let shared = Arc::clone(&frames);
    let accepts = accepts.to_vec();
    ctx.register_class(
        class,
        move |_init: NodeInit| -> Result<Box<dyn Node>> {
            Ok(Box::new(Collector {
                frames: Arc::clone(&shared),
            }))
        },
        move || {
            let mut p = base_params().with_description("Collects frames for tests");
            p.set_input_formats(accepts.iter().copied());
            p.set_max_pipes(Some(1), Some(0));
            p
        },
    );
    frames
}

/// Node that fails on its first step
struct Failing;

impl Node for Failing {
    fn step(&mut self, _io: &mut NodeIo) -> Result<StepOutcome> {
        Err(MediaFlowError::node("failing", "deliberate failure"))
    }
}

/// Node that panics on its first step
struct Panicking;

impl Node for Panicking {
    fn step(&mut self, _io: &mut NodeIo) -> Result<StepOutcome> {
        panic!("deliberate panic");
    }
}

pub fn register_failing(ctx: &RegistryContext, class: &str) {
    ctx.register_class(class, |_| Ok(Box::new(Failing) as Box<dyn Node>), base_params);
}

pub fn register_panicking(ctx: &RegistryContext, class: &str) {
    ctx.register_class(class, |_| Ok(Box::new(Panicking) as Box<dyn Node>), base_params);
}

/// Source that never produces and never finishes on its own
struct Idle;

impl Node for Idle {
    fn step(&mut self, io: &mut NodeIo) -> Result<StepOutcome> {
        io.sleep(io.latency());
        Ok(StepOutcome::Continue)
    }
}

pub fn register_idle(ctx: &RegistryContext, class: &str) {
    ctx.register_class(class, |_| Ok(Box::new(Idle) as Box<dyn Node>), base_params);
}

/// Register a class whose factory counts its invocations
pub fn register_counting(
    ctx: &RegistryContext,
    class: &str,
    configure: fn() -> ParameterSet,
) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let shared = Arc::clone(&count);
    ctx.register_class(
        class,
        move |_init: NodeInit| -> Result<Box<dyn Node>> {
            shared.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Idle))
        },
        configure,
    );
    count
}

//! `null`: sink that discards everything it receives.

use crate::error::Result;
use crate::params::ParameterSet;
use crate::pipeline::{base_params, Node, NodeInit, NodeIo, StepOutcome};

pub const CLASS: &str = "null";

pub fn configure() -> ParameterSet {
    let mut p = base_params().with_description("Discards all incoming frames");
    p.set_max_pipes(None, Some(0));
    p
}

pub fn create(_init: NodeInit) -> Result<Box<dyn Node>> {
    Ok(Box::new(NullSink::default()))
}

#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
    bytes: u64,
}

impl Node for NullSink {
    fn step(&mut self, io: &mut NodeIo) -> Result<StepOutcome> {
        let mut drained = false;
        while let Some((_, frame)) = io.pop_any() {
            self.frames += 1;
            self.bytes += frame.size() as u64;
            drained = true;
        }
        if !drained {
            io.wait_for_input(io.latency());
        }
        Ok(StepOutcome::Continue)
    }

    fn stop(&mut self, _io: &mut NodeIo) {
        tracing::info!("Discarded {} frames ({} bytes)", self.frames, self.bytes);
    }
}

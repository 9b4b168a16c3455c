//! `dummy`: forwards raw video from input 0 to output 0. For testing only.

use crate::error::Result;
use crate::frame::FormatGroup;
use crate::params::{Parameter, ParameterSet};
use crate::pipeline::{base_params, Node, NodeInit, NodeIo, StepOutcome};

pub const CLASS: &str = "dummy";

pub fn configure() -> ParameterSet {
    let mut p = base_params().with_description("Dummy module. For testing only.");
    p.define("size", 666, "Set size of something (ignored)")
        .define("name", "", "Set name");
    p.set_max_pipes(Some(1), Some(1));
    p
}

pub fn create(_init: NodeInit) -> Result<Box<dyn Node>> {
    Ok(Box::new(DummyNode::default()))
}

#[derive(Debug, Default)]
pub struct DummyNode {
    dummy_name: String,
    size: i64,
}

impl Node for DummyNode {
    fn set_param(&mut self, param: &Parameter) -> bool {
        match param.name.as_str() {
            "name" => self.dummy_name = param.value.to_string(),
            "size" => self.size = param.value.as_int().unwrap_or_default(),
            _ => return false,
        }
        true
    }

    fn start(&mut self, _io: &mut NodeIo) -> Result<()> {
        if !self.dummy_name.is_empty() {
            tracing::info!("Got name {}", self.dummy_name);
        }
        Ok(())
    }

    fn step(&mut self, io: &mut NodeIo) -> Result<StepOutcome> {
        if let Some(frame) = io.pop_wait(0) {
            if frame.group() == FormatGroup::RawVideo {
                io.push(0, frame);
            }
        }
        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_param_dispatch() {
        let mut node = DummyNode::default();
        assert!(node.set_param(&Parameter::new("name", "hello")));
        assert!(node.set_param(&Parameter::new("size", 3)));
        assert!(!node.set_param(&Parameter::new("latency", 10)));
        assert_eq!(node.dummy_name, "hello");
        assert_eq!(node.size, 3);
    }

    #[test]
    fn test_configure() {
        let p = configure();
        assert_eq!(p.get_int("size"), Some(666));
        assert_eq!(p.max_inputs(), Some(1));
        assert!(p.contains("latency"));
    }
}

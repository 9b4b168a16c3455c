//! Test data builders for pipeline descriptions

use mediaflow_rs::config::{LinkDescription, NodeDescription, PipelineDescription};
use mediaflow_rs::pipeline::PipePolicy;
use mediaflow_rs::ParamValue;

/// Builder for creating test pipeline descriptions
pub struct DescriptionBuilder {
    description: PipelineDescription,
}

impl DescriptionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            description: PipelineDescription::new(name),
        }
    }

    pub fn node(mut self, name: &str, class: &str) -> Self {
        self.description.nodes.push(NodeDescription::new(name, class));
        self
    }

    pub fn node_with(mut self, name: &str, class: &str, params: &[(&str, ParamValue)]) -> Self {
        let mut node = NodeDescription::new(name, class);
        for (k, v) in params {
            node = node.with_param(*k, v.clone());
        }
        self.description.nodes.push(node);
        self
    }

    /// A pattern source emitting `frames` small frames as fast as allowed
    pub fn pattern(self, name: &str, format: &str, frames: i64) -> Self {
        self.node_with(
            name,
            "pattern",
            &[
                ("format", format.into()),
                ("frames", frames.into()),
                ("resolution", "8x4".into()),
                ("fps", 1000.0.into()),
                ("fixed", false.into()),
            ],
        )
    }

    pub fn link(mut self, from: &str, to: &str) -> Self {
        self.description.links.push(LinkDescription::new(from, to));
        self
    }

    pub fn link_with(mut self, from: &str, to: &str, policy: PipePolicy) -> Self {
        self.description
            .links
            .push(LinkDescription::new(from, to).with_policy(policy));
        self
    }

    pub fn variable(mut self, name: &str, value: &str) -> Self {
        self.description.set_variable(name, value);
        self
    }

    pub fn build(self) -> PipelineDescription {
        self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_builder() {
        let d = DescriptionBuilder::new("t")
            .pattern("src", "rgb24", 3)
            .node("sink", "null")
            .link("src", "sink")
            .build();

        assert_eq!(d.nodes.len(), 2);
        assert_eq!(d.links[0].from, "src");
        assert!(d.validate().is_ok());
    }
}

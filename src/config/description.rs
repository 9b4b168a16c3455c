//! Pipeline description files.
//!
//! ```toml
//! name = "preview"
//!
//! [variables]
//! res = "640x480"
//!
//! [[node]]
//! name = "src"
//! class = "pattern"
//! params = { resolution = "${res}", format = "rgb24" }
//!
//! [[node]]
//! name = "info"
//! class = "frame_info"
//!
//! [[link]]
//! from = "src:0"
//! to = "info:0"
//! policy = { kind = "latest" }
//! ```
//!
//! `${name}` in string parameter values is replaced from `[variables]`.

use crate::error::{MediaFlowError, Result};
use crate::params::ParamValue;
use crate::pipeline::PipePolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// One node instance of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl NodeDescription {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// A connection from a node output to a node input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescription {
    /// `"node:port"`; the port defaults to 0
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PipePolicy>,
    /// Format the producer will emit on this link, by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl LinkDescription {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            policy: None,
            format: None,
        }
    }

    pub fn with_policy(mut self, policy: PipePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// A parsed `"node:port"` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: String,
    pub port: usize,
}

impl Endpoint {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (node, port) = match s.rsplit_once(':') {
            Some((node, port)) => {
                let port = port.trim().parse().map_err(|_| {
                    MediaFlowError::Configuration(format!("Invalid port in endpoint '{}'", s))
                })?;
                (node.trim(), port)
            }
            None => (s, 0),
        };
        if node.is_empty() {
            return Err(MediaFlowError::Configuration(format!(
                "Endpoint '{}' has no node name",
                s
            )));
        }
        Ok(Self {
            node: node.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// A complete pipeline graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeDescription>,

    #[serde(default, rename = "link")]
    pub links: Vec<LinkDescription>,
}

impl PipelineDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_node(mut self, node: NodeDescription) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_link(mut self, link: LinkDescription) -> Self {
        self.links.push(link);
        self
    }

    /// Load a description; `.json` files are JSON, anything else TOML
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MediaFlowError::Configuration(format!("Failed to read pipeline {:?}: {}", path, e))
        })?;
        let parsed = if is_json(path) {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        let mut description =
            parsed.map_err(|e| e.with_context(format!("Failed to parse pipeline {:?}", path)))?;
        if description.name.is_empty() {
            if let Some(stem) = path.file_stem() {
                description.name = stem.to_string_lossy().into_owned();
            }
        }
        Ok(description)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Save in the format matching the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        std::fs::write(path, content).map_err(|e| {
            MediaFlowError::Configuration(format!("Failed to write pipeline {:?}: {}", path, e))
        })
    }

    pub fn node(&self, name: &str) -> Option<&NodeDescription> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Set or override a variable
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Copy with every `${var}` in string parameters replaced.
    ///
    /// Referencing an undefined variable is a configuration error.
    pub fn resolve_variables(&self) -> Result<Self> {
        let mut resolved = self.clone();
        for node in &mut resolved.nodes {
            let node_name = node.name.clone();
            for (name, value) in node.params.iter_mut() {
                if let ParamValue::String(s) = value {
                    *s = substitute(s, &self.variables).map_err(|e| {
                        e.with_context(format!("parameter '{}' of node '{}'", name, node_name))
                    })?;
                }
            }
        }
        Ok(resolved)
    }

    /// Structural checks: unique non-empty node names, well-formed links
    /// referencing existing nodes.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err(MediaFlowError::Configuration(format!(
                    "Node of class '{}' has no name",
                    node.class
                )));
            }
            if !names.insert(node.name.as_str()) {
                return Err(MediaFlowError::Configuration(format!(
                    "Duplicate node name '{}'",
                    node.name
                )));
            }
        }
        for link in &self.links {
            for endpoint in [&link.from, &link.to] {
                let endpoint = Endpoint::parse(endpoint)?;
                if !names.contains(endpoint.node.as_str()) {
                    return Err(MediaFlowError::Configuration(format!(
                        "Link references unknown node '{}'",
                        endpoint.node
                    )));
                }
            }
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn substitute(input: &str, variables: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            MediaFlowError::Configuration(format!("Unterminated variable reference in '{}'", input))
        })?;
        let name = &after[..end];
        let value = variables.get(name).ok_or_else(|| {
            MediaFlowError::Configuration(format!("Undefined variable '{}'", name))
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

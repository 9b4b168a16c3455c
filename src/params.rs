//! Parameter store: typed, named, defaulted configuration for node types.
//!
//! Every registered class describes itself with a [`ParameterSet`]: the
//! parameters it understands (with defaults and descriptions), the formats
//! it accepts on its inputs and produces on its outputs, and how many pipes
//! it can take. The application builder layers user values over these
//! defaults with [`ParameterSet::merge`] before constructing a node.

use crate::error::{MediaFlowError, Result};
use crate::frame::format::{self, FormatId};
use crate::frame::Resolution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a parameter, taken from its default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    String,
    Resolution,
    Format,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::String => "string",
            ParamKind::Resolution => "resolution",
            ParamKind::Format => "format",
        };
        f.write_str(s)
    }
}

/// A parameter value.
///
/// Getters are lenient: a string holding `"800x600"` reads as a resolution,
/// `"true"` as a bool, `"rgb24"` as a format. Values coming from pipeline
/// description files are mostly strings and numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Resolution(Resolution),
    #[serde(skip)]
    Format(FormatId),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::String(_) => ParamKind::String,
            ParamValue::Resolution(_) => ParamKind::Resolution,
            ParamValue::Format(_) => ParamKind::Format,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Int(v) => Some(*v != 0),
            ParamValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Bool(v) => Some(*v as i64),
            ParamValue::Float(v) if v.is_finite() => Some(*v as i64),
            ParamValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_resolution(&self) -> Option<Resolution> {
        match self {
            ParamValue::Resolution(r) => Some(*r),
            ParamValue::String(s) => Resolution::parse(s),
            _ => None,
        }
    }

    pub fn as_format(&self) -> Option<FormatId> {
        match self {
            ParamValue::Format(f) => Some(*f),
            ParamValue::String(s) => format::format_by_name(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::String(v) => f.write_str(v),
            ParamValue::Resolution(r) => write!(f, "{}", r),
            ParamValue::Format(id) => f.write_str(format::format_name(*id)),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl From<Resolution> for ParamValue {
    fn from(v: Resolution) -> Self {
        ParamValue::Resolution(v)
    }
}

impl From<FormatId> for ParamValue {
    fn from(v: FormatId) -> Self {
        ParamValue::Format(v)
    }
}

/// A single named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    pub default: ParamValue,
    pub description: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        let default = default.into();
        Self {
            name: name.into(),
            value: default.clone(),
            default,
            description: String::new(),
        }
    }

    /// Type declared by the default value.
    pub fn declared_type(&self) -> ParamKind {
        self.default.kind()
    }

    pub fn is_default(&self) -> bool {
        self.value == self.default
    }
}

/// Parameters of a node type or node instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    description: String,
    params: BTreeMap<String, Parameter>,
    input_formats: Vec<FormatId>,
    output_formats: Vec<FormatId>,
    max_inputs: Option<usize>,
    max_outputs: Option<usize>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Declare a parameter with its default and description.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        default: impl Into<ParamValue>,
        description: impl Into<String>,
    ) -> &mut Self {
        let mut param = Parameter::new(name, default);
        param.description = description.into();
        self.params.insert(param.name.clone(), param);
        self
    }

    /// Set a value. Unknown names are inserted as undeclared parameters.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        let value = value.into();
        match self.params.get_mut(name) {
            Some(param) => param.value = value,
            None => {
                let mut param = Parameter::new(name, value);
                param.description.clear();
                self.params.insert(name.to_string(), param);
            }
        }
        self
    }

    /// Layer `other` on top of `self`: its values win, its formats win when declared.
    pub fn merge(&mut self, other: &ParameterSet) {
        for (name, param) in &other.params {
            match self.params.get_mut(name) {
                Some(existing) => {
                    existing.value = param.value.clone();
                    if !param.description.is_empty() {
                        existing.description = param.description.clone();
                    }
                }
                None => {
                    self.params.insert(name.clone(), param.clone());
                }
            }
        }
        if !other.description.is_empty() {
            self.description = other.description.clone();
        }
        if !other.input_formats.is_empty() {
            self.input_formats = other.input_formats.clone();
        }
        if !other.output_formats.is_empty() {
            self.output_formats = other.output_formats.clone();
        }
        if other.max_inputs.is_some() {
            self.max_inputs = other.max_inputs;
        }
        if other.max_outputs.is_some() {
            self.max_outputs = other.max_outputs;
        }
    }

    /// Apply plain name → value overrides.
    pub fn apply<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
    {
        for (name, value) in values {
            self.set(name, value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name).map(|p| &p.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Value of a parameter that must be present.
    pub fn require(&self, name: &str) -> Result<&ParamValue> {
        self.value(name).ok_or_else(|| {
            MediaFlowError::Configuration(format!("required parameter '{}' is missing", name))
        })
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(ParamValue::as_bool)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(ParamValue::as_int)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(ParamValue::as_float)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(ParamValue::as_str)
    }

    pub fn get_resolution(&self, name: &str) -> Option<Resolution> {
        self.value(name).and_then(ParamValue::as_resolution)
    }

    pub fn get_format(&self, name: &str) -> Option<FormatId> {
        self.value(name).and_then(ParamValue::as_format)
    }

    /// Parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    // ── Format affinities ──

    pub fn input_formats(&self) -> &[FormatId] {
        &self.input_formats
    }

    pub fn output_formats(&self) -> &[FormatId] {
        &self.output_formats
    }

    pub fn set_input_formats(&mut self, formats: impl IntoIterator<Item = FormatId>) -> &mut Self {
        self.input_formats = formats.into_iter().collect();
        self
    }

    pub fn set_output_formats(&mut self, formats: impl IntoIterator<Item = FormatId>) -> &mut Self {
        self.output_formats = formats.into_iter().collect();
        self
    }

    /// Limit the number of input/output pipes. `None` leaves a side unlimited.
    pub fn set_max_pipes(&mut self, inputs: Option<usize>, outputs: Option<usize>) -> &mut Self {
        self.max_inputs = inputs;
        self.max_outputs = outputs;
        self
    }

    pub fn max_inputs(&self) -> Option<usize> {
        self.max_inputs
    }

    pub fn max_outputs(&self) -> Option<usize> {
        self.max_outputs
    }
}

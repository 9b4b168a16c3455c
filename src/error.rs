//! Error handling for the MediaFlow runtime
//!
//! This module defines the error taxonomy shared by the registries, the
//! module loader, the application builder and the node scheduler, plus a
//! Result alias for use throughout the crate.

use crate::frame::FormatId;
use thiserror::Error;

/// Main error type for MediaFlow operations
#[derive(Error, Debug)]
pub enum MediaFlowError {
    /// A class id was looked up that no module registered
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// A node factory failed while constructing its node
    #[error("Initialization of '{class}' failed: {reason}")]
    InitializationFailed { class: String, reason: String },

    /// A dynamic module could not be opened or is missing an entry point
    #[error("Failed to load module {path}: {reason}")]
    ModuleLoad { path: String, reason: String },

    /// No direct connection or converter exists between two nodes
    #[error(
        "Incompatible formats: '{producer}' produces [{}] but '{consumer}' accepts [{}]",
        format_list(.output_formats),
        format_list(.input_formats)
    )]
    IncompatibleFormats {
        producer: String,
        output_formats: Vec<FormatId>,
        consumer: String,
        input_formats: Vec<FormatId>,
    },

    /// Malformed or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors related to pipe transport
    #[error("Pipe error: {0}")]
    Pipe(String),

    /// A node reported an error from inside its scheduling loop
    #[error("Node '{node}' error: {message}")]
    Node { node: String, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MediaFlowError>,
    },
}

fn format_list(formats: &[FormatId]) -> String {
    formats
        .iter()
        .map(|f| crate::frame::format::format_name(*f))
        .collect::<Vec<_>>()
        .join(", ")
}

impl MediaFlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        MediaFlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a node-local runtime error
    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        MediaFlowError::Node {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a construction failure
    pub fn init_failed(class: impl Into<String>, reason: impl Into<String>) -> Self {
        MediaFlowError::InitializationFailed {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error (or the error it wraps) is of the given kind.
    pub fn root(&self) -> &MediaFlowError {
        match self {
            MediaFlowError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for MediaFlow operations
pub type Result<T> = std::result::Result<T, MediaFlowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl From<toml::de::Error> for MediaFlowError {
    fn from(err: toml::de::Error) -> Self {
        MediaFlowError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for MediaFlowError {
    fn from(err: toml::ser::Error) -> Self {
        MediaFlowError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for MediaFlowError {
    fn from(err: serde_json::Error) -> Self {
        MediaFlowError::Serialization(err.to_string())
    }
}

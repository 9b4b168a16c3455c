//! Human and JSON listings of what a context knows about.

use crate::config::PipelineDescription;
use crate::error::Result;
use crate::frame::format;
use crate::params::ParameterSet;
use crate::pipeline::RegistryContext;
use serde_json::{json, Value};
use std::fmt::Write;
use std::path::Path;

fn format_names(formats: &[format::FormatId]) -> Vec<&'static str> {
    formats.iter().map(|&f| format::format_name(f)).collect()
}

// ==== Classes ====

pub fn list_classes(ctx: &RegistryContext) -> String {
    let mut out = String::from("List of registered classes:\n");
    for name in ctx.modules().list_registered() {
        let _ = writeln!(out, "..:: {} ::..", name);
        match ctx.modules().get_params(&name) {
            Ok(params) => write_class(&mut out, &params),
            Err(_) => out.push_str("\t\tclass has no configuration defined!\n"),
        }
    }
    out
}

fn write_class(out: &mut String, params: &ParameterSet) {
    if !params.description().is_empty() {
        let _ = writeln!(out, "\t{}", params.description());
    }
    if params.input_formats().is_empty() {
        out.push_str("\t\tNo restrictions on input formats\n");
    }
    for name in format_names(params.input_formats()) {
        let _ = writeln!(out, "\t\tSupports input format: {}", name);
    }
    if params.output_formats().is_empty() {
        out.push_str("\t\tNo restrictions on output formats\n");
    }
    for name in format_names(params.output_formats()) {
        let _ = writeln!(out, "\t\tSupports output format: {}", name);
    }
    if params.is_empty() {
        out.push_str("\t\tClass has no parameters\n");
    }
    for p in params.iter() {
        let _ = writeln!(out, "\t\t'{}' has default value \"{}\"", p.name, p.default);
        if !p.description.is_empty() {
            let _ = writeln!(out, "\t\t\t{}", p.description);
        }
    }
}

pub fn classes_json(ctx: &RegistryContext) -> Value {
    let classes: Vec<Value> = ctx
        .modules()
        .list_registered()
        .into_iter()
        .filter_map(|name| {
            let params = ctx.modules().get_params(&name).ok()?;
            let defaults: serde_json::Map<String, Value> = params
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        json!({
                            "default": p.default.to_string(),
                            "type": p.declared_type().to_string(),
                            "description": p.description,
                        }),
                    )
                })
                .collect();
            Some(json!({
                "name": name,
                "description": params.description(),
                "input_formats": format_names(params.input_formats()),
                "output_formats": format_names(params.output_formats()),
                "max_inputs": params.max_inputs(),
                "max_outputs": params.max_outputs(),
                "params": defaults,
            }))
        })
        .collect();
    Value::Array(classes)
}

// ==== Formats ====

pub fn list_formats() -> String {
    let mut out = String::from("List of registered formats:\n");
    for info in format::all_formats() {
        let _ = writeln!(out, "{} ({})", info.long_name, info.group);
        if !info.short_names.is_empty() {
            let _ = writeln!(out, "\tAvailable as: {}", info.short_names.join(", "));
        }
        if !info.mime_types.is_empty() {
            let _ = writeln!(out, "\tUses mime types: {}", info.mime_types.join(", "));
        }
    }
    out
}

pub fn formats_json() -> Value {
    Value::Array(
        format::all_formats()
            .iter()
            .map(|info| {
                json!({
                    "id": info.id.0,
                    "name": info.name(),
                    "long_name": info.long_name,
                    "short_names": info.short_names,
                    "mime_types": info.mime_types,
                    "group": info.group.to_string(),
                })
            })
            .collect(),
    )
}

// ==== Converters ====

pub fn list_converters(ctx: &RegistryContext) -> String {
    let mut out = String::new();
    for ((input, output), entries) in ctx.converters().get_all_converters() {
        let _ = writeln!(
            out,
            "Converters from {} to {}",
            format::format_name(input),
            format::format_name(output)
        );
        for entry in entries {
            let _ = writeln!(out, "\t{}", entry.class_id);
        }
    }
    if out.is_empty() {
        out.push_str("No converters registered\n");
    }
    out
}

pub fn converters_json(ctx: &RegistryContext) -> Value {
    let entries: Vec<_> = ctx
        .converters()
        .get_all_converters()
        .into_values()
        .flatten()
        .collect();
    serde_json::to_value(entries).unwrap_or(Value::Null)
}

// ==== Application ====

/// Summary of a pipeline file: name, description, variables.
pub fn app_info(description: &PipelineDescription, program: &str, file: &str) -> String {
    let mut out = format!("Application {}\n", description.name);
    if !description.description.is_empty() {
        let _ = writeln!(out, "Description: {}", description.description);
    }
    let _ = writeln!(out, "Usage: {} {} [name=value ...]", program, file);
    let _ = writeln!(out, "Nodes: {}, links: {}", description.nodes.len(), description.links.len());
    if !description.variables.is_empty() {
        out.push_str("Variables:\n");
        for (name, value) in &description.variables {
            let _ = writeln!(out, "  {:<20} [default value: {}]", format!("{}:", name), value);
        }
    }
    out
}

// ==== Module check ====

/// Load one module into an empty context and report what it registered.
pub fn check_module(path: &Path) -> Result<String> {
    let ctx = RegistryContext::new();
    let name = ctx.load_module(path)?;
    let mut out = format!("Module '{}' loaded from {}\n", name, path.display());
    let classes = ctx.modules().list_registered();
    let converters = ctx.converters().len();
    let _ = writeln!(out, "{} class(es), {} converter(s)", classes.len(), converters);
    for class in classes {
        let _ = writeln!(out, "\t{}", class);
    }
    if converters > 0 {
        out.push_str(&list_converters(&ctx));
    }
    Ok(out)
}

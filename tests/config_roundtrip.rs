//! Integration tests for runtime config and pipeline description files

use mediaflow_rs::config::{LinkDescription, NodeDescription, PipelineDescription, RuntimeConfig};
use mediaflow_rs::pipeline::PipePolicy;
use mediaflow_rs::{ApplicationBuilder, ParamValue, RegistryContext};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn sample() -> PipelineDescription {
    let mut d = PipelineDescription::new("roundtrip")
        .with_node(
            NodeDescription::new("src", "pattern")
                .with_param("frames", 3)
                .with_param("resolution", "32x16")
                .with_param("fps", 60.0),
        )
        .with_node(NodeDescription::new("sink", "null").with_param("latency", 10))
        .with_link(
            LinkDescription::new("src:0", "sink:0")
                .with_policy(PipePolicy::DropOldest { capacity: 4 }),
        );
    d.description = "Pattern into the void".to_string();
    d.set_variable("fps", "60");
    d
}

#[test]
fn test_runtime_config_save_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let config = RuntimeConfig {
        module_dirs: vec![PathBuf::from("/opt/mediaflow/modules")],
        default_latency_ms: 50,
        default_pipe: PipePolicy::Latest,
        stop_on_node_failure: true,
        log_filter: Some("debug".to_string()),
    };
    config.save(&path).unwrap();
    assert_eq!(RuntimeConfig::load(&path).unwrap(), config);
}

#[test]
fn test_runtime_config_load_or_default() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    assert_eq!(RuntimeConfig::load_or_default(&missing), RuntimeConfig::default());

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "default_latency_ms = \"soon\"").unwrap();
    assert!(RuntimeConfig::load(&broken).is_err());
    assert_eq!(RuntimeConfig::load_or_default(&broken), RuntimeConfig::default());
}

#[test]
fn test_description_toml_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipe.toml");
    let d = sample();
    d.save(&path).unwrap();
    assert_eq!(PipelineDescription::load(&path).unwrap(), d);
}

#[test]
fn test_description_json_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipe.json");
    let d = sample();
    d.save(&path).unwrap();
    let loaded = PipelineDescription::load(&path).unwrap();
    assert_eq!(loaded, d);
    assert_eq!(
        loaded.node("sink").unwrap().params.get("latency"),
        Some(&ParamValue::Int(10))
    );
}

#[test]
fn test_name_defaults_to_file_stem() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("preview.toml");
    std::fs::write(
        &path,
        r#"
[[node]]
name = "src"
class = "pattern"

[[node]]
name = "sink"
class = "null"

[[link]]
from = "src"
to = "sink"
policy = { kind = "latest" }
"#,
    )
    .unwrap();

    let d = PipelineDescription::load(&path).unwrap();
    assert_eq!(d.name, "preview");
    assert_eq!(d.links[0].policy, Some(PipePolicy::Latest));
}

#[test]
fn test_loaded_description_builds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipe.toml");
    sample().save(&path).unwrap();

    let d = PipelineDescription::load(&path).unwrap();
    let builder = ApplicationBuilder::new(
        Arc::new(RegistryContext::with_builtins()),
        RuntimeConfig::default(),
    );
    let pipeline = builder.build(&d).unwrap();
    assert_eq!(pipeline.pipes()[0].policy(), PipePolicy::DropOldest { capacity: 4 });
}

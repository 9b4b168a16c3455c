//! MediaFlow - Main Entry Point
//!
//! Loads modules, builds the pipeline described in a TOML or JSON file and
//! runs it until every node finishes or Ctrl+C is pressed.

mod cli;

use anyhow::{bail, Context};
use clap::Parser;
use cli::{Args, ListKind};
use mediaflow_rs::{
    app::{listing, ApplicationBuilder},
    config::{self, PipelineDescription, RuntimeConfig},
    pipeline::{find_modules, CancellationToken, RegistryContext},
};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,mediaflow_rs=debug";

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Read config before logging exists; report problems once it does.
    let config_path = args.config.clone().or_else(config::default_config_path);
    let (runtime_config, config_error) = match &config_path {
        Some(path) if path.exists() => match RuntimeConfig::load(path) {
            Ok(c) => (c, None),
            Err(e) => (RuntimeConfig::default(), Some(e)),
        },
        _ => (RuntimeConfig::default(), None),
    };

    let _log_guard = init_logging(&args, &runtime_config)?;
    if let Some(e) = config_error {
        if args.config.is_some() {
            return Err(e).context("Failed to load runtime config");
        }
        tracing::warn!("Ignoring runtime config: {}", e);
    }

    if let Some(path) = &args.check_module {
        print!("{}", listing::check_module(path)?);
        return Ok(());
    }

    let context = Arc::new(RegistryContext::with_builtins());
    let mut module_dirs = runtime_config.module_dirs.clone();
    module_dirs.extend(args.module_dirs.iter().cloned());
    let reports = context.load_modules(&find_modules(&module_dirs));
    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    tracing::debug!(
        "Loaded {} of {} module(s), {} class(es) registered",
        reports.len() - failed,
        reports.len(),
        context.modules().len()
    );

    if let Some(kind) = args.list {
        print_listing(&context, kind, args.json)?;
        return Ok(());
    }

    let Some(pipeline_path) = &args.pipeline else {
        bail!("No pipeline file given (see --help)");
    };
    let mut description = PipelineDescription::load(pipeline_path)
        .with_context(|| format!("Failed to load {}", pipeline_path.display()))?;
    for (name, value) in args.parse_variables().map_err(anyhow::Error::msg)? {
        description.set_variable(name, value);
    }

    if args.app_info {
        let program = std::env::args().next().unwrap_or_else(|| "mediaflow".into());
        print!(
            "{}",
            listing::app_info(&description, &program, &pipeline_path.display().to_string())
        );
        return Ok(());
    }

    run(context, runtime_config, &description)
}

fn run(
    context: Arc<RegistryContext>,
    runtime_config: RuntimeConfig,
    description: &PipelineDescription,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    install_ctrlc(cancel.clone())?;

    let builder = ApplicationBuilder::new(context, runtime_config).with_cancel_token(cancel);
    let mut pipeline = builder
        .build(description)
        .context("Failed to build pipeline")?;
    let summary = pipeline.run().context("Pipeline failed to start")?;

    for (name, stats) in pipeline.pipe_stats() {
        tracing::debug!(
            "Pipe {}: {} pushed, {} dropped, {} rejected",
            name,
            stats.pushed,
            stats.dropped,
            stats.rejected
        );
    }

    if !summary.failed.is_empty() {
        bail!("Node(s) failed: {}", summary.failed.join(", "));
    }
    tracing::info!("Application successfully finished");
    Ok(())
}

fn install_ctrlc(cancel: CancellationToken) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        if cancel.request() {
            tracing::info!("Ctrl+C received, stopping pipeline");
        }
    })
    .context("Failed to install Ctrl+C handler")
}

fn print_listing(context: &RegistryContext, kind: ListKind, json: bool) -> anyhow::Result<()> {
    if json {
        let value = match kind {
            ListKind::Classes => listing::classes_json(context),
            ListKind::Formats => listing::formats_json(),
            ListKind::Converters => listing::converters_json(context),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let text = match kind {
            ListKind::Classes => listing::list_classes(context),
            ListKind::Formats => listing::list_formats(),
            ListKind::Converters => listing::list_converters(context),
        };
        print!("{}", text);
    }
    Ok(())
}

/// Filter precedence: `RUST_LOG`, then `-v`, then the config, then the default.
fn init_logging(
    args: &Args,
    runtime_config: &RuntimeConfig,
) -> anyhow::Result<Option<WorkerGuard>> {
    let directive = args
        .verbosity_filter()
        .map(str::to_string)
        .or_else(|| runtime_config.log_filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn file_writer(
    path: &Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let Some(file_name) = path.file_name() else {
        bail!("Invalid log file path {}", path.display());
    };
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

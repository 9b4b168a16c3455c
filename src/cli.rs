use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// What `--list` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    Classes,
    Formats,
    Converters,
}

/// Runs a media pipeline described in a TOML or JSON file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pipeline description (.toml or .json)
    #[arg(value_name = "FILE")]
    pub pipeline: Option<PathBuf>,

    /// Variable overrides for the pipeline file
    #[arg(value_name = "NAME=VALUE")]
    pub variables: Vec<String>,

    /// List registered classes, formats or converters
    #[arg(
        short = 'l',
        long = "list",
        value_enum,
        num_args = 0..=1,
        default_missing_value = "classes"
    )]
    pub list: Option<ListKind>,

    /// Print listings as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Show name, description and variables of the pipeline file, then exit
    #[arg(short = 'a', long = "app-info")]
    pub app_info: bool,

    /// Load a single module, report what it registers, then exit
    #[arg(long = "check-module", value_name = "LIBRARY")]
    pub check_module: Option<PathBuf>,

    /// Additional module directory (can be specified multiple times)
    #[arg(short = 'm', long = "module-dir", value_name = "DIR")]
    pub module_dirs: Vec<PathBuf>,

    /// Runtime config file (default: platform config directory)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Increase logging verbosity (default: info, -v: debug, -vv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Split `NAME=VALUE` arguments.
    pub fn parse_variables(&self) -> Result<Vec<(String, String)>, String> {
        self.variables
            .iter()
            .map(|arg| match arg.split_once('=') {
                Some((name, value)) if !name.is_empty() => {
                    Ok((name.to_string(), value.to_string()))
                }
                _ => Err(format!("expected NAME=VALUE, got '{}'", arg)),
            })
            .collect()
    }

    /// Filter directive implied by `-v`, if any.
    pub fn verbosity_filter(&self) -> Option<&'static str> {
        match self.verbosity {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline_and_variables() {
        let args = Args::parse_from(["mediaflow", "demo.toml", "fps=30", "name=a=b"]);
        assert_eq!(args.pipeline, Some(PathBuf::from("demo.toml")));
        let vars = args.parse_variables().unwrap();
        assert_eq!(vars[0], ("fps".to_string(), "30".to_string()));
        assert_eq!(vars[1], ("name".to_string(), "a=b".to_string()));
    }

    #[test]
    fn test_bad_variable() {
        let args = Args::parse_from(["mediaflow", "demo.toml", "oops"]);
        assert!(args.parse_variables().is_err());
    }

    #[test]
    fn test_list_defaults_to_classes() {
        let args = Args::parse_from(["mediaflow", "--list"]);
        assert_eq!(args.list, Some(ListKind::Classes));
        let args = Args::parse_from(["mediaflow", "--list", "converters", "--json"]);
        assert_eq!(args.list, Some(ListKind::Converters));
        assert!(args.json);
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(Args::parse_from(["mediaflow"]).verbosity_filter(), None);
        assert_eq!(Args::parse_from(["mediaflow", "-vv"]).verbosity_filter(), Some("trace"));
    }
}

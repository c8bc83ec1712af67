use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format of the model report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

/// velosurf-inspect - print the entity model built from a configuration
#[derive(Parser, Debug)]
#[command(name = "velosurf-inspect")]
#[command(version)]
#[command(about = "Connect, build the Velosurf model and print its entities", long_about = None)]
pub struct Cli {
    /// YAML configuration file (VELOSURF_* environment variables override it)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub format: OutputFormat,

    /// Only print this entity
    #[arg(short = 'e', long = "entity")]
    pub entity: Option<String>,

    /// Log level directive, overriding the configured one
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

//! velosurf-inspect - print the entity model Velosurf builds for a configuration
//!
//! ```bash
//! velosurf-inspect --config model.yaml
//! velosurf-inspect --config model.yaml --format json --entity book
//! ```

use anyhow::Context;
use clap::Parser;
use velosurf::{Config, Database};

mod args;
mod logging;
mod report;

use args::{Cli, OutputFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    logging::init_logging(&config.logging, cli.log_level.as_deref())?;

    let db = Database::connect(&config)
        .await
        .context("Failed to build the database model")?;

    let result = report::build(&db, cli.entity.as_deref()).and_then(|report| {
        let text = match cli.format {
            OutputFormat::Yaml => serde_yaml::to_string(&report)?,
            OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        };
        Ok(text)
    });

    db.close().await?;
    println!("{}", result?);
    Ok(())
}

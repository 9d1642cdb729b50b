//! Flowline CLI - validate, run and scaffold workflow definitions

use anyhow::Result;
use clap::{Parser, Subcommand};
use flowline_core::EngineConfig;
use flowline_monitoring::{init_logging, MonitoringConfig};
use std::path::PathBuf;

mod commands;

use commands::OutputFormat;

/// Flowline command-line interface
#[derive(Parser)]
#[command(name = "flowline")]
#[command(about = "Validate and run Flowline workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Check a workflow definition (JSON or YAML) for structural problems
    Validate {
        /// Definition file
        file: PathBuf,
    },

    /// Run a workflow definition once and print the execution
    Run {
        /// Definition file
        file: PathBuf,

        /// Trigger data as a JSON object
        #[arg(short, long, default_value = "{}")]
        trigger: String,

        /// Run even if the definition is disabled
        #[arg(long)]
        force: bool,
    },

    /// List the built-in templates
    Templates,

    /// Print a workflow instantiated from a template
    ExportTemplate {
        /// Template ID
        id: String,

        /// Organization that will own the workflow
        #[arg(long, default_value = "default")]
        organization: String,

        /// Workflow name
        #[arg(long)]
        name: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let engine_config = EngineConfig::load();
    // A subscriber may already be installed by an embedding process
    if let Err(e) = init_logging(&MonitoringConfig::from_engine(&engine_config)) {
        eprintln!("logging disabled: {:#}", e);
    }

    match cli.command {
        Commands::Validate { file } => commands::validate(&file),
        Commands::Run { file, trigger, force } => commands::run(&file, &trigger, force, engine_config).await,
        Commands::Templates => commands::list_templates(),
        Commands::ExportTemplate {
            id,
            organization,
            name,
            format,
        } => commands::export_template(&id, &organization, name.as_deref(), format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::parse_from(["flowline", "run", "leads.yaml", "--trigger", "{\"score\":80}"]);
        match cli.command {
            Commands::Run { file, trigger, force } => {
                assert_eq!(file, PathBuf::from("leads.yaml"));
                assert_eq!(trigger, "{\"score\":80}");
                assert!(!force);
            }
            _ => panic!("expected the run command"),
        }
    }
}

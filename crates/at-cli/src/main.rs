use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use at_cli::commands::{config, init, report, status, summary, track};
use at_cli::{Cli, Commands, Config, default_config_file};

/// Load config, failing with the figment error in context.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(at_db::Database, Config)> {
    let config = load_config(config_path)?;

    std::fs::create_dir_all(config.data_dir()).context("failed to create database directory")?;

    let db = at_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();

    match &cli.command {
        Some(Commands::Track) => {
            let config = load_config(cli.config.as_deref())?;
            track::run(&mut stdout, &config)?;
        }
        Some(Commands::Report { date, json, save }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            report::run(&mut stdout, &db, &config, *date, *json, *save)?;
        }
        Some(Commands::Summary { json, save }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            summary::run(&mut stdout, &db, &config, *json, *save)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, &db, &config)?;
        }
        Some(Commands::Init { force }) => {
            let path = cli
                .config
                .clone()
                .or_else(default_config_file)
                .context("no config directory on this platform; pass --config <file>")?;
            init::run(&mut stdout, &path, *force)?;
        }
        Some(Commands::Config) => {
            let config = load_config(cli.config.as_deref())?;
            let file = cli.config.clone().or_else(default_config_file);
            config::run(&mut stdout, &config, file.as_deref())?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

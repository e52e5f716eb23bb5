mod commands;
mod config;
mod discover;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{
    capture, export, helper, render, CaptureArgs, ExportArgs, HelperArgs, RenderArgs,
};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Cadshot - screenshots of CAD example scripts
#[derive(Parser, Debug)]
#[command(name = "cadshot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./cadshot.config.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run example scripts and render a screenshot of every model
    Capture(CaptureArgs),

    /// Run example scripts and write viewer documents only
    Export(ExportArgs),

    /// Render screenshots from previously exported viewer documents
    Render(RenderArgs),

    /// Print the Python helper module for example scripts
    Helper(HelperArgs),
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let result = std::env::current_dir()
        .map_err(|err| anyhow::anyhow!("Cannot get current directory: {}", err))
        .and_then(|cwd| {
            let config = Config::load(&cwd, cli.config.as_deref())?;
            match cli.command {
                Command::Capture(args) => capture(args, &cwd, &config),
                Command::Export(args) => export(args, &cwd, &config),
                Command::Render(args) => render(args, &cwd, &config),
                Command::Helper(args) => helper(args, &cwd),
            }
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

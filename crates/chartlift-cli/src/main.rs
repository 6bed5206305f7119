//! chartlift CLI - pull Helm charts and the container images they reference

use clap::{Parser, Subcommand};
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "chartlift")]
#[command(version)]
#[command(about = "Pull Helm charts and the container images they reference", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download charts from a repository, package them and save their images
    Pull(commands::pull::PullArgs),

    /// List the images referenced by a local chart directory
    Images {
        /// Chart directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Fail on undefined template variables
        #[arg(long)]
        strict: bool,
    },
}

/// Log to stderr; `RUST_LOG` wins over `--debug`
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Pull(args) => commands::pull::run(&args),
        Commands::Images { path, strict } => commands::images::run(&path, strict),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
    Ok(())
}

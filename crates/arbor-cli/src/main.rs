#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use arbor_core::{Config, PruneOverrides};
use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(author, version, about = "Prune node_modules to match declared dependencies", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Remove installed packages that are not needed
    Prune {
        /// Dependency class to keep off disk (dev, optional, peer); repeatable
        #[arg(long, value_name = "CLASS")]
        omit: Vec<String>,

        /// Dependency class to keep even if omitted elsewhere; repeatable
        #[arg(long, value_name = "CLASS")]
        include: Vec<String>,

        /// Shorthand for --omit dev
        #[arg(long)]
        production: bool,

        /// Treat workspace members as prunable
        #[arg(long)]
        no_workspaces: bool,

        /// Do not write package-lock.json
        #[arg(long)]
        no_package_lock: bool,

        /// Only show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// List the installed dependency tree
    Ls {
        /// Also print problems found while loading
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Prune {
            omit,
            include,
            production,
            no_workspaces,
            no_package_lock,
            dry_run,
        }) => {
            let overrides = PruneOverrides {
                omit,
                include,
                production: production.then_some(true),
                workspaces: no_workspaces.then_some(false),
                package_lock: no_package_lock.then_some(false),
            };
            let span = tracing::info_span!("prune", cmd = "prune", cwd = %cwd.display());
            let _guard = span.enter();
            commands::prune::run(config, &overrides, dry_run)
        }
        Some(Commands::Ls { all }) => {
            let span = tracing::info_span!("ls", cmd = "ls", cwd = %cwd.display());
            let _guard = span.enter();
            commands::ls::run(config, all)
        }
    }
}

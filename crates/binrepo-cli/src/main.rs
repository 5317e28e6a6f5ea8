//! binrepo CLI - Inspect repository configurations and path routing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;
mod util;

use util::Locations;

#[derive(Parser)]
#[command(name = "binrepo")]
#[command(author = "binrepo Contributors")]
#[command(version)]
#[command(about = "Inspect binary repository configurations and path routing", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repositories configuration file
    #[arg(short, long, global = true, env = "BINREPO_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory holding `repos/` and `etc/repositories.yaml`
    #[arg(long, global = true, env = "BINREPO_ROOT")]
    root: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and report virtual repository cycles
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Print the resolved repository order of a virtual repository
    Resolve {
        /// Virtual repository key
        key: String,

        /// Show remotes reachable by requests made by the server itself
        #[arg(long)]
        internal: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show where a repository path is stored
    Locate {
        /// Path as `<repoKey>:<relative/path>`
        path: String,
    },
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug);

    let locations = Locations {
        config: cli.config,
        root: cli.root,
    };

    let result = match cli.command {
        Commands::Check { strict } => commands::check::run(&locations, strict),
        Commands::Resolve {
            key,
            internal,
            json,
        } => commands::resolve::run(&locations, &key, internal, json),
        Commands::Locate { path } => commands::locate::run(&locations, &path),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

//! Marionette CLI - Command-line tools for the avatar animation controller

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{simulate, states, validate};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marionette")]
#[command(about = "Headless tools for the Marionette avatar animation controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate an animation catalog
    Validate {
        /// Path to catalog TOML
        catalog: String,

        /// Also load every clip from this directory
        #[arg(long)]
        clips: Option<String>,
    },

    /// Print the behavior state transition table
    States,

    /// Run a deterministic headless simulation
    Simulate {
        /// Path to catalog TOML (defaults to the built-in catalog)
        #[arg(long)]
        catalog: Option<String>,

        /// Directory of .anim.toml clips (defaults to synthetic clips)
        #[arg(long)]
        clips: Option<String>,

        /// Simulated duration in seconds
        #[arg(long, default_value = "30")]
        seconds: f64,

        /// Frames per simulated second
        #[arg(long, default_value = "30")]
        fps: f64,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// TOML script of timed inputs
        #[arg(long)]
        script: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Validate { catalog, clips } => validate::run(&catalog, clips.as_deref()),
        Commands::States => states::run(),
        Commands::Simulate {
            catalog,
            clips,
            seconds,
            fps,
            seed,
            script,
        } => simulate::run(simulate::SimulateArgs {
            catalog,
            clips,
            seconds,
            fps,
            seed,
            script,
        }),
    }
}

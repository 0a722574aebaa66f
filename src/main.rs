use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod core;
mod daemon;
mod octopus;

use crate::core::settings::{Overrides, Settings};

#[derive(Parser)]
#[command(name = "octojoin")]
#[command(author, version, about = "Joins Octopus Energy saving sessions and tracks free electricity")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/octojoin/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Octopus account number, e.g. A-1234ABCD
    #[arg(long, global = true)]
    account: Option<String>,

    /// Octopus API key
    #[arg(long, global = true)]
    key: Option<String>,

    /// Skip saving sessions rewarding fewer OctoPoints
    #[arg(long, global = true)]
    min_points: Option<i64>,

    /// Poll at the fixed check interval instead of adapting to the time of day
    #[arg(long, global = true)]
    no_smart_intervals: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor continuously and serve the D-Bus control interface
    Daemon,

    /// Run a single check and exit
    Check,

    /// Test access to every API resource the monitor uses
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the saved state of the last check
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the running daemon to check now via D-Bus
    Refresh,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            account_id: self.account.clone(),
            api_key: self.key.clone(),
            min_points: self.min_points,
            no_smart_intervals: self.no_smart_intervals,
            debug: self.debug,
        }
    }
}

fn init_logging(debug: bool, journald: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let journald = if journald {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("journald unavailable, logging to stderr only: {}", e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(journald)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let overrides = cli.overrides();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Daemon => {
            let settings = Settings::resolve(config, &overrides)?;
            init_logging(settings.debug, true);
            daemon::run(settings).await
        }
        Commands::Check => {
            let settings = Settings::resolve(config, &overrides)?;
            init_logging(settings.debug, false);
            cli::check::run(&settings).await
        }
        Commands::Doctor { json } => {
            let settings = Settings::resolve(config, &overrides)?;
            init_logging(settings.debug, false);
            cli::doctor::run(&settings, json).await
        }
        Commands::Status { json } => {
            let settings = Settings::merge(config, &overrides)?;
            init_logging(settings.debug, false);
            cli::status::run(&settings, json).await
        }
        Commands::Refresh => {
            init_logging(cli.debug, false);
            cli::refresh::run().await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

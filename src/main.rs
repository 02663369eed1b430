// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::Session;

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // Commands that need no configuration
    match &cli.command {
        Commands::Detect => return commands::cmd_detect(),
        Commands::Completions { shell } => return commands::cmd_completions(*shell),
        _ => {}
    }

    let session = Session::open(cli.config.as_deref(), cli.root)?;

    match cli.command {
        Commands::Detect | Commands::Completions { .. } => Ok(()),
        Commands::Plan {
            version,
            portable_only,
        } => commands::cmd_plan(&session, version.as_deref(), portable_only),
        Commands::Provision {
            version,
            portable_only,
            no_sudo,
        } => commands::cmd_provision(&session, version.as_deref(), portable_only, no_sudo),
        Commands::Install { version } => commands::cmd_install(&session, &version),
        Commands::Uninstall { version } => commands::cmd_uninstall(&session, &version),
        Commands::List => commands::cmd_list(&session),
        Commands::Npm { version, args, dir } => {
            let code = commands::cmd_npm(&session, &version, &args, dir)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Batch {
            jobs,
            stop_on_error,
            commands: list,
        } => {
            let code = commands::cmd_batch(&session, jobs, stop_on_error, &list)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Outdated { manifest, node } => commands::cmd_outdated(&session, &manifest, &node),
    }
}

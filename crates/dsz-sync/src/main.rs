//! DSZ Sync - Main entry point

use clap::Parser;
use colored::Colorize;
use dsz_common::logging::{init_logging, LogConfig, LogLevel};
use dsz_common::SyncLog;
use dsz_sync::commands::{self, open_sync_log};
use dsz_sync::{Cli, Commands, SyncConfig, SyncError};
use std::process;
use tokio::signal;
use tracing::error;

/// Exit code for a run stopped by SIGINT/SIGTERM
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder().level(level).build();

    // DSZ_LOG_* variables take precedence over the flag
    let log_config = match log_config.clone().merge_env() {
        Ok(merged) => merged,
        Err(e) => {
            eprintln!("{} Ignoring DSZ_LOG_* settings: {}", "Warning:".yellow().bold(), e);
            log_config
        },
    };

    // The sync works without console diagnostics
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{} Console logging disabled: {}", "Warning:".yellow().bold(), e);
    }

    let config = match SyncConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(e),
    };

    if let Err(e) = execute_command(command, config).await {
        exit_with(e);
    }
}

/// Execute the CLI command
async fn execute_command(command: &Commands, config: SyncConfig) -> dsz_sync::Result<()> {
    match command {
        Commands::Sync => {
            let log = open_sync_log(&config)?;
            install_crash_notice(log.clone());

            // The losing branch is dropped when select! returns; for the sync
            // that drop releases the lock and removes the temp output.
            let finished = tokio::select! {
                result = commands::sync::run(config, log.clone()) => Ok(result),
                name = termination_signal() => Err(name),
            };

            match finished {
                Ok(result) => result,
                Err(name) => {
                    log.critical(format!(
                        "Script interrupted by {}. Lock released and partial download discarded.",
                        name
                    ));
                    Err(SyncError::Interrupted(name.to_string()))
                },
            }
        },

        Commands::Token { force } => {
            let log = open_sync_log(&config)?;
            commands::token::run(&config, log, *force).await
        },

        Commands::Status => commands::status::run(&config).await,
    }
}

fn exit_with(e: SyncError) -> ! {
    error!(error = %e, "Command failed");
    eprintln!("{} {}", "Error:".red().bold(), e);

    let code = match e {
        SyncError::Interrupted(_) => EXIT_INTERRUPTED,
        _ => 1,
    };
    process::exit(code);
}

/// Write a CRITICAL sink line for any panic before the default hook runs
fn install_crash_notice(log: SyncLog) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log.critical(format!("Script crashed: {}", info));
        default_hook(info);
    }));
}

/// Resolve with the signal name on SIGINT or SIGTERM
async fn termination_signal() -> &'static str {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending().await
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending().await
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}

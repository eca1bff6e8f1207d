mod cli;
mod commands;
mod config;
mod error;
mod format;
mod git;
mod history;
mod mapping;
mod model;
mod process;
mod provider;
mod router;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use error::ProviderError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("autopm error: {err:#}");
        return ExitCode::FAILURE;
    }

    match commands::dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, json);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &anyhow::Error, json: bool) {
    if json {
        if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
            let body = serde_json::json!({
                "error": {
                    "kind": provider_err.kind(),
                    "message": provider_err.to_string(),
                }
            });
            println!("{body}");
            return;
        }
    }
    eprintln!("autopm error: {err:#}");
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("AUTOPM_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

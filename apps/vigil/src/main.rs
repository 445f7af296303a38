mod cli;
mod commands;
mod error;
mod telemetry;

use clap::Parser;

use crate::error::CliError;

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    let cli = cli::Cli::parse();

    if let Err(err) = telemetry::logging::init(&cli.logging.to_config()) {
        let err = CliError::Logging(err.to_string());
        eprintln!("❌ {err}");
        std::process::exit(err.exit_code());
    }
    match dotenv {
        Ok(path) => tracing::debug!(target: "vigil", path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!(target: "vigil", "ignoring unreadable .env: {err}"),
    }

    if let Err(err) = commands::run(cli).await {
        tracing::debug!(target: "vigil", error = ?err, "command failed");
        eprintln!("❌ {err}");
        std::process::exit(err.exit_code());
    }
}

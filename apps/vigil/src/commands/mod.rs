mod consume;
mod health;
mod processing;
mod violations;

use vigil_sdk::{DetectionClient, StreamClient, ViolationClient};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli {
        api_url,
        api_token,
        ai_url,
        command,
        ..
    } = cli;

    match command {
        Command::Consume(args) => consume::run(args).await,
        Command::Watch(args) => {
            let streams = StreamClient::new(&api_url, api_token)?;
            consume::watch(&streams, args).await
        }
        Command::Violations(command) => {
            let client = ViolationClient::new(&api_url, api_token)?;
            violations::run(&client, command).await
        }
        Command::Processing(command) => {
            let client = ViolationClient::new(&api_url, api_token)?;
            processing::run(&client, command).await
        }
        Command::Health(args) => {
            let client = DetectionClient::new(&ai_url)?;
            health::run(client, args).await
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// leaving the caller's other branches in charge.
pub(crate) async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "vigil", "cannot listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}

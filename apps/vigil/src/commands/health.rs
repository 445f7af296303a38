use std::time::Duration;

use vigil_sdk::{DetectionClient, HealthMonitor, HealthStatus};

use super::interrupted;
use crate::cli::HealthArgs;
use crate::error::CliError;

pub async fn run(client: DetectionClient, args: HealthArgs) -> Result<(), CliError> {
    if !args.watch {
        return check_once(&client).await;
    }
    if args.interval == 0 {
        return Err(CliError::InvalidArgument(
            "--interval must be at least 1 second".into(),
        ));
    }

    println!(
        "watching {} every {}s; press Ctrl-C to stop",
        client.base_url(),
        args.interval
    );
    let monitor = HealthMonitor::spawn(client, Duration::from_secs(args.interval));
    let mut updates = monitor.subscribe();
    let mut last_healthy = None;
    loop {
        tokio::select! {
            _ = interrupted() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = updates.borrow_and_update().clone();
                let healthy = status.is_healthy();
                if last_healthy != Some(healthy) {
                    report(&status);
                    last_healthy = Some(healthy);
                }
            }
        }
    }
    monitor.shutdown().await;
    Ok(())
}

async fn check_once(client: &DetectionClient) -> Result<(), CliError> {
    let health = client.health().await?;
    if !health.is_healthy() {
        return Err(CliError::Unavailable(format!(
            "detection service reports status '{}'",
            health.status
        )));
    }
    println!("detection service healthy");
    println!("  models loaded  {}", health.models_loaded);
    match client.models().await {
        Ok(models) => {
            for model in models {
                println!(
                    "  - {} {} ({})",
                    model.name,
                    model.version.as_deref().unwrap_or(""),
                    model.status.as_deref().unwrap_or("unknown")
                );
            }
        }
        Err(err) => tracing::warn!(target: "vigil.health", "cannot list models: {err}"),
    }
    Ok(())
}

fn report(status: &HealthStatus) {
    match status {
        HealthStatus::Unknown => {}
        HealthStatus::Healthy {
            models_loaded,
            available_models,
            ..
        } => println!(
            "healthy: {models_loaded} models loaded ({})",
            available_models.join(", ")
        ),
        HealthStatus::Unhealthy { reason, .. } => println!("unhealthy: {reason}"),
    }
}

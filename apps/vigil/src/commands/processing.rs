use vigil_sdk::{ProcessingRequest, ProcessingStatus, ViolationClient};

use crate::cli::ProcessingCommand;
use crate::error::CliError;

pub async fn run(client: &ViolationClient, command: ProcessingCommand) -> Result<(), CliError> {
    match command {
        ProcessingCommand::Start {
            camera,
            model,
            interval_ms,
        } => {
            let request = ProcessingRequest::new(camera)
                .with_model(model)
                .with_interval_ms(interval_ms);
            let ack = client.start_processing(&request).await?;
            println!(
                "{}",
                ack.message
                    .as_deref()
                    .unwrap_or("violation processing started")
            );
            if let Some(processing_id) = ack.processing_id() {
                println!("  processing id  {processing_id}");
            }
            println!("  model          {model}");
            println!("  interval       {interval_ms}ms");
            Ok(())
        }
        ProcessingCommand::Stop {
            camera,
            processing_id,
        } => {
            let ack = client
                .stop_processing(camera, processing_id.as_deref())
                .await?;
            println!(
                "{}",
                ack.message
                    .as_deref()
                    .unwrap_or("violation processing stopped")
            );
            Ok(())
        }
        ProcessingCommand::Status { camera } => {
            match client.processing_status(camera).await? {
                ProcessingStatus::Camera(status) => {
                    println!("camera {}", status.camera_id);
                    println!("  processing   {}", if status.is_processing { "yes" } else { "no" });
                    if let Some(model) = &status.model_type {
                        println!("  model        {model}");
                    }
                    if let Some(last) = &status.last_processed {
                        println!("  last frame   {last}");
                    }
                    println!("  detected     {}", status.violations_detected);
                    println!("  errors       {}", status.processing_errors);
                }
                ProcessingStatus::Overview(overview) => {
                    println!(
                        "ai models service  {}",
                        if overview.ai_models_service { "up" } else { "down" }
                    );
                    println!("models available   {}", overview.available_models);
                    println!(
                        "camera service     {}",
                        if overview.camera_service { "up" } else { "down" }
                    );
                    if let Some(checked) = &overview.last_health_check {
                        println!("last health check  {checked}");
                    }
                }
            }
            Ok(())
        }
    }
}

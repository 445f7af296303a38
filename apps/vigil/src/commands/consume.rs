use std::sync::Arc;
use std::time::Duration;

use sfu_session::{ProbeRuntime, Session, SessionConfig, SessionParams};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use vigil_sdk::StreamClient;

use super::interrupted;
use crate::cli::{ConsumeArgs, WatchArgs};
use crate::error::CliError;

pub async fn run(args: ConsumeArgs) -> Result<(), CliError> {
    let params = SessionParams {
        signaling_url: args.signaling_url,
        room_id: args.room,
        producer_id: args.producer,
    };
    hold_session(params, args.session.to_config(), args.session.hold()).await
}

/// Starts the camera stream, consumes it, and optionally stops the stream
/// again once the session is over.
pub async fn watch(streams: &StreamClient, args: WatchArgs) -> Result<(), CliError> {
    let started = streams.start_stream(&args.camera).await?;
    if let Some(message) = &started.message {
        println!("{message}");
    }
    let target = started.target()?;
    let signaling_url = target
        .signaling_url
        .or(args.signaling_url)
        .ok_or_else(|| {
            CliError::InvalidArgument(
                "stream response names no signaling endpoint; pass --signaling-url".into(),
            )
        })?;

    let params = SessionParams {
        signaling_url,
        room_id: target.room_id,
        producer_id: target.producer_id,
    };
    let outcome = hold_session(params, args.session.to_config(), args.session.hold()).await;

    if args.stop_stream {
        match streams.stop_stream(&args.camera).await {
            Ok(message) => println!("{}", message.as_deref().unwrap_or("stream stopped")),
            Err(err) => warn!(target: "vigil.watch", camera = %args.camera, "failed to stop stream: {err}"),
        }
    }
    outcome
}

async fn hold_session(
    params: SessionParams,
    config: SessionConfig,
    hold: Option<Duration>,
) -> Result<(), CliError> {
    println!(
        "connecting to room {} (producer {}) via {}",
        params.room_id, params.producer_id, params.signaling_url
    );
    let session = Session::over_websocket(params, config, Arc::new(ProbeRuntime::new()));

    let connected = tokio::select! {
        result = session.connect() => Some(result),
        _ = interrupted() => None,
    };
    let stream = match connected {
        Some(result) => result?,
        None => {
            session.disconnect().await;
            println!("interrupted before the session was ready");
            return Ok(());
        }
    };

    println!("session {} ready", stream.session_id);
    println!("  transport  {}", stream.transport_id);
    println!(
        "  track      {} ({}, consumer {}, producer {})",
        stream.track.id,
        stream.track.kind.as_str(),
        stream.track.consumer_id,
        stream.track.producer_id
    );
    if !stream.resumed {
        println!("  warning    server did not resume the consumer; media may stay paused");
    }
    match hold {
        Some(duration) => println!("holding for {}s", duration.as_secs()),
        None => println!("press Ctrl-C to disconnect"),
    }

    let deadline = async {
        match hold {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut notifications = session.notifications();

    loop {
        tokio::select! {
            _ = interrupted() => break,
            _ = &mut deadline => break,
            message = next_notification(&mut notifications) => match message {
                Ok(message) => {
                    info!(target: "vigil.consume", kind = message.kind(), "server notification");
                    println!("notification: {}", message.kind());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "vigil.consume", skipped, "notifications dropped");
                }
                Err(RecvError::Closed) => notifications = None,
            },
        }
    }

    session.disconnect().await;
    println!("session {} closed", stream.session_id);
    Ok(())
}

async fn next_notification(
    notifications: &mut Option<tokio::sync::broadcast::Receiver<sfu_session::InboundMessage>>,
) -> Result<sfu_session::InboundMessage, RecvError> {
    match notifications {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

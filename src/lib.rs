pub mod audit;
pub mod config;
pub mod crypto;
pub mod models;
pub mod pipeline;
pub mod reminders;
pub mod session;
pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::{AppConfig, ConfigError};
use crate::models::ReminderFired;
use crate::pipeline::orchestrator::{MessagePipeline, PipelineResult};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Startup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One stdin line: a caregiver message, or a cancellation of an earlier reminder.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundLine {
    Message {
        caller_id: String,
        text: String,
        #[serde(default)]
        session_token: Option<String>,
    },
    Cancel {
        cancel_reminder: Uuid,
    },
}

/// One stdout line.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OutboundEvent {
    Result(PipelineResult),
    ReminderFired(ReminderFired),
    Cancelled { reminder_id: Uuid, cancelled: bool },
    Error { message: String },
}

/// Entry point for the `careline` binary.
pub fn run() -> Result<(), RunError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Careline starting v{}", config::APP_VERSION);

    let config = AppConfig::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

/// JSON-lines driver: messages in on stdin, results and reminder events out
/// on stdout. Returns after stdin closes and every pending reminder has
/// fired, or on Ctrl-C.
async fn serve(config: AppConfig) -> Result<(), RunError> {
    let (fired_tx, mut fired_rx) = mpsc::channel::<ReminderFired>(64);
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundEvent>(64);

    // Key derivation is CPU-bound; keep it off the async workers.
    let pipeline = Arc::new(
        tokio::task::spawn_blocking(move || MessagePipeline::from_config(&config, fired_tx))
            .await??,
    );
    tracing::info!("Pipeline ready");

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = out_rx.recv().await {
            let mut line = match serde_json::to_vec(&event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize output event");
                    continue;
                }
            };
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() || stdout.flush().await.is_err() {
                tracing::warn!("Stdout closed, dropping output");
                break;
            }
        }
    });

    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(fired) = fired_rx.recv().await {
            if forward_tx.send(OutboundEvent::ReminderFired(fired)).await.is_err() {
                break;
            }
        }
    });

    let mut in_flight = tokio::task::JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                return Ok(());
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<InboundLine>(&line) {
            Ok(InboundLine::Message {
                caller_id,
                text,
                session_token,
            }) => {
                let pipeline = pipeline.clone();
                let tx = out_tx.clone();
                in_flight.spawn(async move {
                    let result = pipeline
                        .handle(&caller_id, &text, session_token.as_deref())
                        .await;
                    let _ = tx.send(OutboundEvent::Result(result)).await;
                });
            }
            Ok(InboundLine::Cancel { cancel_reminder }) => {
                let cancelled = pipeline.cancel_reminder(cancel_reminder);
                let _ = out_tx
                    .send(OutboundEvent::Cancelled {
                        reminder_id: cancel_reminder,
                        cancelled,
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed input line");
                let _ = out_tx
                    .send(OutboundEvent::Error {
                        message: format!("malformed input line: {e}"),
                    })
                    .await;
            }
        }
    }

    while in_flight.join_next().await.is_some() {}

    let pending = pipeline.scheduler().pending_count();
    if pending > 0 {
        tracing::info!(pending, "Input closed, waiting for pending reminders");
    }
    // The fire channel closes once the pipeline and every timer task are gone.
    drop(pipeline);
    drop(out_tx);

    tokio::select! {
        _ = forwarder => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, pending reminders dropped");
            return Ok(());
        }
    }
    let _ = writer.await;
    Ok(())
}

//! Validator side of the hub protocol.
//!
//! One session is one WebSocket connection: register, wait for the
//! acknowledgement, then answer pings until the hub goes away. The agent
//! runs sessions back to back with a fixed delay in between.

use anyhow::{Context, Result, anyhow};
use futures::{SinkExt, Stream, StreamExt};
use guardian_proto::crypto::sign_registration;
use guardian_proto::{
    HubMessage, KeyPair, PingRequest, ValidateReport, ValidatorMessage, decode_frame, encode_frame,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::monitoring::MonitoringExecutor;

pub struct ValidatorAgent {
    config: ValidatorConfig,
    keypair: KeyPair,
    executor: Arc<MonitoringExecutor>,
}

impl ValidatorAgent {
    pub fn new(config: ValidatorConfig, keypair: KeyPair, executor: Arc<MonitoringExecutor>) -> Self {
        Self { config, keypair, executor }
    }

    /// Keep a session open forever, reconnecting after every loss
    pub async fn run(&self) {
        info!(key = %self.keypair.public_key(), "Validator starting");

        loop {
            match self.run_session().await {
                Ok(()) => info!("Hub closed the connection"),
                Err(e) => warn!("Session ended: {:#}", e),
            }

            let delay = self.config.hub.reconnect_delay();
            info!("Reconnecting in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }

    /// Run one connection from handshake to close.
    pub async fn run_session(&self) -> Result<()> {
        let (ws, _) = connect_async(self.config.hub.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.config.hub.url))?;
        info!("Connected to {}", self.config.hub.url);

        let (mut sink, mut frames) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ValidatorMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match encode_frame(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!("Write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let result = self.serve(&mut frames, &tx).await;
        writer.abort();
        result
    }

    async fn serve<S>(&self, frames: &mut S, tx: &mpsc::UnboundedSender<ValidatorMessage>) -> Result<()>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let request = sign_registration(&self.keypair, &self.config.identity.location, self.config.identity.ip.clone());
        tx.send(ValidatorMessage::Register(request)).map_err(|_| anyhow!("writer stopped"))?;

        let validator_id = timeout(self.config.hub.registration_timeout(), async {
            while let Some(message) = next_message(frames).await? {
                match message {
                    HubMessage::Registered { validator_id } => return Ok(Some(validator_id)),
                    HubMessage::Ping(ping) => debug!(task = %ping.callback_id, "Ping before registration ignored"),
                }
            }
            Ok::<_, anyhow::Error>(None)
        })
        .await
        .map_err(|_| anyhow!("hub did not acknowledge registration"))??;

        let Some(validator_id) = validator_id else {
            return Ok(());
        };
        info!(id = %validator_id, "Registered with hub");

        while let Some(message) = next_message(frames).await? {
            match message {
                HubMessage::Ping(ping) => self.handle_ping(ping, &validator_id, tx),
                HubMessage::Registered { validator_id } => {
                    debug!(id = %validator_id, "Repeated registration ack");
                }
            }
        }

        Ok(())
    }

    /// Check every target of a ping on its own task. Each check sends exactly
    /// one `validate` reply, whatever its outcome.
    pub fn handle_ping(&self, ping: PingRequest, validator_id: &str, tx: &mpsc::UnboundedSender<ValidatorMessage>) {
        debug!(task = %ping.callback_id, targets = ping.targets.len(), "Ping received");

        for target in ping.targets {
            let executor = self.executor.clone();
            let tx = tx.clone();
            let validator_id = validator_id.to_string();
            let id = ping.callback_id;

            tokio::spawn(async move {
                let report = executor.execute_check(&target.url).await;
                let reply = ValidatorMessage::Validate(ValidateReport {
                    validator_id,
                    id,
                    status_code: report.status_code,
                    latency: report.latency_ms,
                    status: report.status,
                });

                if tx.send(reply).is_err() {
                    debug!(task = %id, "Connection gone before reply could be sent");
                }
            });
        }
    }
}

/// Next decodable hub message. Undecodable frames are skipped; `None` means
/// the connection closed.
async fn next_message<S>(frames: &mut S) -> Result<Option<HubMessage>>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        let decoded = match frame? {
            Message::Text(text) => decode_frame::<HubMessage>(&text),
            Message::Binary(bytes) => guardian_proto::protocol::decode_binary_frame::<HubMessage>(&bytes),
            Message::Close(_) => return Ok(None),
            _ => continue,
        };

        match decoded {
            Ok(message) => return Ok(Some(message)),
            Err(e) => warn!("Dropping frame from hub: {}", e),
        }
    }

    Ok(None)
}

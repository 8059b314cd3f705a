use anyhow::{Context, Result};
use async_nats::Client;
use serde::Serialize;
use tracing::{debug, info};

use super::messages::SessionControlMessage;

pub const TRANSCRIPTS_SUBJECT: &str = "stt.text.final";
pub const SESSION_OPEN_SUBJECT: &str = "stt.session.open";
pub const SESSION_CLOSE_SUBJECT: &str = "stt.session.close";

pub struct NatsClient {
    client: Client,
    room: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, room: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, room })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn room_events_subject(&self) -> String {
        format!("room.{}.events", self.room)
    }

    async fn publish_json<T: Serialize>(&self, subject: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        debug!("Published to {}", subject);
        Ok(())
    }

    pub async fn publish_session_control(&self, message: &SessionControlMessage) -> Result<()> {
        let subject = match message {
            SessionControlMessage::Open { .. } => SESSION_OPEN_SUBJECT,
            SessionControlMessage::Close { .. } => SESSION_CLOSE_SUBJECT,
        };
        self.publish_json(subject, message).await
    }

    /// Subscribe to participant notifications for this room
    pub async fn subscribe_room_events(&self) -> Result<async_nats::Subscriber> {
        let subject = self.room_events_subject();

        info!("Subscribing to room events on {}", subject);

        self.client
            .subscribe(subject)
            .await
            .context("Failed to subscribe to room events")
    }

    /// Subscribe to final transcript messages
    ///
    /// Messages are routed to participants by `session_id`.
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        info!("Subscribing to transcripts on {}", TRANSCRIPTS_SUBJECT);

        self.client
            .subscribe(TRANSCRIPTS_SUBJECT)
            .await
            .context("Failed to subscribe to transcripts")
    }
}

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::{RoomEventMessage, SessionControlMessage, TranscriptMessage};
use crate::session::{RoomEvent, RoomRuntime, TranscriptionSession};
use crate::stt::SttSettings;

/// transcription session id → participant identity
type SessionRoutes = Arc<Mutex<HashMap<String, String>>>;

/// Room runtime backed by NATS subjects
pub struct NatsRoomRuntime {
    client: Arc<NatsClient>,
    routes: SessionRoutes,
}

impl NatsRoomRuntime {
    /// Connect and start forwarding room notifications and final transcripts as room events
    pub async fn connect(url: &str, room: &str) -> Result<(Self, mpsc::Receiver<RoomEvent>)> {
        let client = Arc::new(NatsClient::connect(url, room.to_string()).await?);
        let routes: SessionRoutes = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel(256);

        let mut room_sub = client.subscribe_room_events().await?;
        let room_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = room_sub.next().await {
                match serde_json::from_slice::<RoomEventMessage>(&msg.payload) {
                    Ok(message) => {
                        let Some(event) = message.into_room_event() else {
                            continue;
                        };
                        if room_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse room event: {}", e),
                }
            }
            info!("Room event subscription ended");
        });

        let mut transcript_sub = client.subscribe_transcripts().await?;
        let transcript_routes = Arc::clone(&routes);
        tokio::spawn(async move {
            while let Some(msg) = transcript_sub.next().await {
                let transcript = match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => transcript,
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        continue;
                    }
                };

                let Some(event) = route_transcript(&transcript_routes, transcript) else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            info!("Transcript subscription ended");
        });

        Ok((Self { client, routes }, rx))
    }
}

/// Final transcript of a known session → utterance of its participant
fn route_transcript(routes: &SessionRoutes, transcript: TranscriptMessage) -> Option<RoomEvent> {
    if transcript.partial {
        return None;
    }

    let routes = routes.lock().unwrap_or_else(PoisonError::into_inner);
    match routes.get(&transcript.session_id) {
        Some(identity) => Some(RoomEvent::Utterance {
            identity: identity.clone(),
            text: transcript.text,
        }),
        None => {
            debug!("Transcript for unknown session {}", transcript.session_id);
            None
        }
    }
}

#[async_trait]
impl RoomRuntime for NatsRoomRuntime {
    async fn open_transcription(
        &self,
        participant: &str,
        settings: &SttSettings,
    ) -> Result<Box<dyn TranscriptionSession>> {
        let session_id = uuid::Uuid::new_v4().to_string();

        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), participant.to_string());

        let message = SessionControlMessage::Open {
            session_id: session_id.clone(),
            room: self.client.room().to_string(),
            participant: participant.to_string(),
            settings: settings.clone(),
        };

        if let Err(e) = self.client.publish_session_control(&message).await {
            self.routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&session_id);
            return Err(e);
        }

        Ok(Box::new(NatsTranscription {
            session_id,
            client: Arc::clone(&self.client),
            routes: Arc::clone(&self.routes),
        }))
    }
}

struct NatsTranscription {
    session_id: String,
    client: Arc<NatsClient>,
    routes: SessionRoutes,
}

#[async_trait]
impl TranscriptionSession for NatsTranscription {
    fn id(&self) -> &str {
        &self.session_id
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);

        self.client
            .publish_session_control(&SessionControlMessage::Close {
                session_id: self.session_id.clone(),
            })
            .await
    }
}

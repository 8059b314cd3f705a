use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::SupervisorConfig;
use super::participant::{ParticipantSession, ParticipantSnapshot, SessionState};
use super::runtime::{RoomEvent, RoomRuntime, TranscriptionSession};
use crate::protocol::{now_local, EventRecord, LifecycleKind, ProtocolStore, TranscriptRecord};

#[derive(Default)]
struct SupervisorState {
    participants: BTreeMap<String, ParticipantSession>,

    /// Raised when every session was paused by group idle suspension
    all_idle: bool,
}

struct Shared {
    config: SupervisorConfig,
    runtime: Arc<dyn RoomRuntime>,
    store: Arc<ProtocolStore>,
    state: Mutex<SupervisorState>,

    /// In-flight session open/close operations
    tasks: std::sync::Mutex<JoinSet<()>>,
}

/// Tracks every participant of a room, keeps one transcription session per
/// participant alive and feeds lifecycle and transcript records into the store.
pub struct SessionSupervisor {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    idle_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionSupervisor {
    /// Initialize the store and start the idle-check loop (when enabled)
    pub fn start(
        config: SupervisorConfig,
        runtime: Arc<dyn RoomRuntime>,
        store: Arc<ProtocolStore>,
    ) -> Result<Self> {
        store.initialize().context("Failed to initialize protocol files")?;

        let cancel = CancellationToken::new();
        let idle_timeout = config.idle_timeout;
        let check_interval = config.idle_check_interval;

        let shared = Arc::new(Shared {
            config,
            runtime,
            store,
            state: Mutex::new(SupervisorState::default()),
            tasks: std::sync::Mutex::new(JoinSet::new()),
        });

        let idle_task = match idle_timeout {
            Some(timeout) => {
                info!("Idle timeout enabled: {:.0} minutes", timeout.as_secs_f64() / 60.0);
                Some(spawn_idle_loop(Arc::clone(&shared), cancel.clone(), check_interval))
            }
            None => None,
        };

        info!("Protocol manager started, listening for participants");

        Ok(Self {
            shared,
            cancel,
            idle_task: std::sync::Mutex::new(idle_task),
        })
    }

    pub fn store(&self) -> &Arc<ProtocolStore> {
        &self.shared.store
    }

    /// Consume room notifications until the channel closes or the supervisor shuts down.
    ///
    /// Returns early only on a store error, which is fatal to the recording.
    pub async fn run(&self, mut events: mpsc::Receiver<RoomEvent>) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await?,
                    None => {
                        info!("Room event channel closed");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    /// Dispatch a single room notification
    pub async fn handle(&self, event: RoomEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            debug!("Supervisor closed, dropping event for {}", event.identity());
            return Ok(());
        }

        match event {
            RoomEvent::ParticipantJoined { identity, name } => {
                self.on_participant_joined(&identity, name.as_deref()).await
            }
            RoomEvent::ParticipantLeft { identity } => self.on_participant_left(&identity).await,
            RoomEvent::AudioTrackSubscribed { identity } => {
                self.on_audio_track_subscribed(&identity).await
            }
            RoomEvent::Utterance { identity, text } => self.on_utterance(&identity, &text).await,
        }
    }

    pub async fn on_participant_joined(&self, identity: &str, name: Option<&str>) -> Result<()> {
        let now = now_local().time();

        {
            let mut state = self.shared.state.lock().await;
            if state.participants.contains_key(identity) {
                debug!("Participant {} already tracked", identity);
                return Ok(());
            }

            info!("Participant connected: {}", identity);

            // Only tracked once the join is on record.
            self.shared
                .store
                .append(&EventRecord::lifecycle(now, identity, LifecycleKind::Joined))?;

            let mut session =
                ParticipantSession::new(identity, name.unwrap_or(identity), now, Instant::now());
            session.opening = true;
            state.participants.insert(identity.to_string(), session);
        }

        self.shared.spawn_open(identity.to_string());
        Ok(())
    }

    pub async fn on_participant_left(&self, identity: &str) -> Result<()> {
        let now = now_local().time();

        let transcription = {
            let mut state = self.shared.state.lock().await;
            let Some(mut session) = state.participants.remove(identity) else {
                debug!("Ignoring disconnect of untracked participant {}", identity);
                return Ok(());
            };

            info!("Participant disconnected: {}", identity);
            session.left_at = Some(now);

            self.shared
                .store
                .append(&EventRecord::lifecycle(now, identity, LifecycleKind::Left))?;

            session.transcription.take()
        };

        if let Some(transcription) = transcription {
            self.shared.spawn_close(identity.to_string(), transcription);
        }

        Ok(())
    }

    /// A new audio track resumes the group after idle suspension, or retries a
    /// participant whose session failed to open.
    pub async fn on_audio_track_subscribed(&self, identity: &str) -> Result<()> {
        info!("Audio track subscribed from {}", identity);

        let mut to_open = Vec::new();
        {
            let mut guard = self.shared.state.lock().await;
            let state = &mut *guard;

            let Some(session) = state.participants.get_mut(identity) else {
                debug!("Audio track from untracked participant {}", identity);
                return Ok(());
            };

            if session.has_transcription() || session.opening {
                return Ok(());
            }

            if state.all_idle {
                info!("Restarting transcription sessions after idle...");
                state.all_idle = false;

                let now = now_local().time();
                let instant = Instant::now();

                for session in state.participants.values_mut() {
                    if session.has_transcription() || session.opening {
                        continue;
                    }

                    session.last_speech_time = instant;
                    session.state = SessionState::Active;
                    session.opening = true;

                    self.shared.store.append(&EventRecord::lifecycle(
                        now,
                        &session.identity,
                        LifecycleKind::Resumed,
                    ))?;
                    to_open.push(session.identity.clone());
                }
            } else {
                info!("Retrying transcription session for {}", identity);
                session.opening = true;
                to_open.push(identity.to_string());
            }
        }

        for identity in to_open {
            self.shared.spawn_open(identity);
        }

        Ok(())
    }

    /// Record a completed utterance; empty or whitespace-only text is discarded
    pub async fn on_utterance(&self, identity: &str, text: &str) -> Result<()> {
        let now = now_local().time();

        let Some(record) = TranscriptRecord::from_utterance(now, identity, text) else {
            debug!("Empty transcript for {}, ignoring", identity);
            return Ok(());
        };

        let mut state = self.shared.state.lock().await;
        match state.participants.get_mut(identity) {
            Some(session) => session.record_speech(&record, Instant::now()),
            None => warn!("Transcript from untracked participant {}", identity),
        }

        info!("[{}] {}: {}", now.format("%H:%M:%S"), identity, record.text);

        self.shared.store.append(&EventRecord::Transcript(record))?;
        Ok(())
    }

    /// Run one idle check now. Returns `true` when the group was paused.
    pub async fn check_idle(&self) -> Result<bool> {
        self.shared.check_idle(Instant::now()).await
    }

    /// Whether all sessions are currently paused by idle suspension
    pub async fn is_idle(&self) -> bool {
        self.shared.state.lock().await.all_idle
    }

    pub async fn participant(&self, identity: &str) -> Option<ParticipantSnapshot> {
        let state = self.shared.state.lock().await;
        state.participants.get(identity).map(ParticipantSession::snapshot)
    }

    pub async fn participants(&self) -> Vec<ParticipantSnapshot> {
        let state = self.shared.state.lock().await;
        state.participants.values().map(ParticipantSession::snapshot).collect()
    }

    /// Wait until every in-flight session open/close has completed
    pub async fn wait_for_pending(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.shared.lock_tasks());
            if pending.is_empty() {
                break;
            }
            while pending.join_next().await.is_some() {}
        }
    }

    /// Stop the idle loop, close every session, detach from the runtime and finalize the store
    pub async fn close(&self) -> Result<()> {
        info!("Closing protocol manager...");

        self.cancel.cancel();

        let idle_task = self
            .idle_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = idle_task {
            if let Err(e) = task.await {
                error!("Idle check task panicked: {}", e);
            }
        }

        let grace = self.shared.config.shutdown_grace;
        if tokio::time::timeout(grace, self.wait_for_pending()).await.is_err() {
            warn!("Pending session operations did not finish within {:?}, aborting", grace);
            let mut pending = std::mem::take(&mut *self.shared.lock_tasks());
            pending.shutdown().await;
        }

        let sessions: Vec<(String, Box<dyn TranscriptionSession>)> = {
            let mut state = self.shared.state.lock().await;
            state
                .participants
                .values_mut()
                .filter_map(|s| s.transcription.take().map(|t| (s.identity.clone(), t)))
                .collect()
        };

        let failures = close_sessions(sessions).await;
        if failures > 0 {
            warn!("{} session(s) failed to close cleanly", failures);
        }

        self.shared
            .store
            .finalize(now_local())
            .context("Failed to finalize protocol files")?;

        info!("Protocol manager closed");
        Ok(())
    }
}

impl Shared {
    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_task<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock_tasks();
        // Reap finished operations so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    fn spawn_open(self: &Arc<Self>, identity: String) {
        let shared = Arc::clone(self);
        self.spawn_task(async move { shared.open_session(identity).await });
    }

    fn spawn_close(&self, identity: String, session: Box<dyn TranscriptionSession>) {
        self.spawn_task(async move {
            if let Err(e) = session.close().await {
                error!("Error closing session for {}: {:#}", identity, e);
            }
        });
    }

    async fn open_session(&self, identity: String) {
        info!("Starting transcription session for: {}", identity);

        let result = self
            .runtime
            .open_transcription(&identity, &self.config.stt)
            .await;

        let orphan = {
            let mut state = self.state.lock().await;
            let session = state.participants.get_mut(&identity);

            match (result, session) {
                (Ok(transcription), Some(session)) if session.transcription.is_none() => {
                    info!("Session {} started for {}", transcription.id(), identity);
                    session.opening = false;
                    session.transcription = Some(transcription);
                    None
                }
                (Ok(transcription), session) => {
                    if let Some(session) = session {
                        session.opening = false;
                    }
                    Some(transcription)
                }
                (Err(e), session) => {
                    error!("Failed to start session for {}: {:#}", identity, e);
                    if let Some(session) = session {
                        session.opening = false;
                    }
                    None
                }
            }
        };

        // Participant left (or already had a session) while the open was in flight.
        if let Some(transcription) = orphan {
            debug!("Discarding late session for {}", identity);
            if let Err(e) = transcription.close().await {
                error!("Error closing session for {}: {:#}", identity, e);
            }
        }
    }

    /// Pause every session if all participants with a live session have been
    /// silent for at least the idle timeout. A single recent speaker keeps the
    /// whole group active.
    async fn check_idle(&self, now: Instant) -> Result<bool> {
        let Some(timeout) = self.config.idle_timeout else {
            return Ok(false);
        };

        let paused = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let Some(idle) = idle_participants(&state.participants, now, timeout) else {
                return Ok(false);
            };

            warn!(
                "All participants idle for {:.0}+ min - pausing transcription",
                timeout.as_secs_f64() / 60.0
            );

            let timestamp = now_local().time();
            let mut paused = Vec::with_capacity(idle.len());

            for (identity, idle_for) in idle {
                let Some(session) = state.participants.get_mut(&identity) else {
                    continue;
                };

                info!(
                    "Closing session for {} (idle {:.1} min)",
                    identity,
                    idle_for.as_secs_f64() / 60.0
                );

                session.state = SessionState::Idle;
                if let Some(transcription) = session.transcription.take() {
                    paused.push((identity.clone(), transcription));
                }

                self.store.append(&EventRecord::lifecycle(
                    timestamp,
                    &identity,
                    LifecycleKind::IdlePaused,
                ))?;
            }

            state.all_idle = true;
            paused
        };

        close_sessions(paused).await;
        Ok(true)
    }
}

/// Participants with a live session and their silence, or `None` if any of
/// them spoke within `timeout` (or nobody has a live session).
fn idle_participants(
    participants: &BTreeMap<String, ParticipantSession>,
    now: Instant,
    timeout: Duration,
) -> Option<Vec<(String, Duration)>> {
    let mut idle = Vec::new();

    for session in participants.values().filter(|s| s.has_transcription()) {
        let silent_for = now.saturating_duration_since(session.last_speech_time);
        if silent_for < timeout {
            return None;
        }
        idle.push((session.identity.clone(), silent_for));
    }

    (!idle.is_empty()).then_some(idle)
}

/// Close sessions concurrently; failures are logged and counted, never propagated
async fn close_sessions(sessions: Vec<(String, Box<dyn TranscriptionSession>)>) -> usize {
    let results = futures::future::join_all(sessions.into_iter().map(|(identity, session)| async move {
        (identity, session.close().await)
    }))
    .await;

    results
        .into_iter()
        .filter_map(|(identity, result)| result.err().map(|e| (identity, e)))
        .inspect(|(identity, e)| error!("Error closing session for {}: {:#}", identity, e))
        .count()
}

fn spawn_idle_loop(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            // Cancellation is only observed here, never in the middle of a check.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if let Err(e) = shared.check_idle(Instant::now()).await {
                error!("Error in idle check loop: {:#}", e);
            }
        }

        debug!("Idle check loop stopped");
    })
}

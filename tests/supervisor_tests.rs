// Tests for participant lifecycle supervision against a scripted runtime

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use protocol_recorder::protocol::{EventRecord, LifecycleKind, ProtocolStore, StoreOptions};
use protocol_recorder::session::SessionState;
use protocol_recorder::{
    OutputFormat, RoomEvent, RoomRuntime, SessionSupervisor, SttProvider, SttSettings,
    SupervisorConfig, TranscriptionSession,
};
use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[derive(Default)]
struct ScriptedRuntime {
    opened: Mutex<Vec<String>>,
    closed: Arc<Mutex<Vec<String>>>,
    fail_next_open: Mutex<HashSet<String>>,
    fail_close: Arc<Mutex<HashSet<String>>>,
    counter: AtomicUsize,
}

impl ScriptedRuntime {
    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    fn closed(&self) -> Vec<String> {
        let mut closed = self.closed.lock().unwrap().clone();
        closed.sort();
        closed
    }
}

struct ScriptedSession {
    id: String,
    participant: String,
    closed: Arc<Mutex<Vec<String>>>,
    fail_close: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl TranscriptionSession for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if self.fail_close.lock().unwrap().contains(&self.participant) {
            bail!("close failed for {}", self.participant);
        }
        self.closed.lock().unwrap().push(self.participant.clone());
        Ok(())
    }
}

#[async_trait]
impl RoomRuntime for ScriptedRuntime {
    async fn open_transcription(
        &self,
        participant: &str,
        _settings: &SttSettings,
    ) -> Result<Box<dyn TranscriptionSession>> {
        if self.fail_next_open.lock().unwrap().remove(participant) {
            bail!("STT backend unavailable");
        }

        self.opened.lock().unwrap().push(participant.to_string());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedSession {
            id: format!("session-{n}"),
            participant: participant.to_string(),
            closed: Arc::clone(&self.closed),
            fail_close: Arc::clone(&self.fail_close),
        }))
    }
}

struct Harness {
    _temp_dir: TempDir,
    runtime: Arc<ScriptedRuntime>,
    store: Arc<ProtocolStore>,
    supervisor: SessionSupervisor,
}

fn harness(idle_timeout: Option<Duration>, check_interval: Duration) -> Result<Harness> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(ProtocolStore::new(StoreOptions {
        room: "standup".to_string(),
        stt_provider: "deepgram".to_string(),
        output_format: OutputFormat::Both,
        statistics: true,
        output_dir: temp_dir.path().to_path_buf(),
        started: NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap(),
    }));

    let config = SupervisorConfig {
        idle_timeout,
        idle_check_interval: check_interval,
        ..SupervisorConfig::new(SttProvider::Deepgram.settings("de"))
    };

    let runtime = Arc::new(ScriptedRuntime::default());
    let supervisor = SessionSupervisor::start(config, runtime.clone(), Arc::clone(&store))?;

    Ok(Harness {
        _temp_dir: temp_dir,
        runtime,
        store,
        supervisor,
    })
}

fn read_records(store: &ProtocolStore) -> Result<Vec<EventRecord>> {
    fs::read_to_string(&store.paths().records)?
        .lines()
        .map(|line| Ok(EventRecord::from_json_line(line)?))
        .collect()
}

fn lifecycle_kinds(records: &[EventRecord], who: &str) -> Vec<LifecycleKind> {
    records
        .iter()
        .filter_map(|r| match r {
            EventRecord::Lifecycle(e) if e.participant == who => Some(e.kind),
            _ => None,
        })
        .collect()
}

const MINUTE: Duration = Duration::from_secs(60);
const NEVER: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::test]
async fn test_join_speak_leave() -> Result<()> {
    let h = harness(None, NEVER)?;

    h.supervisor.on_participant_joined("alice", Some("Alice")).await?;
    h.supervisor.wait_for_pending().await;
    assert_eq!(h.runtime.opened(), vec!["alice"]);

    let alice = h.supervisor.participant("alice").await.unwrap();
    assert_eq!(alice.state, SessionState::Active);
    assert_eq!(alice.name, "Alice");
    assert!(alice.has_transcription);

    for text in ["good morning", "  status is green  ", "next item please"] {
        h.supervisor.on_utterance("alice", text).await?;
    }

    let alice = h.supervisor.participant("alice").await.unwrap();
    assert_eq!(alice.turn_count, 3);
    assert_eq!(alice.word_count, 8);

    h.supervisor.on_participant_left("alice").await?;
    h.supervisor.wait_for_pending().await;
    assert!(h.supervisor.participant("alice").await.is_none());
    assert_eq!(h.runtime.closed(), vec!["alice"]);

    h.supervisor.close().await?;

    let records = read_records(&h.store)?;
    assert_eq!(lifecycle_kinds(&records, "alice"), vec![LifecycleKind::Joined, LifecycleKind::Left]);

    let texts: Vec<&str> = records
        .iter()
        .filter_map(|r| match r {
            EventRecord::Transcript(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["good morning", "status is green", "next item please"]);
    assert!(matches!(records.last(), Some(EventRecord::Footer(_))));

    assert_eq!(h.store.stats().participants["alice"].turn_count, 3);
    Ok(())
}

#[tokio::test]
async fn test_blank_utterances_are_discarded() -> Result<()> {
    let h = harness(None, NEVER)?;
    h.supervisor.on_participant_joined("alice", None).await?;

    h.supervisor.on_utterance("alice", "").await?;
    h.supervisor.on_utterance("alice", "   \n\t ").await?;

    let alice = h.supervisor.participant("alice").await.unwrap();
    assert_eq!(alice.turn_count, 0);
    assert_eq!(alice.word_count, 0);
    assert_eq!(h.store.stats().total_turns, 0);

    let records = read_records(&h.store)?;
    assert!(!records.iter().any(|r| matches!(r, EventRecord::Transcript(_))));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_join_and_unknown_leave_are_ignored() -> Result<()> {
    let h = harness(None, NEVER)?;

    h.supervisor.on_participant_joined("alice", None).await?;
    h.supervisor.on_participant_joined("alice", None).await?;
    h.supervisor.on_participant_left("mallory").await?;
    h.supervisor.wait_for_pending().await;

    assert_eq!(h.runtime.opened(), vec!["alice"]);
    let records = read_records(&h.store)?;
    assert_eq!(lifecycle_kinds(&records, "alice"), vec![LifecycleKind::Joined]);
    assert!(lifecycle_kinds(&records, "mallory").is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_one_speaker_keeps_group_active() -> Result<()> {
    let h = harness(Some(5 * MINUTE), NEVER)?;

    h.supervisor.on_participant_joined("a", None).await?;
    h.supervisor.on_participant_joined("b", None).await?;
    h.supervisor.wait_for_pending().await;

    tokio::time::advance(9 * MINUTE).await;
    h.supervisor.on_utterance("b", "still here").await?;
    tokio::time::advance(MINUTE).await;

    // a silent for 10 min, b for 1 min
    assert!(!h.supervisor.check_idle().await?);
    assert!(!h.supervisor.is_idle().await);
    assert!(h.supervisor.participant("a").await.unwrap().has_transcription);

    tokio::time::advance(4 * MINUTE).await;

    assert!(h.supervisor.check_idle().await?);
    assert!(h.supervisor.is_idle().await);
    for who in ["a", "b"] {
        let p = h.supervisor.participant(who).await.unwrap();
        assert_eq!(p.state, SessionState::Idle);
        assert!(!p.has_transcription);
    }
    assert_eq!(h.runtime.closed(), vec!["a", "b"]);

    // Nothing left to pause
    assert!(!h.supervisor.check_idle().await?);

    let records = read_records(&h.store)?;
    assert_eq!(lifecycle_kinds(&records, "a"), vec![LifecycleKind::Joined, LifecycleKind::IdlePaused]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_audio_track_resumes_group_after_idle() -> Result<()> {
    let h = harness(Some(5 * MINUTE), NEVER)?;

    h.supervisor.on_participant_joined("a", None).await?;
    h.supervisor.on_participant_joined("b", None).await?;
    h.supervisor.wait_for_pending().await;

    tokio::time::advance(6 * MINUTE).await;
    assert!(h.supervisor.check_idle().await?);

    h.supervisor.on_audio_track_subscribed("a").await?;
    h.supervisor.wait_for_pending().await;

    assert!(!h.supervisor.is_idle().await);
    for who in ["a", "b"] {
        let p = h.supervisor.participant(who).await.unwrap();
        assert_eq!(p.state, SessionState::Active);
        assert!(p.has_transcription);
    }
    assert_eq!(h.runtime.opened().len(), 4);

    // Fresh silence window after the resume
    tokio::time::advance(MINUTE).await;
    assert!(!h.supervisor.check_idle().await?);

    let records = read_records(&h.store)?;
    let expected = vec![LifecycleKind::Joined, LifecycleKind::IdlePaused, LifecycleKind::Resumed];
    assert_eq!(lifecycle_kinds(&records, "a"), expected);
    assert_eq!(lifecycle_kinds(&records, "b"), expected);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_idle_loop_pauses_silent_group() -> Result<()> {
    let h = harness(Some(5 * MINUTE), MINUTE)?;

    h.supervisor.on_participant_joined("a", None).await?;
    h.supervisor.wait_for_pending().await;

    // Paused clock auto-advances through the loop's ticks
    tokio::time::sleep(6 * MINUTE).await;
    assert!(h.supervisor.is_idle().await);
    assert_eq!(h.runtime.closed(), vec!["a"]);

    h.supervisor.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_open_is_retried_on_audio_track() -> Result<()> {
    let h = harness(None, NEVER)?;
    h.runtime.fail_next_open.lock().unwrap().insert("alice".to_string());

    h.supervisor.on_participant_joined("alice", None).await?;
    h.supervisor.wait_for_pending().await;

    let alice = h.supervisor.participant("alice").await.unwrap();
    assert_eq!(alice.state, SessionState::Active);
    assert!(!alice.has_transcription);

    h.supervisor.on_audio_track_subscribed("alice").await?;
    h.supervisor.wait_for_pending().await;

    assert!(h.supervisor.participant("alice").await.unwrap().has_transcription);
    assert_eq!(h.runtime.opened(), vec!["alice"]);

    // No resume marker outside idle suspension
    let records = read_records(&h.store)?;
    assert_eq!(lifecycle_kinds(&records, "alice"), vec![LifecycleKind::Joined]);
    Ok(())
}

#[tokio::test]
async fn test_join_not_tracked_when_store_rejects_it() -> Result<()> {
    let h = harness(None, NEVER)?;
    h.store.finalize(
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap(),
    )?;

    assert!(h.supervisor.on_participant_joined("alice", None).await.is_err());
    h.supervisor.wait_for_pending().await;

    assert!(h.supervisor.participant("alice").await.is_none());
    assert!(h.runtime.opened().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_tolerates_failing_sessions_and_finalizes() -> Result<()> {
    let h = harness(Some(5 * MINUTE), MINUTE)?;
    h.runtime.fail_close.lock().unwrap().insert("a".to_string());

    for who in ["a", "b", "c"] {
        h.supervisor.on_participant_joined(who, None).await?;
    }
    h.supervisor.wait_for_pending().await;

    h.supervisor.close().await?;

    // "a" failed to close; the others were still closed
    assert_eq!(h.runtime.closed(), vec!["b", "c"]);
    assert!(!h.store.is_open());

    let records = read_records(&h.store)?;
    assert!(matches!(records.last(), Some(EventRecord::Footer(_))));
    assert!(h.store.paths().stats.exists());

    // Detached: later notifications are dropped
    h.supervisor
        .handle(RoomEvent::Utterance {
            identity: "b".to_string(),
            text: "anyone there?".to_string(),
        })
        .await?;
    assert_eq!(read_records(&h.store)?.len(), records.len());
    Ok(())
}

#[tokio::test]
async fn test_run_dispatches_room_events() -> Result<()> {
    let h = harness(None, NEVER)?;
    let (tx, rx) = mpsc::channel(16);

    let events = vec![
        RoomEvent::ParticipantJoined {
            identity: "alice".to_string(),
            name: None,
        },
        RoomEvent::Utterance {
            identity: "alice".to_string(),
            text: "hello world".to_string(),
        },
        RoomEvent::ParticipantLeft {
            identity: "alice".to_string(),
        },
    ];
    for event in events {
        tx.send(event).await?;
    }
    drop(tx);

    h.supervisor.run(rx).await?;
    h.supervisor.close().await?;

    let records = read_records(&h.store)?;
    assert_eq!(lifecycle_kinds(&records, "alice"), vec![LifecycleKind::Joined, LifecycleKind::Left]);
    assert_eq!(h.store.stats().participants["alice"].word_count, 2);
    Ok(())
}

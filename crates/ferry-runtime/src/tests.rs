//! Orchestrator state-machine tests against scripted driver and transcript
//! doubles.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use ferry_protocol::{AnswerProgress, PromptAction};
use ferry_session::{SessionRecord, SessionStore};
use ferry_transcript::{
    ContentBlock, Role, TranscriptEntry, TranscriptError, TranscriptSource,
    CLARIFICATION_TOOL_NAME,
};

use crate::{
    AgentDriver, BridgeError, DriverHandle, OpenedSession, OrchestratorConfig,
    ResponseOrchestrator, TurnOutcome,
};

struct MockDriver {
    alive: AtomicBool,
    opened: Mutex<Vec<String>>,
    resumed: Mutex<Vec<String>>,
    texts: Mutex<Vec<(String, String)>>,
    actions: Mutex<Vec<Vec<PromptAction>>>,
    cleaned: Mutex<Vec<String>>,
}

impl MockDriver {
    fn new(alive: bool) -> Self {
        Self {
            alive: AtomicBool::new(alive),
            opened: Mutex::new(Vec::new()),
            resumed: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            cleaned: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentDriver for MockDriver {
    async fn open_session(
        &self,
        _working_dir: &Path,
        initial_message: &str,
    ) -> Result<OpenedSession> {
        self.opened
            .lock()
            .expect("opened lock")
            .push(initial_message.to_string());
        Ok(OpenedSession {
            handle: DriverHandle("window-1".to_string()),
            session_id: "sess-test".to_string(),
        })
    }

    async fn resume_session(&self, session_id: &str) -> Result<DriverHandle> {
        self.resumed
            .lock()
            .expect("resumed lock")
            .push(session_id.to_string());
        // Recovery succeeded on a fresh surface.
        self.alive.store(true, Ordering::SeqCst);
        Ok(DriverHandle("window-99".to_string()))
    }

    async fn is_alive(&self, _handle: &DriverHandle) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn deliver_text(&self, handle: &DriverHandle, text: &str) -> Result<()> {
        self.texts
            .lock()
            .expect("texts lock")
            .push((handle.0.clone(), text.to_string()));
        Ok(())
    }

    async fn deliver_actions(&self, _handle: &DriverHandle, actions: &[PromptAction]) -> Result<()> {
        self.actions
            .lock()
            .expect("actions lock")
            .push(actions.to_vec());
        Ok(())
    }

    async fn cleanup_surface(&self, handle: &DriverHandle) -> Result<()> {
        self.cleaned
            .lock()
            .expect("cleaned lock")
            .push(handle.0.clone());
        Ok(())
    }
}

/// Returns queued snapshots in order, then repeats the last one forever.
struct ScriptedTranscripts {
    snapshots: Mutex<VecDeque<Vec<TranscriptEntry>>>,
}

impl ScriptedTranscripts {
    fn new(snapshots: Vec<Vec<TranscriptEntry>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().collect()),
        }
    }
}

impl TranscriptSource for ScriptedTranscripts {
    fn read_entries(&self, _session_id: &str) -> Result<Vec<TranscriptEntry>, TranscriptError> {
        let mut snapshots = self.snapshots.lock().expect("snapshots lock");
        if snapshots.len() > 1 {
            Ok(snapshots.pop_front().unwrap_or_default())
        } else {
            Ok(snapshots.front().cloned().unwrap_or_default())
        }
    }
}

fn user_text(text: &str) -> TranscriptEntry {
    TranscriptEntry {
        role: Role::User,
        blocks: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
    }
}

fn agent_text(text: &str) -> TranscriptEntry {
    TranscriptEntry {
        role: Role::Agent,
        blocks: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
    }
}

fn agent_clarification() -> TranscriptEntry {
    TranscriptEntry {
        role: Role::Agent,
        blocks: vec![ContentBlock::ToolInvocation {
            name: CLARIFICATION_TOOL_NAME.to_string(),
            invocation_id: "toolu_q".to_string(),
            input: serde_json::json!({
                "questions": [{
                    "question": "Which tone?",
                    "header": "Tone",
                    "options": [{"label": "Formal"}, {"label": "Casual"}]
                }]
            }),
        }],
    }
}

fn user_result(invocation_id: &str) -> TranscriptEntry {
    TranscriptEntry {
        role: Role::User,
        blocks: vec![ContentBlock::ToolResult {
            invocation_id: invocation_id.to_string(),
        }],
    }
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        working_dir: PathBuf::from("."),
        poll_interval_ms: 10,
        turn_timeout_ms: 300,
        question_stale_ms: 300_000,
    }
}

fn empty_store(dir: &Path) -> SessionStore {
    SessionStore::load(dir.join("sessions.json"))
}

fn seeded_store(dir: &Path, thread_id: &str, handle: Option<&str>) -> SessionStore {
    let mut store = empty_store(dir);
    store
        .put(
            thread_id,
            SessionRecord {
                session_id: "sess-test".to_string(),
                driver_handle: handle.map(ToOwned::to_owned),
                created_unix_ms: 1_000,
                last_used_unix_ms: 1_000,
            },
        )
        .expect("seed record");
    store
}

#[tokio::test]
async fn execute_new_relays_final_text_and_records_session() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let driver = MockDriver::new(true);
    let transcripts = ScriptedTranscripts::new(vec![vec![
        user_text("draft a reply"),
        agent_text("Draft reply: sounds good, shipping Friday."),
    ]]);
    let orchestrator = ResponseOrchestrator::new(
        driver,
        transcripts,
        empty_store(tempdir.path()),
        test_config(),
    );

    let outcome = orchestrator
        .execute_new("T1", "draft a reply")
        .await
        .expect("final outcome");
    assert_eq!(
        outcome,
        TurnOutcome::Final {
            text: "Draft reply: sounds good, shipping Friday.".to_string()
        }
    );

    let record = orchestrator.session_snapshot("T1").expect("record stored");
    assert_eq!(record.session_id, "sess-test");
    assert_eq!(record.driver_handle.as_deref(), Some("window-1"));
}

#[tokio::test]
async fn execute_resume_question_then_submit_reaches_final() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let driver = MockDriver::new(true);
    let clarification = vec![user_text("follow up"), agent_clarification()];
    let mut finished = clarification.clone();
    finished.push(user_result("toolu_q"));
    finished.push(agent_text("Done, using the casual tone."));
    let transcripts = ScriptedTranscripts::new(vec![
        Vec::new(),            // baseline read during resume
        clarification.clone(), // poll observes the clarification
        clarification,         // baseline read during submit
        finished,              // poll observes the answer's final turn
    ]);
    let orchestrator = ResponseOrchestrator::new(
        driver,
        transcripts,
        seeded_store(tempdir.path(), "T1", Some("window-1")),
        test_config(),
    );

    let outcome = orchestrator
        .execute_resume("T1", "follow up")
        .await
        .expect("question outcome");
    let TurnOutcome::Question { questions } = outcome else {
        panic!("expected question outcome, got {outcome:?}");
    };
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].options.len(), 2);
    assert!(orchestrator.has_pending_question("T1"));

    let progress = orchestrator
        .record_selection("T1", 0, 1, "Casual")
        .expect("selection");
    assert_eq!(progress, AnswerProgress::Ready);

    let ready = orchestrator.take_ready_answer("T1").expect("ready answer");
    assert_eq!(ready.invocation_id, "toolu_q");
    assert_eq!(ready.selections[0].selected_indices, vec![1]);
    assert!(!orchestrator.has_pending_question("T1"));

    let outcome = orchestrator
        .submit_answer("T1", &ready.selections)
        .await
        .expect("final after submit");
    assert_eq!(
        outcome,
        TurnOutcome::Final {
            text: "Done, using the casual tone.".to_string()
        }
    );
}

#[tokio::test]
async fn submitted_single_select_encoding_reaches_the_driver() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let driver = Arc::new(MockDriver::new(true));
    let clarification = vec![agent_clarification()];
    let mut finished = clarification.clone();
    finished.push(agent_text("ok"));
    let transcripts = ScriptedTranscripts::new(vec![clarification, finished]);
    let orchestrator = ResponseOrchestrator::new(
        Arc::clone(&driver),
        transcripts,
        seeded_store(tempdir.path(), "T1", Some("window-1")),
        test_config(),
    );

    let ready_selections = vec![ferry_protocol::QuestionSelection {
        question_index: 0,
        selected_indices: vec![1],
        is_multi_select: false,
        option_count: 2,
    }];
    orchestrator
        .submit_answer("T1", &ready_selections)
        .await
        .expect("final");

    let delivered = driver.actions.lock().expect("actions lock");
    assert_eq!(
        delivered.as_slice(),
        &[vec![
            PromptAction::MoveForward,
            PromptAction::Confirm,
            PromptAction::Confirm,
        ]]
    );
}

#[tokio::test]
async fn dead_surface_on_resume_recovers_and_replaces_handle() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let driver = Arc::new(MockDriver::new(false));
    let transcripts =
        ScriptedTranscripts::new(vec![Vec::new(), vec![agent_text("recovered fine")]]);
    let orchestrator = ResponseOrchestrator::new(
        Arc::clone(&driver),
        transcripts,
        seeded_store(tempdir.path(), "T1", Some("window-1")),
        test_config(),
    );

    let outcome = orchestrator
        .execute_resume("T1", "still there?")
        .await
        .expect("final after recovery");
    assert_eq!(
        outcome,
        TurnOutcome::Final {
            text: "recovered fine".to_string()
        }
    );

    assert_eq!(
        driver.resumed.lock().expect("resumed lock").as_slice(),
        &["sess-test".to_string()]
    );
    let record = orchestrator.session_snapshot("T1").expect("record");
    assert_eq!(record.driver_handle.as_deref(), Some("window-99"));
}

#[tokio::test]
async fn dead_surface_on_submit_fails_without_recovery() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let driver = Arc::new(MockDriver::new(false));
    let transcripts = ScriptedTranscripts::new(vec![Vec::new()]);
    let orchestrator = ResponseOrchestrator::new(
        Arc::clone(&driver),
        transcripts,
        seeded_store(tempdir.path(), "T1", Some("window-1")),
        test_config(),
    );

    let result = orchestrator.submit_answer("T1", &[]).await;
    assert!(matches!(
        result,
        Err(BridgeError::DriverUnavailable { .. })
    ));
    assert!(driver.resumed.lock().expect("resumed lock").is_empty());
}

#[tokio::test]
async fn resume_on_unknown_thread_is_session_not_found() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let orchestrator = ResponseOrchestrator::new(
        MockDriver::new(true),
        ScriptedTranscripts::new(vec![Vec::new()]),
        empty_store(tempdir.path()),
        test_config(),
    );

    let result = orchestrator.execute_resume("missing", "hello").await;
    assert!(matches!(result, Err(BridgeError::SessionNotFound { .. })));
}

#[tokio::test]
async fn silent_transcript_times_out_with_distinct_error() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let orchestrator = ResponseOrchestrator::new(
        MockDriver::new(true),
        ScriptedTranscripts::new(vec![Vec::new()]),
        seeded_store(tempdir.path(), "T1", Some("window-1")),
        test_config(),
    );

    let result = orchestrator.execute_resume("T1", "anyone home?").await;
    assert!(matches!(
        result,
        Err(BridgeError::Timeout { budget_ms: 300 })
    ));
}

#[tokio::test]
async fn stale_final_from_previous_turn_is_not_re_reported() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let stale = vec![user_text("turn one"), agent_text("old answer")];
    let orchestrator = ResponseOrchestrator::new(
        MockDriver::new(true),
        ScriptedTranscripts::new(vec![stale.clone(), stale]),
        seeded_store(tempdir.path(), "T1", Some("window-1")),
        test_config(),
    );

    // The transcript never grows past the delivery baseline, so the old
    // answer must never come back; the turn times out instead.
    let result = orchestrator.execute_resume("T1", "turn two").await;
    assert!(matches!(result, Err(BridgeError::Timeout { .. })));
}

#[tokio::test]
async fn second_operation_on_busy_thread_is_rejected() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let orchestrator = Arc::new(ResponseOrchestrator::new(
        MockDriver::new(true),
        ScriptedTranscripts::new(vec![Vec::new()]),
        seeded_store(tempdir.path(), "T1", Some("window-1")),
        test_config(),
    ));

    let background = Arc::clone(&orchestrator);
    let first = tokio::spawn(async move { background.execute_resume("T1", "first").await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = orchestrator.execute_resume("T1", "second").await;
    assert!(matches!(second, Err(BridgeError::Busy { .. })));

    // Distinct threads are not affected by T1 being in flight.
    let other = orchestrator.execute_resume("T2", "unrelated").await;
    assert!(matches!(other, Err(BridgeError::SessionNotFound { .. })));

    let first = first.await.expect("join");
    assert!(matches!(first, Err(BridgeError::Timeout { .. })));
}

#[tokio::test]
async fn cleanup_runs_after_final_and_failures_do_not_escalate() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let driver = Arc::new(MockDriver::new(true));
    let transcripts = ScriptedTranscripts::new(vec![vec![agent_text("bye")]]);
    let orchestrator = ResponseOrchestrator::new(
        Arc::clone(&driver),
        transcripts,
        empty_store(tempdir.path()),
        test_config(),
    );

    orchestrator
        .execute_new("T1", "quick one")
        .await
        .expect("final");
    assert_eq!(
        driver.cleaned.lock().expect("cleaned lock").as_slice(),
        &["window-1".to_string()]
    );
}

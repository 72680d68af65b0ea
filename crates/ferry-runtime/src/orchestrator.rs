use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ferry_core::unix_timestamp_ms;
use ferry_protocol::{
    encode_answer_actions, AnswerError, AnswerProgress, PendingQuestionState,
    PendingQuestionTracker, QuestionItem, QuestionSelection, ReadyAnswer,
};
use ferry_session::{SessionRecord, SessionStore};
use ferry_transcript::{classify_entries, TranscriptCursor, TranscriptSource, TurnStatus};

use crate::driver::{AgentDriver, DriverHandle};
use crate::error::BridgeError;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Working directory new agent sessions are opened in.
    pub working_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub turn_timeout_ms: u64,
    /// Unanswered clarifications older than this are silently dropped by the
    /// eviction sweep.
    pub question_stale_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            poll_interval_ms: 500,
            turn_timeout_ms: 120_000,
            question_stale_ms: 5 * 60 * 1_000,
        }
    }
}

/// What a settled turn produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Final { text: String },
    Question { questions: Vec<QuestionItem> },
}

/// Per-thread state machine bridging chat threads to agent sessions.
///
/// All mutation of a thread's state flows through this one owner; a second
/// operation on a thread that is still in flight is rejected with
/// [`BridgeError::Busy`] because the driver surface has no per-thread
/// isolation. Operations on distinct threads run concurrently.
pub struct ResponseOrchestrator<D, T> {
    driver: D,
    transcripts: T,
    config: OrchestratorConfig,
    sessions: Mutex<SessionStore>,
    pending: Mutex<PendingQuestionTracker>,
    in_flight: Mutex<HashSet<String>>,
}

impl<D, T> ResponseOrchestrator<D, T>
where
    D: AgentDriver,
    T: TranscriptSource,
{
    pub fn new(driver: D, transcripts: T, sessions: SessionStore, config: OrchestratorConfig) -> Self {
        Self {
            driver,
            transcripts,
            config,
            sessions: Mutex::new(sessions),
            pending: Mutex::new(PendingQuestionTracker::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn has_session(&self, thread_id: &str) -> bool {
        lock_or_recover(&self.sessions).contains(thread_id)
    }

    pub fn session_snapshot(&self, thread_id: &str) -> Option<SessionRecord> {
        lock_or_recover(&self.sessions).get(thread_id).cloned()
    }

    /// Opens a fresh agent session for the thread and waits for its first
    /// turn to settle.
    pub async fn execute_new(
        &self,
        thread_id: &str,
        message: &str,
    ) -> Result<TurnOutcome, BridgeError> {
        let _flight = self.begin_flight(thread_id)?;

        let opened = self
            .driver
            .open_session(&self.config.working_dir, message)
            .await
            .map_err(|error| BridgeError::DriverUnavailable {
                thread_id: thread_id.to_string(),
                reason: format!("{error:#}"),
            })?;

        let now = unix_timestamp_ms();
        lock_or_recover(&self.sessions)
            .put(
                thread_id,
                SessionRecord {
                    session_id: opened.session_id.clone(),
                    driver_handle: Some(opened.handle.0.clone()),
                    created_unix_ms: now,
                    last_used_unix_ms: now,
                },
            )
            .map_err(BridgeError::Store)?;
        tracing::info!(thread_id, session_id = %opened.session_id, "opened new agent session");

        self.wait_for_turn(
            thread_id,
            &opened.session_id,
            Some(&opened.handle),
            TranscriptCursor::at_baseline(0),
        )
        .await
    }

    /// Delivers a follow-up message into the thread's existing session,
    /// recovering onto a fresh surface when the original window is gone.
    pub async fn execute_resume(
        &self,
        thread_id: &str,
        message: &str,
    ) -> Result<TurnOutcome, BridgeError> {
        let _flight = self.begin_flight(thread_id)?;

        let record = self
            .session_snapshot(thread_id)
            .ok_or_else(|| BridgeError::SessionNotFound {
                thread_id: thread_id.to_string(),
            })?;

        let existing = record.driver_handle.clone().map(DriverHandle);
        let handle = match existing {
            Some(handle) if self.driver.is_alive(&handle).await => handle,
            _ => {
                tracing::warn!(
                    thread_id,
                    session_id = %record.session_id,
                    "driver surface lost, resuming session on a fresh surface"
                );
                let replacement = self
                    .driver
                    .resume_session(&record.session_id)
                    .await
                    .map_err(|error| BridgeError::DriverUnavailable {
                        thread_id: thread_id.to_string(),
                        reason: format!("{error:#}"),
                    })?;
                lock_or_recover(&self.sessions)
                    .replace_driver_handle(thread_id, &replacement.0, unix_timestamp_ms())
                    .map_err(BridgeError::Store)?;
                replacement
            }
        };

        // Snapshot the entry count before delivering so a final answer left
        // over from the previous turn can never be re-reported.
        let baseline = self.transcript_len(&record.session_id);
        self.driver
            .deliver_text(&handle, message)
            .await
            .map_err(|error| BridgeError::DriverUnavailable {
                thread_id: thread_id.to_string(),
                reason: format!("{error:#}"),
            })?;
        self.touch_session(thread_id)?;

        self.wait_for_turn(
            thread_id,
            &record.session_id,
            Some(&handle),
            TranscriptCursor::at_baseline(baseline),
        )
        .await
    }

    /// Replays a completed answer set against the clarification prompt and
    /// waits for the turn to settle. The prompt lives only on the original
    /// surface, so a dead surface fails outright instead of recovering.
    pub async fn submit_answer(
        &self,
        thread_id: &str,
        selections: &[QuestionSelection],
    ) -> Result<TurnOutcome, BridgeError> {
        let _flight = self.begin_flight(thread_id)?;

        let record = self
            .session_snapshot(thread_id)
            .ok_or_else(|| BridgeError::SessionNotFound {
                thread_id: thread_id.to_string(),
            })?;
        let handle = record
            .driver_handle
            .clone()
            .map(DriverHandle)
            .ok_or_else(|| BridgeError::DriverUnavailable {
                thread_id: thread_id.to_string(),
                reason: "no driver surface recorded".to_string(),
            })?;
        if !self.driver.is_alive(&handle).await {
            return Err(BridgeError::DriverUnavailable {
                thread_id: thread_id.to_string(),
                reason: "clarification prompt surface is gone".to_string(),
            });
        }

        let actions = encode_answer_actions(selections);
        let baseline = self.transcript_len(&record.session_id);
        self.driver
            .deliver_actions(&handle, &actions)
            .await
            .map_err(|error| BridgeError::DriverUnavailable {
                thread_id: thread_id.to_string(),
                reason: format!("{error:#}"),
            })?;
        self.touch_session(thread_id)?;

        self.wait_for_turn(
            thread_id,
            &record.session_id,
            Some(&handle),
            TranscriptCursor::at_baseline(baseline),
        )
        .await
    }

    /// Records one option click against the thread's pending clarification.
    pub fn record_selection(
        &self,
        thread_id: &str,
        question_index: usize,
        option_index: usize,
        label: &str,
    ) -> Result<AnswerProgress, AnswerError> {
        lock_or_recover(&self.pending).record_selection(
            thread_id,
            question_index,
            option_index,
            label,
        )
    }

    /// Confirms a multi-select question's current selection.
    pub fn confirm_question(
        &self,
        thread_id: &str,
        question_index: usize,
    ) -> Result<AnswerProgress, AnswerError> {
        lock_or_recover(&self.pending).confirm(thread_id, question_index)
    }

    /// Detaches the thread's answer set once complete.
    pub fn take_ready_answer(&self, thread_id: &str) -> Option<ReadyAnswer> {
        lock_or_recover(&self.pending).take_ready(thread_id)
    }

    pub fn has_pending_question(&self, thread_id: &str) -> bool {
        lock_or_recover(&self.pending).contains(thread_id)
    }

    /// Drops clarification state older than the staleness budget. Returns
    /// the affected thread ids; the drop itself is silent.
    pub fn evict_stale_questions(&self, now_unix_ms: u64) -> Vec<String> {
        let evicted = lock_or_recover(&self.pending)
            .evict_stale(now_unix_ms, self.config.question_stale_ms);
        for thread_id in &evicted {
            tracing::info!(thread_id, "evicted stale pending question");
        }
        evicted
    }

    async fn wait_for_turn(
        &self,
        thread_id: &str,
        session_id: &str,
        handle: Option<&DriverHandle>,
        mut cursor: TranscriptCursor,
    ) -> Result<TurnOutcome, BridgeError> {
        let budget = Duration::from_millis(self.config.turn_timeout_ms);
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let started = Instant::now();

        loop {
            if started.elapsed() >= budget {
                return Err(BridgeError::Timeout {
                    budget_ms: self.config.turn_timeout_ms,
                });
            }

            match self.transcripts.read_entries(session_id) {
                Ok(entries) => {
                    let (advanced, status) = classify_entries(&entries, cursor);
                    cursor = advanced;
                    match status {
                        TurnStatus::Pending => {}
                        TurnStatus::BlockedOnQuestion {
                            invocation_id,
                            questions,
                        } => {
                            let now = unix_timestamp_ms();
                            lock_or_recover(&self.pending).insert(
                                thread_id,
                                PendingQuestionState::new(
                                    session_id,
                                    &invocation_id,
                                    questions.clone(),
                                    now,
                                ),
                            );
                            self.touch_session(thread_id)?;
                            tracing::info!(
                                thread_id,
                                %invocation_id,
                                question_count = questions.len(),
                                "agent blocked on clarification"
                            );
                            return Ok(TurnOutcome::Question { questions });
                        }
                        TurnStatus::Final { text } => {
                            self.touch_session(thread_id)?;
                            if let Some(handle) = handle {
                                if let Err(error) = self.driver.cleanup_surface(handle).await {
                                    tracing::warn!(
                                        thread_id,
                                        %error,
                                        "scratch cleanup failed after final turn"
                                    );
                                }
                            }
                            return Ok(TurnOutcome::Final { text });
                        }
                    }
                }
                // Transient: the agent may be mid-append or the file not yet
                // created. Persisting unreadability surfaces as Timeout.
                Err(error) => {
                    tracing::debug!(session_id, %error, "transcript read failed, retrying");
                }
            }

            tokio::time::sleep(interval).await;
        }
    }

    fn transcript_len(&self, session_id: &str) -> usize {
        self.transcripts
            .read_entries(session_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    fn touch_session(&self, thread_id: &str) -> Result<(), BridgeError> {
        lock_or_recover(&self.sessions)
            .touch(thread_id, unix_timestamp_ms())
            .map_err(BridgeError::Store)
    }

    fn begin_flight(&self, thread_id: &str) -> Result<FlightGuard<'_>, BridgeError> {
        let mut in_flight = lock_or_recover(&self.in_flight);
        if !in_flight.insert(thread_id.to_string()) {
            return Err(BridgeError::Busy {
                thread_id: thread_id.to_string(),
            });
        }
        Ok(FlightGuard {
            set: &self.in_flight,
            thread_id: thread_id.to_string(),
        })
    }
}

/// Releases the per-thread exclusivity slot when an operation completes,
/// including on early returns and panics.
struct FlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    thread_id: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock_or_recover(self.set).remove(&self.thread_id);
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

//! Pattern apply attempts: submit the pattern, then poll the job until it ends.
//!
//! An [`ApplySession`] belongs to one view. Each call to [`ApplySession::apply`]
//! is a numbered attempt moving through `Submitting -> Polling -> terminal`;
//! only the newest attempt publishes state or fires hooks. Tearing the session
//! down stops every loop it owns before its next poll and suppresses any state
//! update from responses still in flight.

use crate::backend::{
    ApplyPatternRequest, JobOutcome, JobSnapshot, JobStatus, PatternBackend, PatternStep,
    WorkflowPattern,
};
use crate::errors::ApiError;
use crate::model::{JobId, PatternId, SheetId, SpreadsheetId, StepType};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;
pub const DEFAULT_STALE_AFTER_MS: u64 = 60_000;

const SUBMISSION_FALLBACK: &str = "failed to start pattern apply";
const STEP_FAILURE_FALLBACK: &str = "pattern step failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyConfig {
    /// Fixed delay between job-status polls.
    pub poll_interval: Duration,
    /// How long a job may sit in `queued` before the attempt gives up.
    pub stale_after: Duration,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stale_after: Duration::from_millis(DEFAULT_STALE_AFTER_MS),
        }
    }
}

/// Side effects the surrounding view performs once a job succeeds.
pub trait ApplyHooks: Send + Sync {
    fn refresh_grid(&self, target: &ApplyTarget);
    /// Highlights are visual-only and may not survive the backend refresh.
    fn reapply_highlights(&self, target: &ApplyTarget, steps: &[PatternStep]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ApplyHooks for NoopHooks {
    fn refresh_grid(&self, _target: &ApplyTarget) {}
    fn reapply_highlights(&self, _target: &ApplyTarget, _steps: &[PatternStep]) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyTarget {
    pub pattern_id: PatternId,
    pub spreadsheet_id: SpreadsheetId,
    pub sheet_id: SheetId,
}

impl ApplyTarget {
    pub fn request(&self) -> ApplyPatternRequest {
        ApplyPatternRequest {
            pattern_id: self.pattern_id.clone(),
            spreadsheet_id: self.spreadsheet_id.clone(),
            sheet_id: self.sheet_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
    Canceled,
}

impl ApplyPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplyPhase::Succeeded | ApplyPhase::Failed | ApplyPhase::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRunStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyStep {
    pub seq: u32,
    pub step_type: StepType,
    pub disabled: bool,
    pub status: StepRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&PatternStep> for ApplyStep {
    fn from(step: &PatternStep) -> Self {
        Self {
            seq: step.seq,
            step_type: step.step_type,
            disabled: step.disabled,
            status: StepRunStatus::Pending,
            message: None,
        }
    }
}

/// Why an attempt ended in [`ApplyPhase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyFailure {
    /// The apply call itself was rejected; no job exists.
    #[error("{message}")]
    Submission { message: String },
    /// The job reported `failed`.
    #[error("{message}")]
    Step { seq: Option<u32>, message: String },
    /// The job never left `queued`; no step actually failed.
    #[error("job {job_id} has been queued for {waited_secs}s; the pattern worker may be stuck")]
    Stale { job_id: JobId, waited_secs: u64 },
    /// A status poll errored.
    #[error("lost track of job {job_id}: {message}")]
    Poll { job_id: JobId, message: String },
}

impl ApplyFailure {
    fn submission(err: &ApiError) -> Self {
        let message = err.user_message().trim();
        ApplyFailure::Submission {
            message: if message.is_empty() {
                SUBMISSION_FALLBACK.to_string()
            } else {
                message.to_string()
            },
        }
    }
}

/// Observable state of the current apply attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyState {
    pub attempt: u64,
    pub phase: ApplyPhase,
    pub job_id: Option<JobId>,
    pub job_status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub current_step: Option<u32>,
    pub job_error: Option<String>,
    pub apply_steps: Vec<ApplyStep>,
    pub apply_error: Option<String>,
    pub apply_failed_index: Option<usize>,
    pub failure: Option<ApplyFailure>,
}

impl ApplyState {
    fn new(attempt: u64, phase: ApplyPhase, steps: &[PatternStep]) -> Self {
        Self {
            attempt,
            phase,
            apply_steps: steps.iter().map(ApplyStep::from).collect(),
            ..Self::default()
        }
    }

    pub fn is_applying(&self) -> bool {
        matches!(self.phase, ApplyPhase::Submitting | ApplyPhase::Polling)
    }

    fn begin_polling(&mut self, job_id: JobId, status: Option<JobStatus>) {
        self.phase = ApplyPhase::Polling;
        self.job_id = Some(job_id);
        self.job_status = status;
    }

    fn observe(&mut self, snapshot: &JobSnapshot) {
        let outcome = snapshot.outcome();
        self.job_status = Some(snapshot.status.clone());
        if snapshot.progress.is_some() {
            self.progress = snapshot.progress;
        }
        if snapshot.current_step.is_some() {
            self.current_step = snapshot.current_step;
        }
        self.job_error = snapshot.error_message.clone();
        refresh_step_statuses(
            &mut self.apply_steps,
            outcome,
            self.current_step,
            self.job_error.as_deref(),
        );
        self.apply_failed_index = match outcome {
            Some(JobOutcome::Failed) => self
                .apply_steps
                .iter()
                .position(|step| step.status == StepRunStatus::Error),
            _ => None,
        };
    }

    fn finish(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => self.phase = ApplyPhase::Succeeded,
            JobOutcome::Canceled => self.phase = ApplyPhase::Canceled,
            JobOutcome::Failed => {
                let message = self
                    .job_error
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| STEP_FAILURE_FALLBACK.to_string());
                self.fail(ApplyFailure::Step {
                    seq: self.current_step,
                    message,
                });
            }
        }
    }

    fn fail(&mut self, failure: ApplyFailure) {
        self.phase = ApplyPhase::Failed;
        self.apply_error = Some(failure.to_string());
        self.failure = Some(failure);
    }
}

/// Recompute per-step UI status from the latest job report.
///
/// Steps before `current_step` are done, the step at `current_step` is the one
/// that failed (if the job failed) or is still running, and a succeeded job
/// marks everything done.
pub fn refresh_step_statuses(
    steps: &mut [ApplyStep],
    outcome: Option<JobOutcome>,
    current_step: Option<u32>,
    error: Option<&str>,
) {
    let failed = outcome == Some(JobOutcome::Failed);
    for step in steps.iter_mut() {
        let (status, message) = match (outcome, current_step) {
            (Some(JobOutcome::Succeeded), _) => (StepRunStatus::Success, None),
            (_, Some(current)) if step.seq < current => (StepRunStatus::Success, None),
            (_, Some(current)) if step.seq == current && failed => (
                StepRunStatus::Error,
                Some(error.unwrap_or(STEP_FAILURE_FALLBACK).to_string()),
            ),
            _ => (StepRunStatus::Pending, None),
        };
        step.status = status;
        step.message = message;
    }
}

/// Job ids with a live poll loop. Shared between sessions that may see the same job.
#[derive(Debug, Clone, Default)]
pub struct PollRegistry {
    active: Arc<Mutex<HashSet<JobId>>>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `job_id` for one loop; `None` if a loop already owns it.
    pub fn claim(&self, job_id: &JobId) -> Option<PollClaim> {
        let mut active = self.active.lock();
        if !active.insert(job_id.clone()) {
            return None;
        }
        Some(PollClaim {
            registry: self.clone(),
            job_id: job_id.clone(),
        })
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.active.lock().contains(job_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

/// Releases the job id when the loop that holds it ends.
#[derive(Debug)]
pub struct PollClaim {
    registry: PollRegistry,
    job_id: JobId,
}

impl PollClaim {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Drop for PollClaim {
    fn drop(&mut self) {
        self.registry.active.lock().remove(&self.job_id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The attempt reached a terminal phase.
    Finished(ApplyState),
    /// Another loop is already polling this job; nothing was done.
    AlreadyPolling(JobId),
    /// The session was torn down before the attempt finished.
    TornDown,
}

impl ApplyOutcome {
    pub fn state(&self) -> Option<&ApplyState> {
        match self {
            ApplyOutcome::Finished(state) => Some(state),
            _ => None,
        }
    }
}

/// Which attempt may publish, and the latest state of every loop this session runs.
#[derive(Debug, Default)]
struct Board {
    issued: u64,
    current: u64,
    live: HashMap<JobId, ApplyState>,
}

pub struct ApplySession {
    backend: Arc<dyn PatternBackend>,
    hooks: Arc<dyn ApplyHooks>,
    config: ApplyConfig,
    polls: PollRegistry,
    state: watch::Sender<ApplyState>,
    board: Mutex<Board>,
    teardown: CancellationToken,
}

impl ApplySession {
    pub fn new(
        backend: Arc<dyn PatternBackend>,
        hooks: Arc<dyn ApplyHooks>,
        config: ApplyConfig,
    ) -> Self {
        let (state, _) = watch::channel(ApplyState::default());
        Self {
            backend,
            hooks,
            config,
            polls: PollRegistry::new(),
            state,
            board: Mutex::new(Board::default()),
            teardown: CancellationToken::new(),
        }
    }

    /// Share a poll registry with other sessions.
    pub fn with_registry(mut self, polls: PollRegistry) -> Self {
        self.polls = polls;
        self
    }

    pub fn config(&self) -> ApplyConfig {
        self.config
    }

    pub fn registry(&self) -> &PollRegistry {
        &self.polls
    }

    pub fn subscribe(&self) -> watch::Receiver<ApplyState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ApplyState {
        self.state.borrow().clone()
    }

    /// Stop all loops owned by this session. No state is published afterwards.
    pub fn teardown(&self) {
        if !self.teardown.is_cancelled() {
            tracing::debug!("tearing down apply session");
        }
        self.teardown.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.teardown.is_cancelled()
    }

    /// Run one apply attempt to completion.
    ///
    /// When the backend answers with a job that is already being polled the
    /// attempt is withdrawn: the view goes back to the loop that owns the job
    /// (or to the previous state when another session owns it).
    pub async fn apply(&self, pattern: &WorkflowPattern, target: ApplyTarget) -> ApplyOutcome {
        let token = self.teardown.child_token();
        if token.is_cancelled() {
            return ApplyOutcome::TornDown;
        }
        let (attempt, previous) = {
            let mut board = self.board.lock();
            let previous = self.state.borrow().clone();
            board.issued += 1;
            board.current = board.issued;
            (board.issued, previous)
        };
        let mut state = ApplyState::new(attempt, ApplyPhase::Submitting, &pattern.steps);
        self.publish(&state);

        tracing::info!(
            attempt,
            pattern_id = %target.pattern_id,
            sheet_id = %target.sheet_id,
            "submitting pattern apply"
        );
        let submitted = self.backend.apply_pattern(&target.request()).await;
        if token.is_cancelled() {
            return ApplyOutcome::TornDown;
        }

        let response = match submitted {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(attempt, error = %err, "pattern apply rejected");
                state.fail(ApplyFailure::submission(&err));
                self.publish(&state);
                return ApplyOutcome::Finished(state);
            }
        };

        tracing::info!(attempt, job_id = %response.job_id, status = %response.status, "pattern apply accepted");
        let job_id = response.job_id.clone();
        state.begin_polling(response.job_id, Some(response.status));
        let claim = {
            let mut board = self.board.lock();
            match self.enlist(&mut board, &state) {
                Some(claim) => claim,
                None => {
                    self.withdraw(&mut board, attempt, &job_id, previous);
                    return ApplyOutcome::AlreadyPolling(job_id);
                }
            }
        };
        self.poll_job(state, claim, pattern, &target, token).await
    }

    /// Attach to a job that is already running (e.g. the view was reopened).
    /// Nothing changes when a loop already polls `job_id`.
    pub async fn resume(
        &self,
        job_id: JobId,
        pattern: &WorkflowPattern,
        target: ApplyTarget,
    ) -> ApplyOutcome {
        let token = self.teardown.child_token();
        if token.is_cancelled() {
            return ApplyOutcome::TornDown;
        }
        let (state, claim) = {
            let mut board = self.board.lock();
            let mut state = ApplyState::new(board.issued + 1, ApplyPhase::Polling, &pattern.steps);
            state.begin_polling(job_id.clone(), None);
            let Some(claim) = self.enlist(&mut board, &state) else {
                tracing::debug!(job_id = %job_id, "job already polled; ignoring resume");
                return ApplyOutcome::AlreadyPolling(job_id);
            };
            board.issued += 1;
            board.current = board.issued;
            (state, claim)
        };
        self.poll_job(state, claim, pattern, &target, token).await
    }

    /// [`apply`](Self::apply) on a background task.
    pub fn spawn_apply(
        self: &Arc<Self>,
        pattern: WorkflowPattern,
        target: ApplyTarget,
    ) -> JoinHandle<ApplyOutcome> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.apply(&pattern, target).await })
    }

    /// Reserve the job of `state` for a new loop of this session.
    fn enlist(&self, board: &mut Board, state: &ApplyState) -> Option<PollClaim> {
        let job_id = state.job_id.as_ref()?;
        if board.live.contains_key(job_id) {
            return None;
        }
        let claim = self.polls.claim(job_id)?;
        board.live.insert(job_id.clone(), state.clone());
        Some(claim)
    }

    /// Undo `attempt` after its job turned out to be polled already.
    fn withdraw(&self, board: &mut Board, attempt: u64, job_id: &JobId, previous: ApplyState) {
        if board.current != attempt {
            return;
        }
        let restored = match board.live.get(job_id) {
            Some(owner) => {
                tracing::debug!(attempt, job_id = %job_id, owner = owner.attempt, "job already polled by this session");
                owner.clone()
            }
            None => {
                tracing::debug!(attempt, job_id = %job_id, "job already polled by another session");
                previous
                    .job_id
                    .as_ref()
                    .and_then(|id| board.live.get(id))
                    .filter(|latest| latest.attempt == previous.attempt)
                    .cloned()
                    .unwrap_or(previous)
            }
        };
        board.current = restored.attempt;
        if !self.teardown.is_cancelled() {
            self.state.send_replace(restored);
        }
    }

    async fn poll_job(
        &self,
        mut state: ApplyState,
        claim: PollClaim,
        pattern: &WorkflowPattern,
        target: &ApplyTarget,
        token: CancellationToken,
    ) -> ApplyOutcome {
        let job_id = claim.job_id().clone();
        let attempt = state.attempt;
        self.report(&state);

        let mut queued_since = state
            .job_status
            .as_ref()
            .filter(|status| status.is_queued())
            .map(|_| Instant::now());

        loop {
            let polled = self.backend.job_status(&job_id).await;
            if token.is_cancelled() {
                tracing::debug!(attempt, job_id = %job_id, "dropping poll result after teardown");
                self.abandon(claim);
                return ApplyOutcome::TornDown;
            }

            let snapshot = match polled {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!(attempt, job_id = %job_id, error = %err, "job status poll failed");
                    state.fail(ApplyFailure::Poll {
                        job_id: job_id.clone(),
                        message: err.user_message().to_string(),
                    });
                    self.settle(&state, claim);
                    return ApplyOutcome::Finished(state);
                }
            };

            state.observe(&snapshot);
            tracing::trace!(
                attempt,
                job_id = %job_id,
                status = %snapshot.status,
                current_step = ?snapshot.current_step,
                "polled job"
            );

            if let Some(outcome) = snapshot.outcome() {
                state.finish(outcome);
                tracing::info!(attempt, job_id = %job_id, phase = ?state.phase, "pattern apply finished");
                let current = self.settle(&state, claim);
                if outcome == JobOutcome::Succeeded && current {
                    self.hooks.refresh_grid(target);
                    self.hooks
                        .reapply_highlights(target, &pattern.highlight_steps());
                }
                return ApplyOutcome::Finished(state);
            }

            if snapshot.status.is_queued() {
                let waited = queued_since.get_or_insert_with(Instant::now).elapsed();
                if waited > self.config.stale_after {
                    tracing::warn!(attempt, job_id = %job_id, waited = ?waited, "job stuck in queue");
                    state.fail(ApplyFailure::Stale {
                        job_id: job_id.clone(),
                        waited_secs: waited.as_secs(),
                    });
                    self.settle(&state, claim);
                    return ApplyOutcome::Finished(state);
                }
            } else {
                queued_since = None;
            }

            self.report(&state);

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(attempt, job_id = %job_id, "poll loop cancelled");
                    self.abandon(claim);
                    return ApplyOutcome::TornDown;
                }
                _ = time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    fn is_current(&self, board: &Board, attempt: u64) -> bool {
        !self.teardown.is_cancelled() && board.current == attempt
    }

    /// Publish a state that is not tied to a running loop.
    fn publish(&self, state: &ApplyState) {
        let board = self.board.lock();
        self.send_if_current(&board, state);
    }

    /// Record the latest state of a running loop and publish it if current.
    fn report(&self, state: &ApplyState) {
        let mut board = self.board.lock();
        if let Some(job_id) = state.job_id.as_ref() {
            board.live.insert(job_id.clone(), state.clone());
        }
        self.send_if_current(&board, state);
    }

    /// Final state of a loop. The job is released in the same critical section,
    /// so a concurrent `withdraw` either sees the loop alive or not at all.
    fn settle(&self, state: &ApplyState, claim: PollClaim) -> bool {
        let mut board = self.board.lock();
        board.live.remove(claim.job_id());
        let current = self.send_if_current(&board, state);
        drop(claim);
        current
    }

    fn abandon(&self, claim: PollClaim) {
        let mut board = self.board.lock();
        board.live.remove(claim.job_id());
        drop(claim);
    }

    fn send_if_current(&self, board: &Board, state: &ApplyState) -> bool {
        if !self.is_current(board, state.attempt) {
            tracing::trace!(attempt = state.attempt, "suppressing state of superseded attempt");
            return false;
        }
        self.state.send_replace(state.clone());
        true
    }
}

impl Drop for ApplySession {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}

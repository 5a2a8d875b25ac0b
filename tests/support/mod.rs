#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use sheet_patterns::apply::{ApplyHooks, ApplyTarget};
use sheet_patterns::backend::{
    ApplyPatternRequest, ApplyPatternResponse, CreatePatternRequest, JobSnapshot, JobStatus,
    PatternBackend, PatternStep, WorkflowPattern,
};
use sheet_patterns::errors::ApiError;
use sheet_patterns::model::{JobId, PatternId, SheetId, SpreadsheetId, StepId, StepType};
use sheet_patterns::timeline::StepIdGenerator;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend whose answers are queued up front. The last answer queued for a
/// job is repeated for every later poll.
#[derive(Default)]
pub struct ScriptedBackend {
    applies: Mutex<VecDeque<Result<ApplyPatternResponse, ApiError>>>,
    jobs: Mutex<HashMap<JobId, VecDeque<Result<JobSnapshot, ApiError>>>>,
    polls: Mutex<Vec<JobId>>,
    created: Mutex<Vec<CreatePatternRequest>>,
    patterns: Mutex<Vec<WorkflowPattern>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(self, job_id: &str, status: JobStatus) -> Self {
        self.applies.lock().push_back(Ok(ApplyPatternResponse {
            job_id: JobId::from(job_id),
            status,
        }));
        self
    }

    pub fn reject(self, err: ApiError) -> Self {
        self.applies.lock().push_back(Err(err));
        self
    }

    pub fn job(self, job_id: &str, snapshots: Vec<JobSnapshot>) -> Self {
        self.jobs
            .lock()
            .insert(JobId::from(job_id), snapshots.into_iter().map(Ok).collect());
        self
    }

    pub fn job_error(self, job_id: &str, err: ApiError) -> Self {
        self.jobs
            .lock()
            .entry(JobId::from(job_id))
            .or_default()
            .push_back(Err(err));
        self
    }

    pub fn with_pattern(self, pattern: WorkflowPattern) -> Self {
        self.patterns.lock().push(pattern);
        self
    }

    pub fn polls(&self) -> Vec<JobId> {
        self.polls.lock().clone()
    }

    pub fn poll_count(&self, job_id: &str) -> usize {
        self.polls
            .lock()
            .iter()
            .filter(|id| id.as_str() == job_id)
            .count()
    }

    pub fn created(&self) -> Vec<CreatePatternRequest> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl PatternBackend for ScriptedBackend {
    async fn create_pattern(
        &self,
        request: &CreatePatternRequest,
    ) -> Result<WorkflowPattern, ApiError> {
        self.created.lock().push(request.clone());
        Ok(WorkflowPattern {
            id: PatternId::from("p-created"),
            name: request.name.clone(),
            description: request.description.clone(),
            spreadsheet_id: request.spreadsheet_id.clone(),
            sheet_id: request.sheet_id.clone(),
            steps: Vec::new(),
        })
    }

    async fn list_patterns(
        &self,
        spreadsheet_id: &SpreadsheetId,
    ) -> Result<Vec<WorkflowPattern>, ApiError> {
        Ok(self
            .patterns
            .lock()
            .iter()
            .filter(|p| &p.spreadsheet_id == spreadsheet_id)
            .cloned()
            .collect())
    }

    async fn get_pattern(&self, pattern_id: &PatternId) -> Result<WorkflowPattern, ApiError> {
        self.patterns
            .lock()
            .iter()
            .find(|p| &p.id == pattern_id)
            .cloned()
            .ok_or_else(|| ApiError::Http {
                status: 404,
                message: format!("pattern {pattern_id} not found"),
            })
    }

    async fn apply_pattern(
        &self,
        _request: &ApplyPatternRequest,
    ) -> Result<ApplyPatternResponse, ApiError> {
        self.applies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("no scripted apply response".into())))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, ApiError> {
        self.polls.lock().push(job_id.clone());
        let mut jobs = self.jobs.lock();
        let next = jobs.get_mut(job_id).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        next.unwrap_or_else(|| {
            Err(ApiError::Http {
                status: 404,
                message: format!("job {job_id} not found"),
            })
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    refreshes: AtomicUsize,
    highlights: Mutex<Vec<Vec<PatternStep>>>,
}

impl RecordingHooks {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn highlight_calls(&self) -> Vec<Vec<PatternStep>> {
        self.highlights.lock().clone()
    }
}

impl ApplyHooks for RecordingHooks {
    fn refresh_grid(&self, _target: &ApplyTarget) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn reapply_highlights(&self, _target: &ApplyTarget, steps: &[PatternStep]) {
        self.highlights.lock().push(steps.to_vec());
    }
}

/// Step ids `s1`, `s2`, ... in call order.
#[derive(Default)]
pub struct SeqIds {
    next: u32,
}

impl StepIdGenerator for SeqIds {
    fn next_id(&mut self) -> StepId {
        self.next += 1;
        StepId(format!("s{}", self.next))
    }
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + ms)
        .single()
        .expect("valid timestamp")
}

pub fn running_at(step: u32) -> JobSnapshot {
    JobSnapshot {
        current_step: Some(step),
        ..JobSnapshot::new(JobStatus::Running)
    }
}

pub fn failed_at(step: u32, message: &str) -> JobSnapshot {
    JobSnapshot {
        current_step: Some(step),
        error_message: Some(message.to_string()),
        ..JobSnapshot::new(JobStatus::Failed)
    }
}

pub fn pattern_step(seq: u32, step_type: StepType) -> PatternStep {
    let params = match step_type {
        StepType::ApplyHighlight => json!({ "range": "A1:A4", "background": "#fff2cc" }),
        StepType::ApplyFormula => json!({
            "target": { "row": seq, "col": 1 },
            "a1": format!("A{seq}"),
            "formula": "=1+1",
        }),
        _ => json!({ "position": seq, "count": 1 }),
    };
    PatternStep {
        seq,
        step_type,
        disabled: false,
        params,
    }
}

pub fn pattern(steps: Vec<PatternStep>) -> WorkflowPattern {
    WorkflowPattern {
        id: PatternId::from("p-1"),
        name: "Monthly cleanup".to_string(),
        description: None,
        spreadsheet_id: SpreadsheetId::from("book-1"),
        sheet_id: SheetId::from("sheet-1"),
        steps,
    }
}

pub fn three_step_pattern() -> WorkflowPattern {
    pattern(vec![
        pattern_step(1, StepType::ApplyFormula),
        pattern_step(2, StepType::InsertColumn),
        pattern_step(3, StepType::ApplyHighlight),
    ])
}

pub fn target() -> ApplyTarget {
    ApplyTarget {
        pattern_id: PatternId::from("p-1"),
        spreadsheet_id: SpreadsheetId::from("book-1"),
        sheet_id: SheetId::from("sheet-2"),
    }
}

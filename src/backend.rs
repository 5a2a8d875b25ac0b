//! Wire contract with the pattern service: persisted patterns, apply jobs and
//! the trait every backend implementation provides.

use crate::errors::ApiError;
use crate::model::{
    FillSeriesParams, HighlightParams, JobId, PatternId, SetColumnNameParams, SheetId,
    SpreadsheetId, StepType, StructuralParams,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A step as persisted by the backend inside a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStep {
    pub seq: u32,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl PatternStep {
    pub fn is_highlight(&self) -> bool {
        self.step_type == StepType::ApplyHighlight
    }

    /// Typed highlight parameters, when this is a well-formed highlight step.
    pub fn highlight(&self) -> Option<HighlightParams> {
        if !self.is_highlight() {
            return None;
        }
        serde_json::from_value(self.params.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPattern {
    pub id: PatternId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub spreadsheet_id: SpreadsheetId,
    pub sheet_id: SheetId,
    #[serde(default)]
    pub steps: Vec<PatternStep>,
}

impl WorkflowPattern {
    /// Enabled highlight steps; these are visual-only and re-applied client side.
    pub fn highlight_steps(&self) -> Vec<PatternStep> {
        self.steps
            .iter()
            .filter(|step| step.is_highlight() && !step.disabled)
            .cloned()
            .collect()
    }
}

/// Cell target of a formula step in the create payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellTarget {
    pub row: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormulaStepParams {
    pub target: CellTarget,
    pub a1: String,
    pub formula: String,
}

/// Parameters of a step in the create-pattern payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CreateStepParams {
    Formula(FormulaStepParams),
    Structural(StructuralParams),
    FillSeries(FillSeriesParams),
    ColumnName(SetColumnNameParams),
    Highlight(HighlightParams),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateStep {
    pub seq: u32,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub disabled: bool,
    pub params: CreateStepParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePatternRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub spreadsheet_id: SpreadsheetId,
    pub sheet_id: SheetId,
    pub steps: Vec<CreateStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPatternRequest {
    pub pattern_id: PatternId,
    pub spreadsheet_id: SpreadsheetId,
    pub sheet_id: SheetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPatternResponse {
    pub job_id: JobId,
    #[serde(default = "JobStatus::queued")]
    pub status: JobStatus,
}

/// Job status string. Unknown values are kept and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl JobStatus {
    fn queued() -> Self {
        JobStatus::Queued
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Other(raw) => raw,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, JobStatus::Queued)
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            "canceled" | "cancelled" => JobStatus::Canceled,
            _ => JobStatus::Other(raw),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a finished job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Canceled,
}

/// One job-status poll result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, alias = "finishedAt")]
    pub finished_at: Option<String>,
}

impl JobSnapshot {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            current_step: None,
            error_message: None,
            finished_at: None,
        }
    }

    /// `None` while the job is still in flight. A finish timestamp makes any
    /// status terminal; without a recognised terminal status the presence of an
    /// error message decides between failure and success.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.status {
            JobStatus::Succeeded => Some(JobOutcome::Succeeded),
            JobStatus::Failed => Some(JobOutcome::Failed),
            JobStatus::Canceled => Some(JobOutcome::Canceled),
            _ if self.finished_at.is_some() => {
                if self.error_message.is_some() {
                    Some(JobOutcome::Failed)
                } else {
                    Some(JobOutcome::Succeeded)
                }
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }
}

/// The pattern service as seen by this crate.
#[async_trait]
pub trait PatternBackend: Send + Sync {
    async fn create_pattern(&self, request: &CreatePatternRequest)
    -> Result<WorkflowPattern, ApiError>;
    async fn list_patterns(
        &self,
        spreadsheet_id: &SpreadsheetId,
    ) -> Result<Vec<WorkflowPattern>, ApiError>;
    async fn get_pattern(&self, pattern_id: &PatternId) -> Result<WorkflowPattern, ApiError>;
    async fn apply_pattern(
        &self,
        request: &ApplyPatternRequest,
    ) -> Result<ApplyPatternResponse, ApiError>;
    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, ApiError>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_is_an_open_enum() {
        let parsed: JobStatus = serde_json::from_str("\"SUCCEEDED\"").unwrap();
        assert_eq!(parsed, JobStatus::Succeeded);
        let parsed: JobStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, JobStatus::Canceled);
        let parsed: JobStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(parsed, JobStatus::Other("paused".into()));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), "paused");
        assert_eq!(JobSnapshot::new(parsed).outcome(), None);
    }

    #[test]
    fn finish_timestamp_is_terminal() {
        let snapshot: JobSnapshot = serde_json::from_value(serde_json::json!({
            "status": "running",
            "finishedAt": "2026-03-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(snapshot.outcome(), Some(JobOutcome::Succeeded));

        let snapshot: JobSnapshot = serde_json::from_value(serde_json::json!({
            "status": "running",
            "finished_at": "2026-03-01T10:00:00Z",
            "error_message": "worker crashed",
        }))
        .unwrap();
        assert_eq!(snapshot.outcome(), Some(JobOutcome::Failed));
    }

    #[test]
    fn apply_response_defaults_to_queued() {
        let response: ApplyPatternResponse =
            serde_json::from_value(serde_json::json!({ "job_id": 991 })).unwrap();
        assert_eq!(response.job_id, JobId::from("991"));
        assert_eq!(response.status, JobStatus::Queued);
    }

    #[test]
    fn highlight_params_decode_from_persisted_step() {
        let step: PatternStep = serde_json::from_value(serde_json::json!({
            "seq": 3,
            "type": "APPLY_HIGHLIGHT",
            "params": { "range": "A2:D2", "background": "#fff2cc" },
        }))
        .unwrap();
        let params = step.highlight().expect("highlight params");
        assert_eq!(params.range, "A2:D2");
        assert!(!step.disabled);
    }
}

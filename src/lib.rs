//! Recording spreadsheet edits as replayable patterns.
//!
//! [`timeline`] turns grid edits into an ordered list of [`TimelineStep`]s
//! (collapsing keystroke-level header renames), [`backend`] describes the
//! pattern service, and [`apply`] drives a saved pattern through a backend job
//! until it finishes.

pub mod apply;
pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod http;
pub mod model;
pub mod timeline;

pub use apply::{
    ApplyConfig, ApplyFailure, ApplyHooks, ApplyOutcome, ApplyPhase, ApplySession, ApplyState,
    ApplyStep, ApplyTarget, NoopHooks, PollRegistry, StepRunStatus,
};
pub use backend::{
    ApplyPatternRequest, ApplyPatternResponse, CreatePatternRequest, CreateStep, JobOutcome,
    JobSnapshot, JobStatus, PatternBackend, PatternStep, WorkflowPattern,
};
pub use config::{CliArgs, PatternConfig};
pub use errors::ApiError;
pub use http::HttpPatternBackend;
pub use model::{
    JobId, PatternId, SheetId, SpreadsheetId, StepId, StepKind, StepType, TimelineStep,
};
pub use timeline::{RecorderConfig, SheetRecorder};

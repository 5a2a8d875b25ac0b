//! Header-rename recording with burst deduplication.
//!
//! Typing a header name fires one rename notification per keystroke. Consecutive
//! notifications for the same column that arrive within the merge window collapse
//! into the step recorded for the first one; a different column, a pause longer
//! than the window, or a deleted merge target starts a new step.

use crate::model::{SetColumnNameParams, StepId, StepKind, TimelineStep};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of fresh step ids.
pub trait StepIdGenerator {
    fn next_id(&mut self) -> StepId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidStepIds;

impl StepIdGenerator for UuidStepIds {
    fn next_id(&mut self) -> StepId {
        StepId(uuid::Uuid::new_v4().to_string())
    }
}

/// A header cell rename as reported by the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameObservation {
    pub column_index: u32,
    pub new_name: String,
    pub old_name: String,
    pub header_row_index: u32,
}

/// Per-sheet memory of the last rename that was recorded or merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameDedupState {
    pub last_column_index: Option<u32>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub last_step_id: Option<StepId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameAction {
    Appended(StepId),
    Merged(StepId),
}

impl RenameAction {
    pub fn step_id(&self) -> &StepId {
        match self {
            RenameAction::Appended(id) | RenameAction::Merged(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenameRecord {
    pub steps: Vec<TimelineStep>,
    pub state: RenameDedupState,
    pub action: RenameAction,
}

/// Record one header rename against `steps`, merging into the previous rename
/// step when the observation continues the same editing burst.
///
/// Callers are expected to pass only observations on the header row.
pub fn record_rename_column_step<G>(
    steps: &[TimelineStep],
    observation: &RenameObservation,
    state: &RenameDedupState,
    ids: &mut G,
    now: DateTime<Utc>,
    window: Duration,
) -> RenameRecord
where
    G: StepIdGenerator + ?Sized,
{
    let same_column = state.last_column_index == Some(observation.column_index);
    let within_window = state
        .last_timestamp
        .is_some_and(|last| elapsed_ms(last, now) <= window_ms(window));
    let merge_at = if same_column && within_window {
        state
            .last_step_id
            .as_ref()
            .and_then(|id| merge_target(steps, id))
    } else {
        None
    };

    let (next, action) = match merge_at {
        Some(index) => {
            let mut next = steps.to_vec();
            let step = &mut next[index];
            if let StepKind::SetColumnName(params) = &mut step.kind {
                params.new_name = observation.new_name.clone();
            }
            tracing::trace!(
                step_id = %step.id,
                column = observation.column_index,
                "merged header rename into previous step"
            );
            let id = step.id.clone();
            (next, RenameAction::Merged(id))
        }
        None => {
            let id = ids.next_id();
            let mut next = Vec::with_capacity(steps.len() + 1);
            next.extend_from_slice(steps);
            next.push(TimelineStep::new(
                id.clone(),
                StepKind::SetColumnName(SetColumnNameParams {
                    column_index: observation.column_index,
                    new_name: observation.new_name.clone(),
                    old_name: Some(observation.old_name.clone()),
                }),
                now,
            ));
            tracing::debug!(
                step_id = %id,
                column = observation.column_index,
                "recorded header rename step"
            );
            (next, RenameAction::Appended(id))
        }
    };

    RenameRecord {
        steps: next,
        state: RenameDedupState {
            last_column_index: Some(observation.column_index),
            last_timestamp: Some(now),
            last_step_id: Some(action.step_id().clone()),
        },
        action,
    }
}

/// Index of the step that may absorb the rename, if it is still on the timeline.
fn merge_target(steps: &[TimelineStep], id: &StepId) -> Option<usize> {
    steps
        .iter()
        .position(|step| &step.id == id && matches!(step.kind, StepKind::SetColumnName(_)))
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    to.signed_duration_since(from).num_milliseconds()
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

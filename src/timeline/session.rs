//! Per-sheet recording session: one timeline and one rename-dedup state per
//! sheet, owned here and handed to the pure recorder/mutator functions.

use super::mutators::{
    StepPatch, delete_timeline_item_by_id, select_steps, timeline_items_to_create_steps,
    update_timeline_item_by_id,
};
use super::recorder::{
    RenameAction, RenameDedupState, RenameObservation, StepIdGenerator, UuidStepIds,
    record_rename_column_step,
};
use crate::backend::CreatePatternRequest;
use crate::model::{SheetId, SpreadsheetId, StepId, StepKind, TimelineStep};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_MERGE_WINDOW_MS: u64 = 800;
pub const DEFAULT_HEADER_ROW_INDEX: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    pub merge_window: Duration,
    /// Row whose cells are the column headers; renames elsewhere are ignored.
    pub header_row_index: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            merge_window: Duration::from_millis(DEFAULT_MERGE_WINDOW_MS),
            header_row_index: DEFAULT_HEADER_ROW_INDEX,
        }
    }
}

pub struct SheetRecorder {
    config: RecorderConfig,
    active: Option<SheetId>,
    timelines: HashMap<SheetId, Vec<TimelineStep>>,
    dedup: HashMap<SheetId, RenameDedupState>,
    ids: Box<dyn StepIdGenerator + Send>,
}

impl SheetRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_id_generator(config, Box::new(UuidStepIds))
    }

    pub fn with_id_generator(config: RecorderConfig, ids: Box<dyn StepIdGenerator + Send>) -> Self {
        Self {
            config,
            active: None,
            timelines: HashMap::new(),
            dedup: HashMap::new(),
            ids,
        }
    }

    pub fn config(&self) -> RecorderConfig {
        self.config
    }

    /// Make `sheet` the target of subsequent recording; its timeline is kept
    /// (or started empty) and the previous sheet's timeline is left untouched.
    pub fn switch_sheet(&mut self, sheet: SheetId) {
        tracing::debug!(sheet = %sheet, "switching recorder sheet");
        self.timelines.entry(sheet.clone()).or_default();
        self.active = Some(sheet);
    }

    pub fn active_sheet(&self) -> Option<&SheetId> {
        self.active.as_ref()
    }

    /// Timeline of the active sheet (empty when no sheet is active).
    pub fn timeline(&self) -> &[TimelineStep] {
        self.active
            .as_ref()
            .and_then(|sheet| self.timelines.get(sheet))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn timeline_for(&self, sheet: &SheetId) -> &[TimelineStep] {
        self.timelines.get(sheet).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append a step to the active sheet. Returns the new step id.
    pub fn record_step(&mut self, kind: StepKind, now: DateTime<Utc>) -> Option<StepId> {
        let sheet = self.active.clone()?;
        let id = self.ids.next_id();
        tracing::debug!(sheet = %sheet, step_id = %id, step_type = %kind.step_type(), "recorded step");
        self.timelines
            .entry(sheet)
            .or_default()
            .push(TimelineStep::new(id.clone(), kind, now));
        Some(id)
    }

    /// Record a committed formula at a 1-based cell.
    pub fn record_formula_commit(
        &mut self,
        row: u32,
        col: u32,
        formula: &str,
        now: DateTime<Utc>,
    ) -> Option<StepId> {
        self.record_step(StepKind::formula(row, col, formula), now)
    }

    /// Feed a header rename through the deduplicator. Observations on rows
    /// other than the configured header row are ignored.
    pub fn observe_header_rename(
        &mut self,
        observation: &RenameObservation,
        now: DateTime<Utc>,
    ) -> Option<RenameAction> {
        if observation.header_row_index != self.config.header_row_index {
            tracing::trace!(
                row = observation.header_row_index,
                "ignoring rename outside the header row"
            );
            return None;
        }
        let sheet = self.active.clone()?;
        let steps = self.timelines.entry(sheet.clone()).or_default();
        let state = self.dedup.entry(sheet).or_default();
        let record = record_rename_column_step(
            steps.as_slice(),
            observation,
            &*state,
            self.ids.as_mut(),
            now,
            self.config.merge_window,
        );
        *steps = record.steps;
        *state = record.state;
        Some(record.action)
    }

    /// Patch a step on the active sheet. Unknown ids are ignored.
    pub fn update_step(&mut self, id: &StepId, patch: &StepPatch) -> bool {
        self.replace_active(|steps| update_timeline_item_by_id(steps, id, patch))
    }

    /// Remove a step from the active sheet. Unknown ids are ignored.
    pub fn delete_step(&mut self, id: &StepId) -> bool {
        self.replace_active(|steps| delete_timeline_item_by_id(steps, id))
    }

    /// Payload that saves the selected steps of the active sheet as a pattern.
    pub fn pattern_request(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        spreadsheet_id: SpreadsheetId,
        selected: &[StepId],
    ) -> Option<CreatePatternRequest> {
        let sheet_id = self.active.clone()?;
        let chosen = select_steps(self.timeline(), selected);
        Some(CreatePatternRequest {
            name: name.into(),
            description,
            spreadsheet_id,
            sheet_id,
            steps: timeline_items_to_create_steps(&chosen),
        })
    }

    fn replace_active<F>(&mut self, mutate: F) -> bool
    where
        F: for<'a> FnOnce(&'a [TimelineStep]) -> Cow<'a, [TimelineStep]>,
    {
        let Some(steps) = self
            .active
            .as_ref()
            .and_then(|sheet| self.timelines.get_mut(sheet))
        else {
            return false;
        };
        let next = match mutate(steps.as_slice()) {
            Cow::Borrowed(_) => return false,
            Cow::Owned(next) => next,
        };
        *steps = next;
        true
    }
}

use crate::backend::{CellTarget, CreateStep, CreateStepParams, FormulaStepParams};
use crate::model::{StepId, StepKind, TimelineStep};
use std::borrow::Cow;
use std::collections::HashSet;

/// Fields of a step that may be replaced in place. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPatch {
    pub disabled: Option<bool>,
    pub kind: Option<StepKind>,
}

impl StepPatch {
    pub fn disabled(disabled: bool) -> Self {
        Self {
            disabled: Some(disabled),
            kind: None,
        }
    }

    pub fn kind(kind: StepKind) -> Self {
        Self {
            disabled: None,
            kind: Some(kind),
        }
    }
}

/// Copy of `steps` with the matching step patched; borrows the input when `id` is unknown.
pub fn update_timeline_item_by_id<'a>(
    steps: &'a [TimelineStep],
    id: &StepId,
    patch: &StepPatch,
) -> Cow<'a, [TimelineStep]> {
    let Some(index) = steps.iter().position(|step| &step.id == id) else {
        return Cow::Borrowed(steps);
    };
    let mut next = steps.to_vec();
    let step = &mut next[index];
    if let Some(disabled) = patch.disabled {
        step.disabled = disabled;
    }
    if let Some(kind) = patch.kind.as_ref() {
        step.kind = kind.clone();
    }
    Cow::Owned(next)
}

/// Copy of `steps` without the matching step; borrows the input when `id` is unknown.
pub fn delete_timeline_item_by_id<'a>(
    steps: &'a [TimelineStep],
    id: &StepId,
) -> Cow<'a, [TimelineStep]> {
    if !steps.iter().any(|step| &step.id == id) {
        return Cow::Borrowed(steps);
    }
    Cow::Owned(
        steps
            .iter()
            .filter(|step| &step.id != id)
            .cloned()
            .collect(),
    )
}

/// Steps in replay order. The timeline is single-level today, so this is the
/// identity; grouped items would be expanded here.
pub fn flatten_timeline_items(steps: &[TimelineStep]) -> Vec<&TimelineStep> {
    steps.iter().collect()
}

/// Subset of `steps` whose ids are in `selected`, in timeline order.
pub fn select_steps(steps: &[TimelineStep], selected: &[StepId]) -> Vec<TimelineStep> {
    let wanted: HashSet<&StepId> = selected.iter().collect();
    flatten_timeline_items(steps)
        .into_iter()
        .filter(|step| wanted.contains(&step.id))
        .cloned()
        .collect()
}

/// Create-pattern payload for exactly the steps given; `seq` runs 1..=N in input order.
pub fn timeline_items_to_create_steps(steps: &[TimelineStep]) -> Vec<CreateStep> {
    steps
        .iter()
        .zip(1u32..)
        .map(|(step, seq)| CreateStep {
            seq,
            step_type: step.step_type(),
            disabled: step.disabled,
            params: create_params(&step.kind),
        })
        .collect()
}

fn create_params(kind: &StepKind) -> CreateStepParams {
    match kind {
        StepKind::ApplyFormula(params) => CreateStepParams::Formula(FormulaStepParams {
            target: CellTarget {
                row: params.row,
                col: params.col,
            },
            a1: params.a1.clone(),
            formula: params.formula.clone(),
        }),
        StepKind::InsertRow(params)
        | StepKind::InsertColumn(params)
        | StepKind::DeleteColumn(params) => CreateStepParams::Structural(params.clone()),
        StepKind::FillSeries(params) => CreateStepParams::FillSeries(params.clone()),
        StepKind::SetColumnName(params) => CreateStepParams::ColumnName(params.clone()),
        StepKind::ApplyHighlight(params) => CreateStepParams::Highlight(params.clone()),
    }
}

use sheet_patterns::model::{SetColumnNameParams, SheetId, StepId, StepKind};
use sheet_patterns::timeline::{
    RecorderConfig, RenameAction, RenameDedupState, RenameObservation, SheetRecorder,
    delete_timeline_item_by_id, record_rename_column_step,
};
use std::time::Duration;

mod support;

use support::{SeqIds, at_ms};

const WINDOW: Duration = Duration::from_millis(800);

fn rename(column_index: u32, old_name: &str, new_name: &str) -> RenameObservation {
    RenameObservation {
        column_index,
        new_name: new_name.to_string(),
        old_name: old_name.to_string(),
        header_row_index: 0,
    }
}

fn column_name(kind: &StepKind) -> &SetColumnNameParams {
    match kind {
        StepKind::SetColumnName(params) => params,
        other => panic!("expected a column rename, got {other:?}"),
    }
}

fn recorder() -> SheetRecorder {
    let mut recorder =
        SheetRecorder::with_id_generator(RecorderConfig::default(), Box::new(SeqIds::default()));
    recorder.switch_sheet(SheetId::from("sheet-1"));
    recorder
}

#[test]
fn rename_within_window_merges_into_previous_step() {
    let mut ids = SeqIds::default();
    let first = record_rename_column_step(
        &[],
        &rename(2, "Amount", "Revenue"),
        &RenameDedupState::default(),
        &mut ids,
        at_ms(1_000),
        WINDOW,
    );
    assert_eq!(first.action, RenameAction::Appended(StepId::from("s1")));

    let second = record_rename_column_step(
        &first.steps,
        &rename(2, "Revenue", "Revenue (USD)"),
        &first.state,
        &mut ids,
        at_ms(1_300),
        WINDOW,
    );

    assert_eq!(second.action, RenameAction::Merged(StepId::from("s1")));
    assert_eq!(second.steps.len(), 1);
    let params = column_name(&second.steps[0].kind);
    assert_eq!(params.column_index, 2);
    assert_eq!(params.new_name, "Revenue (USD)");
    assert_eq!(params.old_name.as_deref(), Some("Amount"));
    assert_eq!(second.steps[0].created_at, at_ms(1_000));
    assert_eq!(second.state.last_timestamp, Some(at_ms(1_300)));
    assert_eq!(second.state.last_step_id, Some(StepId::from("s1")));
}

#[test]
fn keystroke_burst_collapses_to_one_step() {
    let mut recorder = recorder();
    let typed = ["R", "Re", "Rev", "Reve", "Reven", "Revenu", "Revenue"];
    let mut previous = "Amount".to_string();
    for (i, name) in typed.iter().enumerate() {
        recorder.observe_header_rename(&rename(4, &previous, name), at_ms(i as i64 * 150));
        previous = name.to_string();
    }

    let timeline = recorder.timeline();
    assert_eq!(timeline.len(), 1);
    let params = column_name(&timeline[0].kind);
    assert_eq!(params.new_name, "Revenue");
    assert_eq!(params.old_name.as_deref(), Some("Amount"));
    assert_eq!(timeline[0].id, StepId::from("s1"));
}

#[test]
fn pause_longer_than_window_starts_new_step() {
    let mut recorder = recorder();
    recorder.observe_header_rename(&rename(1, "a", "Region"), at_ms(0));
    let action = recorder
        .observe_header_rename(&rename(1, "Region", "Sales region"), at_ms(801))
        .expect("sheet is active");

    assert_eq!(action, RenameAction::Appended(StepId::from("s2")));
    let timeline = recorder.timeline();
    assert_eq!(timeline.len(), 2);
    assert_eq!(
        column_name(&timeline[1].kind).old_name.as_deref(),
        Some("Region")
    );
}

#[test]
fn rename_exactly_at_window_edge_still_merges() {
    let mut recorder = recorder();
    recorder.observe_header_rename(&rename(1, "a", "Region"), at_ms(0));
    let action = recorder.observe_header_rename(&rename(1, "Region", "Regions"), at_ms(800));
    assert_eq!(action, Some(RenameAction::Merged(StepId::from("s1"))));
}

#[test]
fn different_columns_get_their_own_steps() {
    let mut recorder = recorder();
    recorder.observe_header_rename(&rename(1, "a", "Region"), at_ms(0));
    recorder.observe_header_rename(&rename(2, "b", "Quarter"), at_ms(100));
    recorder.observe_header_rename(&rename(1, "Region", "Territory"), at_ms(200));

    let names: Vec<_> = recorder
        .timeline()
        .iter()
        .map(|step| column_name(&step.kind).new_name.clone())
        .collect();
    assert_eq!(names, vec!["Region", "Quarter", "Territory"]);
}

#[test]
fn deleted_merge_target_is_not_resurrected() {
    let mut ids = SeqIds::default();
    let first = record_rename_column_step(
        &[],
        &rename(3, "old", "Cost"),
        &RenameDedupState::default(),
        &mut ids,
        at_ms(0),
        WINDOW,
    );
    let after_delete = delete_timeline_item_by_id(&first.steps, &StepId::from("s1"));
    assert!(after_delete.is_empty());

    let second = record_rename_column_step(
        &after_delete,
        &rename(3, "Cost", "Costs"),
        &first.state,
        &mut ids,
        at_ms(200),
        WINDOW,
    );

    assert_eq!(second.action, RenameAction::Appended(StepId::from("s2")));
    assert_eq!(second.steps.len(), 1);
    assert_eq!(column_name(&second.steps[0].kind).new_name, "Costs");
}

#[test]
fn renames_outside_header_row_are_ignored() {
    let mut recorder = recorder();
    let mut observation = rename(1, "a", "Region");
    observation.header_row_index = 3;
    assert_eq!(recorder.observe_header_rename(&observation, at_ms(0)), None);
    assert!(recorder.timeline().is_empty());
}

#[test]
fn header_row_is_configurable() {
    let config = RecorderConfig {
        header_row_index: 2,
        ..RecorderConfig::default()
    };
    let mut recorder = SheetRecorder::with_id_generator(config, Box::new(SeqIds::default()));
    recorder.switch_sheet(SheetId::from("sheet-1"));

    let mut observation = rename(1, "a", "Region");
    observation.header_row_index = 2;
    assert!(recorder.observe_header_rename(&observation, at_ms(0)).is_some());
    assert!(
        recorder
            .observe_header_rename(&rename(1, "Region", "Area"), at_ms(10))
            .is_none()
    );
    assert_eq!(recorder.timeline().len(), 1);
}

#[test]
fn nothing_is_recorded_without_an_active_sheet() {
    let mut recorder =
        SheetRecorder::with_id_generator(RecorderConfig::default(), Box::new(SeqIds::default()));
    assert!(recorder.record_formula_commit(1, 1, "=1", at_ms(0)).is_none());
    assert!(
        recorder
            .observe_header_rename(&rename(1, "a", "b"), at_ms(0))
            .is_none()
    );
    assert!(recorder.timeline().is_empty());
}

#[test]
fn switching_sheets_keeps_separate_timelines_and_dedup_state() {
    let mut recorder = recorder();
    recorder.observe_header_rename(&rename(1, "a", "Region"), at_ms(0));

    recorder.switch_sheet(SheetId::from("sheet-2"));
    assert!(recorder.timeline().is_empty());
    let action = recorder.observe_header_rename(&rename(1, "x", "Owner"), at_ms(100));
    assert_eq!(action, Some(RenameAction::Appended(StepId::from("s2"))));

    recorder.switch_sheet(SheetId::from("sheet-1"));
    let action = recorder.observe_header_rename(&rename(1, "Region", "Regions"), at_ms(200));
    assert_eq!(action, Some(RenameAction::Merged(StepId::from("s1"))));
    assert_eq!(recorder.timeline_for(&SheetId::from("sheet-1")).len(), 1);
    assert_eq!(recorder.timeline_for(&SheetId::from("sheet-2")).len(), 1);
}

#[test]
fn formula_commits_are_recorded_with_a1_address() {
    let mut recorder = recorder();
    let id = recorder
        .record_formula_commit(12, 3, "=SUM(A1:A10)", at_ms(0))
        .expect("sheet is active");
    let step = &recorder.timeline()[0];
    assert_eq!(step.id, id);
    match &step.kind {
        StepKind::ApplyFormula(params) => {
            assert_eq!(params.a1, "C12");
            assert_eq!(params.formula, "=SUM(A1:A10)");
        }
        other => panic!("unexpected step {other:?}"),
    }
}

use crate::backend::{CreatePatternRequest, PatternBackend};
use crate::config::PatternConfig;
use crate::http::HttpPatternBackend;
use crate::model::{SheetId, SpreadsheetId, StepId, TimelineStep};
use crate::timeline::{select_steps, timeline_items_to_create_steps};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

/// Read a recorded timeline (JSON array of steps).
pub fn load_timeline(path: &Path) -> Result<Vec<TimelineStep>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read timeline {:?}", path))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse timeline {:?}", path))
}

fn chosen_steps(steps: Vec<TimelineStep>, select: Option<Vec<String>>) -> Result<Vec<TimelineStep>> {
    let Some(select) = select.filter(|ids| !ids.is_empty()) else {
        return Ok(steps);
    };
    let ids: Vec<StepId> = select.into_iter().map(StepId::from).collect();
    let chosen = select_steps(&steps, &ids);
    anyhow::ensure!(
        !chosen.is_empty(),
        "none of the selected step ids are on the timeline"
    );
    Ok(chosen)
}

pub async fn export(file: PathBuf, select: Option<Vec<String>>) -> Result<Value> {
    let steps = chosen_steps(load_timeline(&file)?, select)?;
    let payload = timeline_items_to_create_steps(&steps);
    Ok(json!({
        "step_count": payload.len(),
        "steps": serde_json::to_value(payload)?,
    }))
}

pub struct SaveArgs {
    pub file: PathBuf,
    pub name: String,
    pub description: Option<String>,
    pub spreadsheet_id: String,
    pub sheet_id: String,
    pub select: Option<Vec<String>>,
}

pub async fn save(config: &PatternConfig, args: SaveArgs) -> Result<Value> {
    let steps = chosen_steps(load_timeline(&args.file)?, args.select)?;
    anyhow::ensure!(!steps.is_empty(), "timeline {:?} has no steps to save", args.file);

    let request = CreatePatternRequest {
        name: args.name,
        description: args.description,
        spreadsheet_id: SpreadsheetId::from(args.spreadsheet_id),
        sheet_id: SheetId::from(args.sheet_id),
        steps: timeline_items_to_create_steps(&steps),
    };
    let backend = HttpPatternBackend::from_config(config)?;
    let pattern = backend.create_pattern(&request).await?;
    tracing::info!(pattern_id = %pattern.id, steps = pattern.steps.len(), "saved pattern");
    Ok(serde_json::to_value(pattern)?)
}

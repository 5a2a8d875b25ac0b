use crate::backend::PatternBackend;
use crate::config::PatternConfig;
use crate::http::HttpPatternBackend;
use crate::model::{JobId, PatternId, SpreadsheetId};
use anyhow::Result;
use serde_json::{Value, json};

pub async fn list(config: &PatternConfig, spreadsheet_id: String) -> Result<Value> {
    let backend = HttpPatternBackend::from_config(config)?;
    let patterns = backend
        .list_patterns(&SpreadsheetId::from(spreadsheet_id))
        .await?;
    Ok(json!({
        "count": patterns.len(),
        "patterns": serde_json::to_value(patterns)?,
    }))
}

pub async fn show(config: &PatternConfig, pattern_id: String) -> Result<Value> {
    let backend = HttpPatternBackend::from_config(config)?;
    let pattern = backend.get_pattern(&PatternId::from(pattern_id)).await?;
    Ok(serde_json::to_value(pattern)?)
}

pub async fn status(config: &PatternConfig, job_id: String) -> Result<Value> {
    let backend = HttpPatternBackend::from_config(config)?;
    let job_id = JobId::from(job_id);
    let snapshot = backend.job_status(&job_id).await?;
    let mut value = serde_json::to_value(&snapshot)?;
    if let Value::Object(obj) = &mut value {
        obj.insert("job_id".into(), Value::String(job_id.to_string()));
        obj.insert("terminal".into(), Value::Bool(snapshot.is_terminal()));
    }
    Ok(value)
}

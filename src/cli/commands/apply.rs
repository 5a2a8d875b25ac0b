use crate::apply::{ApplyHooks, ApplyOutcome, ApplySession, ApplyTarget};
use crate::backend::{PatternBackend, PatternStep};
use crate::config::PatternConfig;
use crate::http::HttpPatternBackend;
use crate::model::{PatternId, SheetId, SpreadsheetId};
use anyhow::{Result, bail};
use serde_json::Value;
use std::sync::Arc;

/// There is no grid to refresh from the command line; report what a view would do.
struct LoggingHooks;

impl ApplyHooks for LoggingHooks {
    fn refresh_grid(&self, target: &ApplyTarget) {
        tracing::info!(sheet_id = %target.sheet_id, "job succeeded; grid refresh due");
    }

    fn reapply_highlights(&self, target: &ApplyTarget, steps: &[PatternStep]) {
        for step in steps {
            if let Some(params) = step.highlight() {
                tracing::info!(
                    sheet_id = %target.sheet_id,
                    seq = step.seq,
                    range = %params.range,
                    background = %params.background,
                    "highlight to re-apply"
                );
            }
        }
    }
}

pub async fn apply(
    config: &PatternConfig,
    pattern_id: String,
    spreadsheet_id: String,
    sheet_id: String,
) -> Result<Value> {
    let backend = Arc::new(HttpPatternBackend::from_config(config)?);
    let target = ApplyTarget {
        pattern_id: PatternId::from(pattern_id),
        spreadsheet_id: SpreadsheetId::from(spreadsheet_id),
        sheet_id: SheetId::from(sheet_id),
    };
    let pattern = backend.get_pattern(&target.pattern_id).await?;

    let session = Arc::new(ApplySession::new(
        backend,
        Arc::new(LoggingHooks),
        config.apply_config(),
    ));
    let mut run = session.spawn_apply(pattern, target);

    let outcome = tokio::select! {
        outcome = &mut run => outcome?,
        _ = tokio::signal::ctrl_c() => {
            session.teardown();
            run.await?
        }
    };

    match outcome {
        ApplyOutcome::Finished(state) => Ok(serde_json::to_value(state)?),
        ApplyOutcome::AlreadyPolling(job_id) => bail!("job {job_id} is already being polled"),
        ApplyOutcome::TornDown => bail!("interrupted before the job finished"),
    }
}

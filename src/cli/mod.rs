pub mod commands;
pub mod output;

use crate::config::{CliArgs, PatternConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pattern-cli",
    version,
    about = "Export, save and replay recorded spreadsheet patterns"
)]
pub struct Cli {
    #[command(flatten)]
    pub settings: CliArgs,

    #[arg(long, global = true, help = "Print single-line JSON")]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a recorded timeline into the create-pattern step payload.
    Export {
        #[arg(long)]
        timeline: PathBuf,
        #[arg(long, value_delimiter = ',', value_name = "STEP_ID")]
        select: Option<Vec<String>>,
    },
    /// Save (a selection of) a recorded timeline as a pattern.
    Save {
        #[arg(long)]
        timeline: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        spreadsheet_id: String,
        #[arg(long)]
        sheet_id: String,
        #[arg(long, value_delimiter = ',', value_name = "STEP_ID")]
        select: Option<Vec<String>>,
    },
    /// List the patterns recorded for a spreadsheet.
    List {
        #[arg(long)]
        spreadsheet_id: String,
    },
    /// Print one saved pattern with its steps.
    Show {
        #[arg(long)]
        pattern_id: String,
    },
    /// Fetch the status of an apply job once.
    Status {
        #[arg(long)]
        job_id: String,
    },
    /// Apply a pattern to a sheet and wait for the job to finish.
    Apply {
        #[arg(long)]
        pattern_id: String,
        #[arg(long)]
        spreadsheet_id: String,
        #[arg(long)]
        sheet_id: String,
    },
}

pub async fn run_command(config: &PatternConfig, command: Commands) -> Result<Value> {
    match command {
        Commands::Export { timeline, select } => commands::timeline::export(timeline, select).await,
        Commands::Save {
            timeline,
            name,
            description,
            spreadsheet_id,
            sheet_id,
            select,
        } => {
            commands::timeline::save(
                config,
                commands::timeline::SaveArgs {
                    file: timeline,
                    name,
                    description,
                    spreadsheet_id,
                    sheet_id,
                    select,
                },
            )
            .await
        }
        Commands::List { spreadsheet_id } => commands::patterns::list(config, spreadsheet_id).await,
        Commands::Show { pattern_id } => commands::patterns::show(config, pattern_id).await,
        Commands::Status { job_id } => commands::patterns::status(config, job_id).await,
        Commands::Apply {
            pattern_id,
            spreadsheet_id,
            sheet_id,
        } => commands::apply::apply(config, pattern_id, spreadsheet_id, sheet_id).await,
    }
}

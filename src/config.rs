use crate::apply::{ApplyConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STALE_AFTER_MS};
use crate::timeline::session::{DEFAULT_HEADER_ROW_INDEX, DEFAULT_MERGE_WINDOW_MS, RecorderConfig};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternConfig {
    /// Base URL of the pattern service, e.g. `https://ops.example.com/api`.
    pub api_base: Option<String>,
    pub api_token: Option<String>,
    pub merge_window_ms: u64,
    pub poll_interval_ms: u64,
    pub stale_after_ms: u64,
    pub header_row_index: u32,
    pub request_timeout_ms: Option<u64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_token: None,
            merge_window_ms: DEFAULT_MERGE_WINDOW_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
            header_row_index: DEFAULT_HEADER_ROW_INDEX,
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl PatternConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            api_base: cli_api_base,
            api_token: cli_api_token,
            merge_window_ms: cli_merge_window_ms,
            poll_interval_ms: cli_poll_interval_ms,
            stale_after_ms: cli_stale_after_ms,
            header_row_index: cli_header_row_index,
            request_timeout_ms: cli_request_timeout_ms,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            api_base: file_api_base,
            api_token: file_api_token,
            merge_window_ms: file_merge_window_ms,
            poll_interval_ms: file_poll_interval_ms,
            stale_after_ms: file_stale_after_ms,
            header_row_index: file_header_row_index,
            request_timeout_ms: file_request_timeout_ms,
        } = file_config;

        let api_base = cli_api_base
            .or(file_api_base)
            .map(|base| base.trim().trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty());

        if let Some(base) = api_base.as_ref() {
            anyhow::ensure!(
                base.starts_with("http://") || base.starts_with("https://"),
                "api base {base:?} must be an http(s) URL"
            );
        }

        let api_token = cli_api_token
            .or(file_api_token)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let merge_window_ms = cli_merge_window_ms
            .or(file_merge_window_ms)
            .unwrap_or(DEFAULT_MERGE_WINDOW_MS);

        let poll_interval_ms = cli_poll_interval_ms
            .or(file_poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        anyhow::ensure!(poll_interval_ms > 0, "poll interval must be positive");

        let stale_after_ms = cli_stale_after_ms
            .or(file_stale_after_ms)
            .unwrap_or(DEFAULT_STALE_AFTER_MS);
        anyhow::ensure!(
            stale_after_ms >= poll_interval_ms,
            "stale threshold ({stale_after_ms}ms) must not be shorter than the poll interval ({poll_interval_ms}ms)"
        );

        let header_row_index = cli_header_row_index
            .or(file_header_row_index)
            .unwrap_or(DEFAULT_HEADER_ROW_INDEX);

        let request_timeout_ms = cli_request_timeout_ms
            .or(file_request_timeout_ms)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        let request_timeout_ms = if request_timeout_ms == 0 {
            None
        } else {
            Some(request_timeout_ms)
        };

        Ok(Self {
            api_base,
            api_token,
            merge_window_ms,
            poll_interval_ms,
            stale_after_ms,
            header_row_index,
            request_timeout_ms,
        })
    }

    pub fn require_api_base(&self) -> Result<&str> {
        self.api_base.as_deref().ok_or_else(|| {
            anyhow::anyhow!("no pattern service configured (set --api-base or SHEET_PATTERNS_API_BASE)")
        })
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            merge_window: Duration::from_millis(self.merge_window_ms),
            header_row_index: self.header_row_index,
        }
    }

    pub fn apply_config(&self) -> ApplyConfig {
        ApplyConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stale_after: Duration::from_millis(self.stale_after_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "pattern-cli", about = "Spreadsheet pattern recorder tooling", version)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SHEET_PATTERNS_API_BASE",
        value_name = "URL",
        help = "Base URL of the pattern service",
        global = true
    )]
    pub api_base: Option<String>,

    #[arg(
        long,
        env = "SHEET_PATTERNS_API_TOKEN",
        value_name = "TOKEN",
        help = "Bearer token sent to the pattern service",
        hide_env_values = true,
        global = true
    )]
    pub api_token: Option<String>,

    #[arg(
        long,
        env = "SHEET_PATTERNS_MERGE_WINDOW_MS",
        value_name = "MS",
        help = "Window in which repeated header renames merge into one step (default: 800)",
        value_parser = clap::value_parser!(u64),
        global = true
    )]
    pub merge_window_ms: Option<u64>,

    #[arg(
        long,
        env = "SHEET_PATTERNS_POLL_INTERVAL_MS",
        value_name = "MS",
        help = "Delay between job status polls (default: 1500)",
        value_parser = clap::value_parser!(u64),
        global = true
    )]
    pub poll_interval_ms: Option<u64>,

    #[arg(
        long,
        env = "SHEET_PATTERNS_STALE_AFTER_MS",
        value_name = "MS",
        help = "Give up on a job that stays queued this long (default: 60000)",
        value_parser = clap::value_parser!(u64),
        global = true
    )]
    pub stale_after_ms: Option<u64>,

    #[arg(
        long,
        env = "SHEET_PATTERNS_HEADER_ROW",
        value_name = "ROW",
        help = "Row index holding column headers (default: 0)",
        value_parser = clap::value_parser!(u32),
        global = true
    )]
    pub header_row_index: Option<u32>,

    #[arg(
        long,
        env = "SHEET_PATTERNS_REQUEST_TIMEOUT_MS",
        value_name = "MS",
        help = "HTTP request timeout in milliseconds (default: 30000; 0 disables)",
        value_parser = clap::value_parser!(u64),
        global = true
    )]
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    api_base: Option<String>,
    api_token: Option<String>,
    merge_window_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    stale_after_ms: Option<u64>,
    header_row_index: Option<u32>,
    request_timeout_ms: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

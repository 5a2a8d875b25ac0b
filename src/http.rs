//! reqwest-backed [`PatternBackend`].

use crate::backend::{
    ApplyPatternRequest, ApplyPatternResponse, CreatePatternRequest, JobSnapshot, PatternBackend,
    WorkflowPattern,
};
use crate::config::PatternConfig;
use crate::errors::ApiError;
use crate::model::{JobId, PatternId, SpreadsheetId};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpPatternBackend {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

/// `GET /patterns` answers either with a bare array or wrapped in `{"patterns": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PatternList {
    Bare(Vec<WorkflowPattern>),
    Wrapped { patterns: Vec<WorkflowPattern> },
}

impl HttpPatternBackend {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(format!("sheet-patterns/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &PatternConfig) -> anyhow::Result<Self> {
        let api_base = config.require_api_base()?;
        Ok(Self::new(
            api_base,
            config.api_token.clone(),
            config.request_timeout(),
        )?)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PatternBackend for HttpPatternBackend {
    async fn create_pattern(
        &self,
        request: &CreatePatternRequest,
    ) -> Result<WorkflowPattern, ApiError> {
        tracing::debug!(name = %request.name, steps = request.steps.len(), "creating pattern");
        self.send(self.http.post(self.url("/patterns")).json(request))
            .await
    }

    async fn list_patterns(
        &self,
        spreadsheet_id: &SpreadsheetId,
    ) -> Result<Vec<WorkflowPattern>, ApiError> {
        let request = self
            .http
            .get(self.url("/patterns"))
            .query(&[("spreadsheet_id", spreadsheet_id.as_str())]);
        let list: PatternList = self.send(request).await?;
        Ok(match list {
            PatternList::Bare(patterns) | PatternList::Wrapped { patterns } => patterns,
        })
    }

    async fn get_pattern(&self, pattern_id: &PatternId) -> Result<WorkflowPattern, ApiError> {
        self.send(self.http.get(self.url(&format!("/patterns/{pattern_id}"))))
            .await
    }

    async fn apply_pattern(
        &self,
        request: &ApplyPatternRequest,
    ) -> Result<ApplyPatternResponse, ApiError> {
        let url = self.url(&format!("/patterns/{}/apply", request.pattern_id));
        self.send(self.http.post(url).json(request)).await
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, ApiError> {
        self.send(self.http.get(self.url(&format!("/pattern-jobs/{job_id}"))))
            .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::{AuthScheme, Token};
use crate::error::{PipelineError, Result};
use crate::model::{FileCriteria, FileSnapshot, MetricRequest, MetricsConfig};

use super::types::CriteriaResponse;
use super::MetricsService;

const API_KEY_HEADER: &str = "X-API-KEY";

/// HTTP client for the metrics service REST API.
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<Token>,
    scheme: AuthScheme,
}

impl ApiClient {
    /// Creates a client for the service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the URL cannot be parsed or the HTTP client cannot
    /// be built.
    pub fn new(
        base_url: &str,
        token: Option<Token>,
        scheme: AuthScheme,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("maintlens/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last segment unless the base ends with a slash
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)
            .map_err(|e| PipelineError::Config(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
            scheme,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.token, self.scheme) {
            (Some(token), AuthScheme::ApiKey) => request.header(API_KEY_HEADER, token.as_str()),
            (Some(token), AuthScheme::Bearer) => request.bearer_auth(token.as_str()),
            (None, _) => request,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| PipelineError::Config(format!("Invalid endpoint URL: {e}")))
    }

    /// Sends a request and turns non-2xx responses into `Api` errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.auth_request(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(PipelineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MetricsService for ApiClient {
    async fn get_metrics_config(&self) -> Result<MetricsConfig> {
        let url = self.endpoint("get_metrics_config")?;
        let response = self.send(self.client.get(url)).await?;
        Self::decode(response).await
    }

    async fn fetch_repo_structure(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        let url = self.endpoint("fetch_repo_structure")?;
        let request = self
            .client
            .get(url)
            .query(&[("user", owner), ("repo", repo)]);
        let response = self.send(request).await?;
        Self::decode(response).await
    }

    async fn fetch_file_content(&self, owner: &str, repo: &str, path: &str) -> Result<String> {
        let url = self.endpoint("fetch_file_content")?;
        let request = self
            .client
            .get(url)
            .query(&[("user", owner), ("repo", repo), ("path", path)]);
        let response = self.send(request).await?;
        Self::decode(response).await
    }

    async fn check_file_criteria(
        &self,
        path: &str,
        extension: &str,
        line_count: usize,
    ) -> Result<FileCriteria> {
        let url = self.endpoint("check_file_criteria")?;
        let line_count = line_count.to_string();
        let request = self.client.post(url).query(&[
            ("file_path", path),
            ("extension", extension),
            ("line_count", line_count.as_str()),
        ]);
        let response = self.send(request).await?;
        let verdict: CriteriaResponse = Self::decode(response).await?;
        debug!(
            "Criteria for {path}: result={} ({})",
            verdict.result,
            verdict.message.as_deref().unwrap_or("no message")
        );
        Ok(verdict.into())
    }

    async fn insert_file(&self, snapshot: &FileSnapshot) -> Result<()> {
        let url = self.endpoint("insert_file")?;
        self.send(self.client.post(url).json(snapshot)).await?;
        Ok(())
    }

    async fn extract_metric(&self, request: &MetricRequest) -> Result<()> {
        let url = self.endpoint("extract_metrics")?;
        self.send(self.client.post(url).json(request)).await?;
        Ok(())
    }
}

//! HTTP client for a LangSmith-compatible tracing backend.
//!
//! Runs are posted inline: `POST /runs` when a run starts, `PATCH /runs/{id}`
//! when it ends. There is no batching or background flush. Feedback and
//! sharing calls return the backend's errors to the caller unchanged.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use super::feedback::{Feedback, FeedbackRecord};
use super::run::{RunId, RunRecord};
use super::sink::{RunSink, SinkFuture};
use crate::api::describe_send_error;
use crate::config::TraceConfig;

#[derive(Deserialize, Debug)]
struct ShareResponse {
    share_token: String,
}

/// Client for run upload, feedback, and run sharing.
#[derive(Clone)]
pub struct LangSmithClient {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    web_url: String,
}

impl LangSmithClient {
    /// Build a client from a [`TraceConfig`].
    pub fn new(config: &TraceConfig) -> Result<Self, String> {
        Self::with_endpoints(config.api_key.clone(), &config.endpoint, config.web_url())
    }

    /// Build a client against explicit API and web URLs.
    pub fn with_endpoints(
        api_key: Option<String>,
        endpoint: impl Into<String>,
        web_url: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tracechain/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            web_url: web_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{path}", self.endpoint));
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    /// Send `req`, map non-2xx statuses to errors, and return the body text.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, String> {
        let resp = req
            .send()
            .await
            .map_err(|e| describe_send_error(&e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        if !status.is_success() {
            return Err(format!("tracing API HTTP {status}: {text}"));
        }
        Ok(text)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, String> {
        let text = self.send(req).await?;
        serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))
    }

    /// Attach feedback to a run.
    pub async fn create_feedback(&self, feedback: &Feedback) -> Result<FeedbackRecord, String> {
        let payload = feedback.to_payload()?;
        debug!(
            "Creating feedback '{}' for run {}",
            feedback.key, feedback.run_id
        );
        self.send_json(
            self.request(reqwest::Method::POST, "/feedback")
                .json(&payload),
        )
        .await
    }

    /// Make a run public and return its share URL.
    pub async fn share_run(&self, run_id: RunId) -> Result<String, String> {
        let body = serde_json::json!({
            "run_id": run_id,
            "share_token": Uuid::new_v4(),
        });
        let resp: ShareResponse = self
            .send_json(
                self.request(reqwest::Method::PUT, &format!("/runs/{run_id}/share"))
                    .json(&body),
            )
            .await?;
        Ok(self.share_url(&resp.share_token))
    }

    /// Share URL of a run, or `None` if it is not shared.
    pub async fn read_run_shared_link(&self, run_id: RunId) -> Result<Option<String>, String> {
        let resp: Option<ShareResponse> = self
            .send_json(self.request(reqwest::Method::GET, &format!("/runs/{run_id}/share")))
            .await?;
        Ok(resp.map(|r| self.share_url(&r.share_token)))
    }

    /// Revoke a run's public link.
    pub async fn unshare_run(&self, run_id: RunId) -> Result<(), String> {
        self.send(self.request(reqwest::Method::DELETE, &format!("/runs/{run_id}/share")))
            .await
            .map(|_| ())
    }

    fn share_url(&self, token: &str) -> String {
        format!("{}/public/{token}/r", self.web_url)
    }
}

impl std::fmt::Debug for LangSmithClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangSmithClient")
            .field("endpoint", &self.endpoint)
            .field("web_url", &self.web_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RunSink for LangSmithClient {
    fn create_run<'a>(&'a self, run: &'a RunRecord) -> SinkFuture<'a> {
        Box::pin(async move {
            self.send(self.request(reqwest::Method::POST, "/runs").json(run))
                .await
                .map(|_| ())
        })
    }

    fn update_run<'a>(&'a self, run: &'a RunRecord) -> SinkFuture<'a> {
        Box::pin(async move {
            let body = serde_json::json!({
                "outputs": run.outputs,
                "error": run.error,
                "end_time": run.end_time,
                "trace_id": run.trace_id,
                "dotted_order": run.dotted_order,
                "parent_run_id": run.parent_run_id,
            });
            self.send(
                self.request(reqwest::Method::PATCH, &format!("/runs/{}", run.id))
                    .json(&body),
            )
            .await
            .map(|_| ())
        })
    }
}

//! HTTP client for the status and toggle endpoints.
//!
use anyhow::{Context, Result};
use common::protocol::{ModelStatus, StatusReport};
use reqwest::Client;

pub struct DetectorClient {
    client: Client,
    base_url: String,
}

impl DetectorClient {
    /// Client for a server at `address`, e.g. `127.0.0.1:3000` or `http://host:3000/`.
    pub fn new(address: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url(address),
        }
    }

    pub async fn status(&self) -> Result<StatusReport> {
        self.request(self.client.get(self.url("status"))).await
    }

    pub async fn toggle_detect(&self) -> Result<StatusReport> {
        self.request(self.client.post(self.url("detect/toggle"))).await
    }

    pub async fn toggle_mute(&self) -> Result<StatusReport> {
        self.request(self.client.post(self.url("mute/toggle"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn request(&self, request: reqwest::RequestBuilder) -> Result<StatusReport> {
        let report = request
            .send()
            .await
            .with_context(|| format!("failed to reach detector at {}", self.base_url))?
            .error_for_status()?
            .json()
            .await?;

        Ok(report)
    }
}

fn base_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_owned()
    } else {
        format!("http://{address}")
    }
}

/// One line summary of a status report.
pub fn describe(report: &StatusReport) -> String {
    let model = match &report.model {
        ModelStatus::Loading => "Loading model...",
        ModelStatus::Ready if report.is_detecting() => "detecting",
        ModelStatus::Ready => "idle",
        ModelStatus::Failed(message) => message.as_str(),
    };
    let mut line = format!("{} [{}", report.status_text, model);
    if report.muted {
        line.push_str(", muted");
    }
    line.push(']');
    if let (Some(error), ModelStatus::Ready) = (&report.error, &report.model) {
        line.push_str(&format!(" {error}"));
    }

    line
}

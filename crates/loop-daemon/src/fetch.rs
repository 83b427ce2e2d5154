//! The network side of the refresh engine.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use loop_proto::config::NightscoutConfig;
use loop_proto::FeedError;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

/// Why a fetch did not produce a snapshot. Never fatal to the engine.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("feed rejected: {0}")]
    Feed(#[from] FeedError),
}

/// Produces the raw device-status payload. Implementations need not support
/// cancellation themselves: the engine drops the future and ignores any
/// late result.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'static, Result<serde_json::Value, FetchError>>;
}

/// Reads `/api/v1/devicestatus.json` from a Nightscout site.
pub struct NightscoutSource {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    count: u32,
}

impl NightscoutSource {
    pub fn new(config: &NightscoutConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("loopwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: devicestatus_url(&config.base_url),
            token: config.token.clone().filter(|t| !t.is_empty()),
            count: config.count,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn devicestatus_url(base_url: &str) -> String {
    format!("{}/api/v1/devicestatus.json", base_url.trim_end_matches('/'))
}

impl FeedSource for NightscoutSource {
    fn fetch(&self) -> BoxFuture<'static, Result<serde_json::Value, FetchError>> {
        let mut request = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .query(&[("count", self.count.to_string())]);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let payload: serde_json::Value = response.json().await?;
            debug!(
                "fetch: devicestatus returned {} records",
                payload.as_array().map(Vec::len).unwrap_or(0)
            );
            Ok(payload)
        }
        .boxed()
    }
}

//! HTTP client for the metrics backend.
//!
//! Mirrors the request the backend expects: one POST carrying the account,
//! the reporting window and the visible identifier sets. Every transport
//! error, non-success status or malformed payload is reported uniformly as
//! [`FetchOutcome::Failed`]; backoff policy lives upstream.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::model::{FetchOutcome, MetricRow, RefreshRequestParams};
use crate::domain::MetricsFetch;
use crate::infrastructure::config::ApiConfig;

const METRICS_ENDPOINT: &str = "/api/ads/metrics";

/// Wire shape of the metrics request body.
#[derive(Debug, Serialize)]
struct MetricsRequestBody<'a> {
    account_id: Option<&'a str>,
    start_date: String,
    end_date: String,
    campaign_ids: &'a [String],
    adset_ids: &'a [String],
    ad_ids: &'a [String],
    timestamp: String,
    timezone: String,
}

impl<'a> MetricsRequestBody<'a> {
    fn from_params(params: &'a RefreshRequestParams) -> Self {
        Self {
            account_id: params.account_id.as_deref(),
            start_date: params.date_range.start.to_string(),
            end_date: params.date_range.end.to_string(),
            campaign_ids: &params.campaign_ids,
            adset_ids: &params.adset_ids,
            ad_ids: &params.ad_ids,
            timestamp: chrono::Utc::now().to_rfc3339(),
            timezone: chrono::Local::now().format("%:z").to_string(),
        }
    }
}

/// [`MetricsFetch`] implementation over reqwest, rate limited so bursty
/// refresh triggers cannot hammer the backend.
pub struct HttpMetricsClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: ApiConfig,
}

impl HttpMetricsClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self { client, rate_limiter, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), METRICS_ENDPOINT)
    }
}

#[async_trait]
impl MetricsFetch for HttpMetricsClient {
    async fn fetch(&self, params: &RefreshRequestParams) -> FetchOutcome {
        if self.config.base_url.is_empty() {
            return FetchOutcome::Failed("metrics API base URL is not configured".to_string());
        }

        self.rate_limiter.until_ready().await;

        let url = self.endpoint();
        debug!(%url, ids = params.total_id_count(), "requesting metrics");

        let mut request = self.client.post(&url).json(&MetricsRequestBody::from_params(params));
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("metrics request transport error: {e}");
                return FetchOutcome::Failed(format!("transport error: {e}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "metrics request rejected");
            return FetchOutcome::Failed(format!("HTTP {status}: {body}"));
        }

        match response.json::<Vec<MetricRow>>().await {
            Ok(rows) if rows.is_empty() => FetchOutcome::Empty,
            Ok(rows) => {
                info!("✅ metrics request succeeded with {} rows", rows.len());
                FetchOutcome::Rows(rows)
            }
            Err(e) => FetchOutcome::Failed(format!("malformed payload: {e}")),
        }
    }
}

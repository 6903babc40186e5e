//! Trait seams for the external collaborators.
//!
//! The core never talks to the network, the host page, persisted settings or
//! the rendering surface directly; everything goes through these traits so the
//! pipeline can run against test doubles.

use async_trait::async_trait;

use super::model::{FeatureConfig, FetchOutcome, MetricRow, RefreshRequestParams, ToastKind};

/// The remote metrics API. Any non-success response, transport error or
/// malformed payload is reported uniformly as [`FetchOutcome::Failed`].
#[async_trait]
pub trait MetricsFetch: Send + Sync {
    async fn fetch(&self, params: &RefreshRequestParams) -> FetchOutcome;
}

/// Persisted user preferences. Polled once per scheduler tick and once at
/// initialization; no push notifications are assumed.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn feature_config(&self) -> FeatureConfig;
}

/// The rendering/notification surface. Purely a sink, no feedback into the
/// core.
pub trait AnnotationSink: Send + Sync {
    fn render_annotations(&self, rows: &[MetricRow]);
    fn clear_annotations(&self);
    fn toast(&self, message: &str, kind: ToastKind);
}

/// Synchronous reads of the hosting page at call time.
///
/// `table_html` and `stats_range_text` return `None` while the host is still
/// rendering the respective region; callers treat that as "not ready", never
/// as an error.
pub trait PageProvider: Send + Sync {
    fn url(&self) -> String;
    fn table_html(&self) -> Option<String>;
    fn stats_range_text(&self) -> Option<String>;
}

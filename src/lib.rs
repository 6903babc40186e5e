//! ads-metrics-overlay — change-detection and adaptive-refresh core.
//!
//! Augments a third-party ads-manager table with metrics fetched from a
//! remote API, keeping the annotations synchronized as the user navigates and
//! as the table mutates. The pipeline: structural page events are classified
//! (navigation vs. in-place refresh), identifiers are extracted from the
//! rendered rows through a lazily resolved column index, and a single-flight
//! orchestrator with request-parameter dedup and error/empty-result backoff
//! decides when the network is actually hit.
//!
//! External collaborators (the metrics API, persisted settings, the rendering
//! surface and the hosting page) are trait seams under
//! [`domain::collaborators`]; production implementations live in
//! [`infrastructure`].

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    ChangeClassifier, PageEvent, RefreshOrchestrator, RefreshTiming, SessionCoordinator,
    SessionStatus, SharedSession,
};
pub use domain::{
    AnnotationSink, AreaKind, FeatureConfig, FetchOutcome, MetricRow, MetricsFetch, OverlayError,
    PageProvider, SettingsProvider, StatusSnapshot,
};
pub use infrastructure::{AppConfig, ConfigManager, HttpMetricsClient, StaticPageProvider};

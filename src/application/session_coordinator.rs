//! Session lifecycle.
//!
//! One coordinator instance owns the shared state and wires the classifier
//! and orchestrator together. It refuses to start outside the managed
//! application, waits for the page anchors to render, runs the first data
//! load after a short delay, and exposes the manual-refresh and status
//! surface an external popup talks to.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::application::change_classifier::{ChangeClassifier, PageEvent};
use crate::application::refresh_orchestrator::{RefreshOrchestrator, RefreshTiming};
use crate::application::session_state::SharedSession;
use crate::domain::model::{AreaKind, FeatureConfig, StatusSnapshot, ToastKind};
use crate::domain::{AnnotationSink, MetricsFetch, OverlayError, PageProvider, SettingsProvider};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::page_context;
use crate::infrastructure::status_broadcaster::StatusBroadcaster;
use crate::infrastructure::table_index::TableIndexMapper;

/// Snapshot served to an external status surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub initialized: bool,
    pub area_kind: AreaKind,
    pub account_id: Option<String>,
    pub data_count: usize,
    pub last_update_at: Option<DateTime<Utc>>,
    pub features: FeatureConfig,
}

pub struct SessionCoordinator {
    session_id: Uuid,
    state: SharedSession,
    page: Arc<dyn PageProvider>,
    settings: Arc<dyn SettingsProvider>,
    display: Arc<dyn AnnotationSink>,
    orchestrator: RefreshOrchestrator,
    classifier: ChangeClassifier,
    broadcaster: StatusBroadcaster,
    initial_load_delay: Duration,
    readiness_poll: Duration,
    readiness_timeout: Duration,
    classifier_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCoordinator {
    #[must_use]
    pub fn new(
        config: &AppConfig,
        page: Arc<dyn PageProvider>,
        fetcher: Arc<dyn MetricsFetch>,
        settings: Arc<dyn SettingsProvider>,
        display: Arc<dyn AnnotationSink>,
    ) -> Self {
        let state = SharedSession::new();
        let mapper = Arc::new(TableIndexMapper::new());
        let broadcaster = StatusBroadcaster::new();

        let orchestrator = RefreshOrchestrator::new(
            state.clone(),
            Arc::clone(&page),
            fetcher,
            Arc::clone(&settings),
            Arc::clone(&display),
            mapper,
            broadcaster.clone(),
            RefreshTiming::from(&config.refresh),
        );

        let classifier = ChangeClassifier::new(
            state.clone(),
            Arc::clone(&page),
            orchestrator.clone(),
            config.refresh.mutation_debounce(),
            config.refresh.scroll_debounce(),
        );

        Self {
            session_id: Uuid::new_v4(),
            state,
            page,
            settings,
            display,
            orchestrator,
            classifier,
            broadcaster,
            initial_load_delay: config.refresh.initial_load_delay(),
            readiness_poll: config.refresh.readiness_poll(),
            readiness_timeout: config.refresh.readiness_timeout(),
            classifier_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn orchestrator(&self) -> &RefreshOrchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub fn classifier(&self) -> &ChangeClassifier {
        &self.classifier
    }

    #[must_use]
    pub fn state(&self) -> &SharedSession {
        &self.state
    }

    /// Bring the session up and start consuming page events.
    ///
    /// Waits for the table and date-range anchors to render, seeds the shared
    /// state, runs the first data load after the initial delay and arms the
    /// recurring scheduler.
    pub async fn initialize(
        &self,
        events: mpsc::Receiver<PageEvent>,
    ) -> Result<(), OverlayError> {
        if self.state.read().await.initialized {
            return Err(OverlayError::AlreadyInitialized);
        }
        let url = self.page.url();
        if !page_context::is_managed_url(&url) {
            return Err(OverlayError::OutsideManagedContext(url));
        }

        self.wait_for_page_ready().await?;

        let features = self.settings.feature_config().await;
        let context = page_context::read_context(self.page.as_ref());
        {
            let mut state = self.state.write().await;
            state.initialized = true;
            state.features = features;
            state.context = context;
        }

        info!(session = %self.session_id, "🔔 overlay session initialized");
        if features.show_status_indicator {
            self.display.toast("Ads metrics overlay loaded", ToastKind::Success);
        }

        let handle = self.classifier.spawn(events);
        if let Ok(mut slot) = self.classifier_task.lock() {
            *slot = Some(handle);
        }

        // First data load once the page has had a moment to finish its own
        // startup churn; the scheduler is armed right after it.
        self.orchestrator.schedule_kickoff(self.initial_load_delay);
        Ok(())
    }

    async fn wait_for_page_ready(&self) -> Result<(), OverlayError> {
        let deadline = tokio::time::Instant::now() + self.readiness_timeout;
        while !page_context::page_ready(self.page.as_ref()) {
            if tokio::time::Instant::now() >= deadline {
                return Err(OverlayError::PageNotReady(self.readiness_timeout));
            }
            tokio::time::sleep(self.readiness_poll).await;
        }
        Ok(())
    }

    /// User-triggered refresh: bypasses the dedup cache and resets backoff.
    pub async fn manual_refresh(&self) -> Result<(), OverlayError> {
        if !self.state.read().await.initialized {
            return Err(OverlayError::NotInitialized);
        }
        info!("manual refresh requested");
        self.orchestrator.handle_data_update(true).await;
        Ok(())
    }

    /// Current session status for an external surface.
    pub async fn status(&self) -> SessionStatus {
        let state = self.state.read().await;
        SessionStatus {
            initialized: state.initialized,
            area_kind: state.context.area_kind,
            account_id: state.context.account_id.clone(),
            data_count: state.current_data.as_ref().map_or(0, Vec::len),
            last_update_at: state.last_update_at,
            features: state.features,
        }
    }

    /// Subscribe to best-effort status snapshots.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.broadcaster.subscribe()
    }

    /// Stop observation and all timers. Idempotent.
    pub async fn shutdown(&self) {
        self.classifier.stop();
        self.orchestrator.stop_auto_refresh();
        self.orchestrator.cancel_settle();
        if let Ok(mut slot) = self.classifier_task.lock() {
            // The event loop exits through the classifier's stop token.
            slot.take();
        }
        self.state.write().await.session_ended = true;
        info!(session = %self.session_id, "session shut down, observers and timers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{FetchOutcome, RefreshRequestParams};
    use crate::infrastructure::config::InMemorySettingsProvider;
    use crate::infrastructure::display::LoggingAnnotationSink;
    use crate::infrastructure::page_context::StaticPageProvider;
    use async_trait::async_trait;

    struct NeverFetch;

    #[async_trait]
    impl crate::domain::MetricsFetch for NeverFetch {
        async fn fetch(&self, _params: &RefreshRequestParams) -> FetchOutcome {
            FetchOutcome::Empty
        }
    }

    fn coordinator(page: &StaticPageProvider) -> SessionCoordinator {
        let mut config = AppConfig::default();
        config.refresh.initial_load_delay_ms = 10;
        config.refresh.readiness_poll_ms = 10;
        config.refresh.readiness_timeout_secs = 1;
        SessionCoordinator::new(
            &config,
            Arc::new(page.clone()),
            Arc::new(NeverFetch),
            Arc::new(InMemorySettingsProvider::default()),
            Arc::new(LoggingAnnotationSink),
        )
    }

    fn ready_campaign_page() -> StaticPageProvider {
        let page = StaticPageProvider::new(
            "https://www.facebook.com/adsmanager/manage/campaigns?act=42",
        );
        page.set_table_html(Some(r#"<div role="table"></div>"#.to_string()));
        page.set_stats_range_text(Some("2025-07-01 – 2025-07-31".to_string()));
        page
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_refuses_unmanaged_pages() {
        let page = StaticPageProvider::new("https://example.com/dashboard");
        let coordinator = coordinator(&page);
        let (_tx, rx) = mpsc::channel(8);
        let err = coordinator.initialize(rx).await.unwrap_err();
        assert!(matches!(err, OverlayError::OutsideManagedContext(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_times_out_when_anchors_never_render() {
        let page =
            StaticPageProvider::new("https://www.facebook.com/adsmanager/manage/campaigns?act=1");
        let coordinator = coordinator(&page);
        let (_tx, rx) = mpsc::channel(8);
        let err = coordinator.initialize(rx).await.unwrap_err();
        assert!(matches!(err, OverlayError::PageNotReady(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn double_initialization_is_rejected() {
        let page = ready_campaign_page();
        let coordinator = coordinator(&page);

        let (_tx1, rx1) = mpsc::channel(8);
        coordinator.initialize(rx1).await.unwrap();

        let (_tx2, rx2) = mpsc::channel(8);
        let err = coordinator.initialize(rx2).await.unwrap_err();
        assert!(matches!(err, OverlayError::AlreadyInitialized));

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn initialization_seeds_context_and_status() {
        let page = ready_campaign_page();
        let coordinator = coordinator(&page);

        let (_tx, rx) = mpsc::channel(8);
        coordinator.initialize(rx).await.unwrap();

        let status = coordinator.status().await;
        assert!(status.initialized);
        assert_eq!(status.area_kind, AreaKind::Campaign);
        assert_eq!(status.account_id.as_deref(), Some("42"));
        assert_eq!(status.data_count, 0);

        coordinator.shutdown().await;
        assert!(coordinator.classifier().is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_requires_initialization() {
        let page = ready_campaign_page();
        let coordinator = coordinator(&page);
        let err = coordinator.manual_refresh().await.unwrap_err();
        assert!(matches!(err, OverlayError::NotInitialized));
    }
}

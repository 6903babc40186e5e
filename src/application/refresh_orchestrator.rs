//! The refresh scheduler.
//!
//! Owns the single-flight refresh operation, the request-parameter dedup
//! slot, the adaptive backoff interval and the self-rescheduling timer loop.
//! Collaborators are injected; nothing here touches the network or the page
//! directly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::session_state::SharedSession;
use crate::domain::model::{
    AreaKind, BackoffState, FetchOutcome, IdentifierSet, PageContext, RefreshCacheEntry,
    RefreshRequestParams, StatusSnapshot, ToastKind,
};
use crate::domain::{AnnotationSink, MetricsFetch, PageProvider, SettingsProvider};
use crate::infrastructure::config::RefreshConfig;
use crate::infrastructure::id_extractor;
use crate::infrastructure::page_context;
use crate::infrastructure::status_broadcaster::StatusBroadcaster;
use crate::infrastructure::table_index::TableIndexMapper;

/// Timing knobs the orchestrator works with, resolved from [`RefreshConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RefreshTiming {
    pub base_interval: Duration,
    pub cache_freshness: Duration,
    pub error_backoff_cap: Duration,
    pub empty_backoff_cap: Duration,
    pub settle_delay: Duration,
}

impl From<&RefreshConfig> for RefreshTiming {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            base_interval: config.base_interval(),
            cache_freshness: config.cache_freshness(),
            error_backoff_cap: config.error_backoff_cap(),
            empty_backoff_cap: config.empty_backoff_cap(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Next polling interval for the given streaks. Errors take precedence over
/// empty results; both grow away from the base and are capped.
#[must_use]
pub fn compute_next_interval(timing: &RefreshTiming, backoff: &BackoffState) -> Duration {
    if backoff.consecutive_errors > 0 {
        let factor = 2u32.saturating_pow(backoff.consecutive_errors.saturating_sub(1));
        return timing.base_interval.saturating_mul(factor).min(timing.error_backoff_cap);
    }
    if backoff.consecutive_empty > 0 {
        let factor = backoff.consecutive_empty.saturating_add(1);
        return timing.base_interval.saturating_mul(factor).min(timing.empty_backoff_cap);
    }
    timing.base_interval
}

type TimerSlot = Arc<Mutex<Option<CancellationToken>>>;

/// Cloneable orchestrator handle; clones share state and timer slots.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    state: SharedSession,
    page: Arc<dyn PageProvider>,
    fetcher: Arc<dyn MetricsFetch>,
    settings: Arc<dyn SettingsProvider>,
    display: Arc<dyn AnnotationSink>,
    mapper: Arc<TableIndexMapper>,
    broadcaster: StatusBroadcaster,
    timing: RefreshTiming,
    scheduler_slot: TimerSlot,
    settle_slot: TimerSlot,
}

impl RefreshOrchestrator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        state: SharedSession,
        page: Arc<dyn PageProvider>,
        fetcher: Arc<dyn MetricsFetch>,
        settings: Arc<dyn SettingsProvider>,
        display: Arc<dyn AnnotationSink>,
        mapper: Arc<TableIndexMapper>,
        broadcaster: StatusBroadcaster,
        timing: RefreshTiming,
    ) -> Self {
        Self {
            state,
            page,
            fetcher,
            settings,
            display,
            mapper,
            broadcaster,
            timing,
            scheduler_slot: Arc::new(Mutex::new(None)),
            settle_slot: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn timing(&self) -> &RefreshTiming {
        &self.timing
    }

    /// Entry point for both the classifier and explicit user refresh.
    /// No-op while data reporting is administratively disabled.
    pub async fn handle_data_update(&self, is_manual: bool) {
        let enabled = self.state.read().await.features.enable_reporting;
        if !enabled {
            debug!("reporting disabled, skipping data update");
            return;
        }
        self.refresh_data(is_manual).await;
    }

    /// Single-flight refresh. Re-entrant triggers are dropped, not queued.
    pub async fn refresh_data(&self, is_manual: bool) {
        {
            let mut state = self.state.write().await;
            if state.is_refreshing {
                info!("refresh already in flight, dropping trigger");
                return;
            }
            if !page_context::is_managed_url(&self.page.url()) {
                debug!("not on a managed page, refresh skipped");
                return;
            }
            state.is_refreshing = true;
            if is_manual {
                // A manual refresh always gets a clean attempt.
                state.backoff.reset();
            }
        }

        self.run_refresh(is_manual).await;

        // Epilogue runs on every path past the in-flight gate: success,
        // failure, dedup skip and the empty-page exit.
        self.state.write().await.is_refreshing = false;
        self.update_page_display().await;
        let snapshot = {
            let state = self.state.read().await;
            StatusSnapshot {
                area_kind: state.context.area_kind,
                account_id: state.context.account_id.clone(),
                timestamp: Utc::now(),
            }
        };
        self.broadcaster.broadcast(snapshot);
    }

    async fn run_refresh(&self, is_manual: bool) {
        let ids = match self.page.table_html() {
            Some(html) => {
                let map = self.mapper.resolve(&html);
                id_extractor::extract_visible_ids(&html, &map)
            }
            None => {
                debug!("table region not rendered, nothing to extract");
                IdentifierSet::default()
            }
        };

        let params = {
            let mut state = self.state.write().await;
            state.visible_ids = ids.clone();
            RefreshRequestParams::assemble(
                &ids,
                &state.context.parent_ids,
                state.context.account_id.clone(),
                state.context.date_range,
            )
        };

        if params.total_id_count() == 0 {
            // An empty page is a valid terminal state, not an error.
            warn!("no visible identifiers, clearing data without a fetch");
            self.state.write().await.current_data = None;
            return;
        }

        let fingerprint = params.fingerprint();
        if !is_manual {
            let cached = self.state.read().await.request_cache;
            if let Some(entry) = cached {
                if entry.matches(&fingerprint, self.timing.cache_freshness) {
                    info!("request parameters unchanged within freshness window, skipping fetch");
                    return;
                }
            }
        }

        info!("requesting metrics for {} identifiers", params.total_id_count());
        let outcome = self.fetcher.fetch(&params).await;

        let first_error_notice = {
            let mut state = self.state.write().await;
            match outcome {
                FetchOutcome::Rows(rows) => {
                    state.request_cache = Some(RefreshCacheEntry::now(fingerprint));
                    info!("✅ refresh succeeded with {} rows", rows.len());
                    state.current_data = Some(rows);
                    state.backoff.reset();
                    state.last_update_at = Some(Utc::now());
                    None
                }
                FetchOutcome::Empty => {
                    state.request_cache = Some(RefreshCacheEntry::now(fingerprint));
                    state.backoff.consecutive_empty += 1;
                    state.current_data = None;
                    warn!(streak = state.backoff.consecutive_empty, "metrics API returned no rows");
                    None
                }
                FetchOutcome::Failed(reason) => {
                    state.backoff.consecutive_errors += 1;
                    warn!(streak = state.backoff.consecutive_errors, "❌ refresh failed: {reason}");
                    // Notify only on the first error of a streak.
                    (state.backoff.consecutive_errors == 1)
                        .then(|| format!("Data fetch failed: {reason}"))
                }
            }
        };

        if let Some(notice) = first_error_notice {
            self.display.toast(&notice, ToastKind::Error);
        }
    }

    /// Hand the current data to the display collaborator.
    async fn update_page_display(&self) {
        let (data, show_indicator, visible) = {
            let state = self.state.read().await;
            (
                state.current_data.clone(),
                state.features.show_status_indicator,
                state.visible_ids.total(),
            )
        };

        match &data {
            Some(rows) => self.display.render_annotations(rows),
            None => self.display.clear_annotations(),
        }

        if show_indicator {
            let count = data.as_ref().map_or(0, Vec::len);
            self.display.toast(
                &format!("Data update complete (visible:{visible}, data:{count})"),
                ToastKind::Success,
            );
        }
    }

    /// Full reset sequence for a navigation to `new_area`.
    ///
    /// Stops pending timers, replaces the page context, clears data state,
    /// invalidates the column map, and after the settle delay performs one
    /// update and re-arms the scheduler.
    pub async fn perform_full_reset(&self, new_area: AreaKind) {
        info!("🔔 performing full reset for area '{new_area}'");
        self.stop_auto_refresh();
        self.cancel_settle();

        let fresh = page_context::read_context(self.page.as_ref());
        {
            let mut state = self.state.write().await;
            state.context = PageContext { area_kind: new_area, ..fresh };
            state.reset_data_state();
        }
        self.mapper.invalidate();
        self.display.clear_annotations();

        self.schedule_kickoff(self.timing.settle_delay);
    }

    /// After `delay`, run one update and arm the recurring scheduler. Used
    /// for the post-navigation settle pause and the initial load delay.
    pub fn schedule_kickoff(&self, delay: Duration) {
        let token = CancellationToken::new();
        if let Some(previous) = lock_slot(&self.settle_slot).replace(token.clone()) {
            previous.cancel();
        }

        let orchestrator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    orchestrator.handle_data_update(false).await;
                    orchestrator.start_auto_refresh().await;
                }
            }
        });
    }

    /// Arm the recurring scheduler: a self-rescheduling single-shot sleep
    /// loop, never a fixed-rate timer. Starting cancels any existing loop, so
    /// exactly one scheduler task exists at a time.
    pub async fn start_auto_refresh(&self) {
        self.stop_auto_refresh();

        let features = self.state.read().await.features;
        if !features.auto_refresh || !features.enable_reporting {
            warn!("auto refresh or reporting disabled, scheduler not armed");
            return;
        }

        let token = CancellationToken::new();
        *lock_slot(&self.scheduler_slot) = Some(token.clone());

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut interval = orchestrator.next_interval().await;
            info!("⏱️ auto refresh armed, first tick in {}s", interval.as_secs());
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                // Re-read the latest toggles before every tick.
                let features = orchestrator.settings.feature_config().await;
                orchestrator.state.write().await.features = features;
                if !features.auto_refresh || !features.enable_reporting {
                    warn!("toggles disabled, leaving auto refresh loop");
                    break;
                }

                debug!("running scheduled refresh");
                orchestrator.handle_data_update(false).await;

                // The next interval reacts to the outcome just observed.
                interval = orchestrator.next_interval().await;
                debug!("next scheduled refresh in {}s", interval.as_secs());
            }
        });
    }

    /// Cancel the pending scheduler loop, if any.
    pub fn stop_auto_refresh(&self) {
        if let Some(token) = lock_slot(&self.scheduler_slot).take() {
            token.cancel();
            info!("auto refresh stopped");
        }
    }

    /// Cancel the pending settle/kickoff task, if any.
    pub fn cancel_settle(&self) {
        if let Some(token) = lock_slot(&self.settle_slot).take() {
            token.cancel();
        }
    }

    /// Whether a scheduler loop is currently armed.
    #[must_use]
    pub fn scheduler_armed(&self) -> bool {
        lock_slot(&self.scheduler_slot).is_some()
    }

    async fn next_interval(&self) -> Duration {
        let backoff = self.state.read().await.backoff;
        compute_next_interval(&self.timing, &backoff)
    }
}

fn lock_slot(slot: &TimerSlot) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

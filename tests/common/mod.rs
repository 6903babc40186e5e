//! Shared test doubles and builders for the integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use ads_metrics_overlay::application::{RefreshOrchestrator, RefreshTiming, SharedSession};
use ads_metrics_overlay::domain::model::{
    FetchOutcome, MetricRow, RefreshRequestParams, ToastKind,
};
use ads_metrics_overlay::domain::{AnnotationSink, MetricsFetch, SettingsProvider};
use ads_metrics_overlay::infrastructure::config::InMemorySettingsProvider;
use ads_metrics_overlay::infrastructure::page_context::{read_context, StaticPageProvider};
use ads_metrics_overlay::infrastructure::status_broadcaster::StatusBroadcaster;
use ads_metrics_overlay::infrastructure::table_index::TableIndexMapper;

pub const CAMPAIGN_URL: &str = "https://www.facebook.com/adsmanager/manage/campaigns?act=42";
pub const ADSET_URL: &str =
    "https://www.facebook.com/adsmanager/manage/adsets?act=42&selected_campaign_ids=900";

pub fn metric_row(id: &str) -> MetricRow {
    MetricRow {
        id: id.to_string(),
        checkout_count: 3,
        payment_count: 1,
        payment_amount: 25.0,
    }
}

/// Build a role-annotated table like the host renders.
pub fn table_html(header: &[&str], rows: &[&[&str]]) -> String {
    let head: String = header
        .iter()
        .map(|c| format!(r#"<div role="columnheader">{c}</div>"#))
        .collect();
    let body: String = rows
        .iter()
        .map(|row| {
            let cells: String =
                row.iter().map(|c| format!(r#"<div role="cell">{c}</div>"#)).collect();
            format!(r#"<div role="row">{cells}</div>"#)
        })
        .collect();
    format!(r#"<div role="table"><div role="row">{head}</div>{body}</div>"#)
}

/// A ready campaign page showing the given campaign ids.
pub fn campaign_page(ids: &[&str]) -> StaticPageProvider {
    let page = StaticPageProvider::new(CAMPAIGN_URL);
    let rows: Vec<Vec<&str>> = ids.iter().map(|id| vec![*id, "$1.00"]).collect();
    let row_refs: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    page.set_table_html(Some(table_html(&["Campaign ID", "Amount spent"], &row_refs)));
    page.set_stats_range_text(Some("2025-07-01 – 2025-07-31".to_string()));
    page
}

/// Swap an existing page over to the ad-set view with the given ids.
pub fn switch_to_adset_view(page: &StaticPageProvider, ids: &[&str]) {
    page.set_url(ADSET_URL);
    let rows: Vec<Vec<&str>> = ids.iter().map(|id| vec![*id, "$1.00"]).collect();
    let row_refs: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    page.set_table_html(Some(table_html(&["Ad set ID", "Amount spent"], &row_refs)));
}

/// Fetch double fed from a script of outcomes; repeats the last one forever.
pub struct ScriptedFetch {
    script: Mutex<VecDeque<FetchOutcome>>,
    fallback: FetchOutcome,
    calls: AtomicUsize,
    seen_params: Mutex<Vec<RefreshRequestParams>>,
}

impl ScriptedFetch {
    pub fn new(script: Vec<FetchOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: FetchOutcome::Rows(vec![metric_row("1001")]),
            calls: AtomicUsize::new(0),
            seen_params: Mutex::new(Vec::new()),
        })
    }

    pub fn always_rows() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_params(&self) -> Vec<RefreshRequestParams> {
        self.seen_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsFetch for ScriptedFetch {
    async fn fetch(&self, params: &RefreshRequestParams) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_params.lock().unwrap().push(params.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// Fetch double that blocks until released, for in-flight scenarios.
pub struct GatedFetch {
    gate: Semaphore,
    calls: AtomicUsize,
    seen_params: Mutex<Vec<RefreshRequestParams>>,
}

impl GatedFetch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            seen_params: Mutex::new(Vec::new()),
        })
    }

    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_params(&self) -> Vec<RefreshRequestParams> {
        self.seen_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsFetch for GatedFetch {
    async fn fetch(&self, params: &RefreshRequestParams) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_params.lock().unwrap().push(params.clone());
        let _permit = self.gate.acquire().await.expect("gate closed");
        FetchOutcome::Rows(vec![metric_row("gated")])
    }
}

/// What the display collaborator was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Render(usize),
    Clear,
    Toast(String),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Render + clear calls, i.e. "display updates".
    pub fn display_updates(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Render(_) | SinkEvent::Clear))
            .count()
    }

    pub fn toasts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Toast(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn error_toasts(&self) -> Vec<String> {
        self.toasts().into_iter().filter(|t| t.contains("failed")).collect()
    }
}

impl AnnotationSink for RecordingSink {
    fn render_annotations(&self, rows: &[MetricRow]) {
        self.events.lock().unwrap().push(SinkEvent::Render(rows.len()));
    }

    fn clear_annotations(&self) {
        self.events.lock().unwrap().push(SinkEvent::Clear);
    }

    fn toast(&self, message: &str, _kind: ToastKind) {
        self.events.lock().unwrap().push(SinkEvent::Toast(message.to_string()));
    }
}

/// Timing with a long base interval so scheduler ticks never interfere
/// unless a test opts in.
pub fn quiet_timing() -> RefreshTiming {
    RefreshTiming {
        base_interval: Duration::from_secs(3600),
        cache_freshness: Duration::from_secs(300),
        error_backoff_cap: Duration::from_secs(1800),
        empty_backoff_cap: Duration::from_secs(3600),
        settle_delay: Duration::from_secs(3600),
    }
}

pub struct Harness {
    pub state: SharedSession,
    pub page: StaticPageProvider,
    pub sink: Arc<RecordingSink>,
    pub settings: Arc<InMemorySettingsProvider>,
    pub mapper: Arc<TableIndexMapper>,
    pub broadcaster: StatusBroadcaster,
    pub orchestrator: RefreshOrchestrator,
}

/// Wire an orchestrator over the given page and fetch double, with the
/// session context seeded from the page.
pub async fn build_harness(
    page: StaticPageProvider,
    fetcher: Arc<dyn MetricsFetch>,
    timing: RefreshTiming,
) -> Harness {
    let state = SharedSession::new();
    let sink = RecordingSink::new();
    let settings = Arc::new(InMemorySettingsProvider::default());
    let mapper = Arc::new(TableIndexMapper::new());
    let broadcaster = StatusBroadcaster::new();

    {
        let mut session = state.write().await;
        session.initialized = true;
        session.context = read_context(&page);
    }

    let settings_provider: Arc<dyn SettingsProvider> = settings.clone();
    let annotation_sink: Arc<dyn AnnotationSink> = sink.clone();
    let orchestrator = RefreshOrchestrator::new(
        state.clone(),
        Arc::new(page.clone()),
        fetcher,
        settings_provider,
        annotation_sink,
        Arc::clone(&mapper),
        broadcaster.clone(),
        timing,
    );

    Harness { state, page, sink, settings, mapper, broadcaster, orchestrator }
}

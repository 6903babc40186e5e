//! Integration tests for the single-flight refresh algorithm: request
//! dedup, manual bypass, empty-page handling, backoff streaks and the
//! first-error notice.

mod common;

use std::time::Duration;

use ads_metrics_overlay::domain::model::{AreaKind, FetchOutcome};

use common::*;

#[tokio::test(start_paused = true)]
async fn identical_params_within_freshness_window_fetch_once() {
    let fetch = ScriptedFetch::always_rows();
    let harness =
        build_harness(campaign_page(&["1001", "1002"]), fetch.clone(), quiet_timing()).await;

    harness.orchestrator.refresh_data(false).await;
    harness.orchestrator.refresh_data(false).await;
    assert_eq!(fetch.calls(), 1, "second call with unchanged params must be deduplicated");

    // A different rendered window produces different params and goes through.
    switch_rows(&harness, &["1001", "1003"]);
    harness.orchestrator.refresh_data(false).await;
    assert_eq!(fetch.calls(), 2);
}

fn switch_rows(harness: &Harness, ids: &[&str]) {
    let rows: Vec<Vec<&str>> = ids.iter().map(|id| vec![*id, "$1.00"]).collect();
    let row_refs: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    harness
        .page
        .set_table_html(Some(table_html(&["Campaign ID", "Amount spent"], &row_refs)));
}

#[tokio::test]
async fn identical_params_after_window_expiry_fetch_again() {
    let fetch = ScriptedFetch::always_rows();
    let mut timing = quiet_timing();
    timing.cache_freshness = Duration::from_millis(50);
    let harness = build_harness(campaign_page(&["1001"]), fetch.clone(), timing).await;

    harness.orchestrator.refresh_data(false).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    harness.orchestrator.refresh_data(false).await;
    assert_eq!(fetch.calls(), 2, "an expired cache entry must not deduplicate");
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_bypasses_cache_and_resets_backoff() {
    let fetch = ScriptedFetch::always_rows();
    let harness = build_harness(campaign_page(&["1001"]), fetch.clone(), quiet_timing()).await;

    harness.orchestrator.refresh_data(false).await;
    assert_eq!(fetch.calls(), 1);

    {
        let mut state = harness.state.write().await;
        state.backoff.consecutive_errors = 2;
        state.backoff.consecutive_empty = 1;
    }

    // Same params, cache still fresh: a manual refresh goes through anyway.
    harness.orchestrator.refresh_data(true).await;
    assert_eq!(fetch.calls(), 2);

    let state = harness.state.snapshot().await;
    assert!(state.backoff.is_clear());
    assert!(state.current_data.is_some());
}

#[tokio::test(start_paused = true)]
async fn zero_identifiers_skip_network_and_update_display_once() {
    let fetch = ScriptedFetch::always_rows();
    let page = campaign_page(&[]);
    let harness = build_harness(page, fetch.clone(), quiet_timing()).await;

    // Stale data from a previous window must be cleared.
    harness.state.write().await.current_data = Some(vec![metric_row("old")]);

    harness.orchestrator.refresh_data(false).await;

    assert_eq!(fetch.calls(), 0, "an empty page must not hit the network");
    let state = harness.state.snapshot().await;
    assert!(state.current_data.is_none());
    assert_eq!(harness.sink.display_updates(), 1, "display updates exactly once");
}

#[tokio::test(start_paused = true)]
async fn empty_results_back_off_and_success_resets_the_streaks() {
    let fetch = ScriptedFetch::new(vec![
        FetchOutcome::Empty,
        FetchOutcome::Empty,
        FetchOutcome::Rows(vec![metric_row("1001")]),
    ]);
    let mut timing = quiet_timing();
    timing.cache_freshness = Duration::ZERO;
    let harness = build_harness(campaign_page(&["1001"]), fetch.clone(), timing).await;

    harness.orchestrator.refresh_data(false).await;
    harness.orchestrator.refresh_data(false).await;
    {
        let state = harness.state.snapshot().await;
        assert_eq!(state.backoff.consecutive_empty, 2);
        assert_eq!(state.backoff.consecutive_errors, 0);
        assert!(state.current_data.is_none());
    }

    harness.orchestrator.refresh_data(false).await;
    let state = harness.state.snapshot().await;
    assert!(state.backoff.is_clear(), "a successful non-empty refresh zeroes both counters");
    assert_eq!(state.current_data.as_ref().map(Vec::len), Some(1));
    assert!(state.last_update_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn only_the_first_error_of_a_streak_raises_a_notice() {
    let fetch = ScriptedFetch::new(vec![
        FetchOutcome::Failed("HTTP 502".into()),
        FetchOutcome::Failed("HTTP 502".into()),
        FetchOutcome::Failed("HTTP 502".into()),
    ]);
    let harness = build_harness(campaign_page(&["1001"]), fetch.clone(), quiet_timing()).await;

    harness.orchestrator.refresh_data(false).await;
    harness.orchestrator.refresh_data(false).await;
    harness.orchestrator.refresh_data(false).await;

    assert_eq!(fetch.calls(), 3, "failures are never cached");
    let state = harness.state.snapshot().await;
    assert_eq!(state.backoff.consecutive_errors, 3);
    assert_eq!(harness.sink.error_toasts().len(), 1, "no notification spam on repeats");
}

#[tokio::test(start_paused = true)]
async fn reentrant_refresh_triggers_are_dropped_not_queued() {
    let fetch = GatedFetch::new();
    let harness = build_harness(campaign_page(&["1001"]), fetch.clone(), quiet_timing()).await;

    let orchestrator = harness.orchestrator.clone();
    let in_flight = tokio::spawn(async move {
        orchestrator.refresh_data(false).await;
    });

    while fetch.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // A second trigger while the fetch is pending returns immediately.
    harness.orchestrator.refresh_data(false).await;
    assert_eq!(fetch.calls(), 1, "concurrent trigger must not start a second fetch");
    assert_eq!(harness.sink.display_updates(), 0, "the dropped trigger produces no display work");

    fetch.release_one();
    in_flight.await.unwrap();

    let state = harness.state.snapshot().await;
    assert!(!state.is_refreshing);
    assert!(state.current_data.is_some());
}

#[tokio::test(start_paused = true)]
async fn every_refresh_broadcasts_a_status_snapshot() {
    let fetch = ScriptedFetch::always_rows();
    let harness = build_harness(campaign_page(&["1001"]), fetch, quiet_timing()).await;
    let mut status_rx = harness.broadcaster.subscribe();

    harness.orchestrator.refresh_data(false).await;

    let snapshot = status_rx.recv().await.unwrap();
    assert_eq!(snapshot.area_kind, AreaKind::Campaign);
    assert_eq!(snapshot.account_id.as_deref(), Some("42"));
}

#[tokio::test(start_paused = true)]
async fn reporting_toggle_turns_handle_data_update_into_a_noop() {
    let fetch = ScriptedFetch::always_rows();
    let harness = build_harness(campaign_page(&["1001"]), fetch.clone(), quiet_timing()).await;

    harness.state.write().await.features.enable_reporting = false;
    harness.orchestrator.handle_data_update(false).await;
    harness.orchestrator.handle_data_update(true).await;

    assert_eq!(fetch.calls(), 0);
    assert_eq!(harness.sink.display_updates(), 0);
}

#[tokio::test(start_paused = true)]
async fn parent_selection_from_the_url_joins_the_request() {
    let fetch = ScriptedFetch::always_rows();
    let page = campaign_page(&[]);
    switch_to_adset_view(&page, &["7001", "7002"]);
    let harness = build_harness(page, fetch.clone(), quiet_timing()).await;

    harness.orchestrator.refresh_data(false).await;

    let params = fetch.seen_params();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].adset_ids, vec!["7001".to_string(), "7002".to_string()]);
    assert_eq!(params[0].campaign_ids, vec!["900".to_string()], "parent campaign id rides along");
}

//! Change classification over structural page events.
//!
//! The embedder forwards raw mutation and scroll events; everything else
//! happens here: significance filtering, debouncing, and the
//! NONE / navigation / in-place decision over `last_area_kind` (the area
//! recorded in the shared session context).

use std::sync::Arc;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::debounce::Debouncer;
use crate::application::refresh_orchestrator::RefreshOrchestrator;
use crate::application::session_state::SharedSession;
use crate::domain::model::AreaKind;
use crate::domain::PageProvider;
use crate::infrastructure::page_context;

/// Raw structural events observed on the hosting page.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Nodes were added somewhere under the table subtree; each entry is the
    /// serialized fragment of one added node.
    Mutation { added_fragments: Vec<String> },
    /// Coarse scroll/wheel input; `within_table` is whether the event target
    /// sits inside the table region.
    Scroll { within_table: bool },
}

static PROGRESS_BAR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[role="progressbar"]"#).expect("static selector"));

/// A mutation is significant only when an added node is recognizable as a
/// loading indicator, i.e. the table is re-rendering rather than merely
/// highlighting.
#[must_use]
pub fn is_significant_mutation(added_fragments: &[String]) -> bool {
    added_fragments.iter().any(|fragment| {
        Html::parse_fragment(fragment).select(&PROGRESS_BAR).next().is_some()
    })
}

/// Cloneable classifier handle; clones share the debouncers and stop token.
#[derive(Clone)]
pub struct ChangeClassifier {
    mutation_debouncer: Debouncer,
    scroll_debouncer: Debouncer,
    shutdown: CancellationToken,
}

impl ChangeClassifier {
    #[must_use]
    pub fn new(
        state: SharedSession,
        page: Arc<dyn PageProvider>,
        orchestrator: RefreshOrchestrator,
        mutation_debounce: std::time::Duration,
        scroll_debounce: std::time::Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let mutation_debouncer = {
            let state = state.clone();
            let page = Arc::clone(&page);
            let orchestrator = orchestrator.clone();
            let shutdown = shutdown.clone();
            Debouncer::new(mutation_debounce, move || {
                let state = state.clone();
                let page = Arc::clone(&page);
                let orchestrator = orchestrator.clone();
                let shutdown = shutdown.clone();
                Box::pin(async move {
                    handle_settled_change(&state, &page, &orchestrator, &shutdown).await;
                })
            })
        };

        // Pagination scroll gets its own path so new rows are picked up
        // without waiting for the mutation stream to settle.
        let scroll_debouncer = {
            let orchestrator = orchestrator.clone();
            Debouncer::new(scroll_debounce, move || {
                let orchestrator = orchestrator.clone();
                Box::pin(async move {
                    info!("table scroll settled, refreshing visible data");
                    orchestrator.handle_data_update(false).await;
                })
            })
        };

        Self { mutation_debouncer, scroll_debouncer, shutdown }
    }

    /// Consume events until the channel closes or the classifier is stopped.
    pub fn spawn(&self, mut events: mpsc::Receiver<PageEvent>) -> JoinHandle<()> {
        let classifier = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = classifier.shutdown.cancelled() => break,
                    maybe_event = events.recv() => match maybe_event {
                        Some(event) => classifier.on_event(event),
                        None => break,
                    },
                }
            }
        })
    }

    /// Feed one raw event through the significance filter and debouncers.
    pub fn on_event(&self, event: PageEvent) {
        if self.shutdown.is_cancelled() {
            return;
        }
        match event {
            PageEvent::Mutation { added_fragments } => {
                if is_significant_mutation(&added_fragments) {
                    self.mutation_debouncer.trigger();
                }
            }
            PageEvent::Scroll { within_table } => {
                if within_table {
                    self.scroll_debouncer.trigger();
                }
            }
        }
    }

    /// Stop observation: cancels the event loop and both pending ticks.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.mutation_debouncer.cancel();
        self.scroll_debouncer.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// One debounced classification pass.
async fn handle_settled_change(
    state: &SharedSession,
    page: &Arc<dyn PageProvider>,
    orchestrator: &RefreshOrchestrator,
    classifier_shutdown: &CancellationToken,
) {
    let url = page.url();
    let new_area = page_context::area_kind_from_url(&url);

    if new_area == AreaKind::None {
        if page_context::is_managed_url(&url) {
            // Still inside the application, just not on a list view.
            return;
        }
        warn!("left the managed application, stopping observation");
        orchestrator.stop_auto_refresh();
        orchestrator.cancel_settle();
        state.write().await.session_ended = true;
        classifier_shutdown.cancel();
        return;
    }

    let last_area = state.read().await.context.area_kind;
    if new_area != last_area {
        info!("🔔 area switch detected: '{last_area}' -> '{new_area}'");
        orchestrator.perform_full_reset(new_area).await;
        return;
    }

    // In-place refresh. The date range is re-derived for bookkeeping only;
    // the orchestrator's parameter-equality check decides whether the
    // network is actually hit.
    let fresh_range = page_context::date_range_of(page.as_ref());
    {
        let mut session = state.write().await;
        if session.context.date_range != fresh_range {
            info!(
                "date range change detected: {} -> {}",
                session.context.date_range, fresh_range
            );
            session.context.date_range = fresh_range;
        }
    }
    orchestrator.handle_data_update(false).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_indicator_fragments_are_significant() {
        let fragments = vec![
            r#"<div class="highlight"></div>"#.to_string(),
            r#"<div><span role="progressbar"></span></div>"#.to_string(),
        ];
        assert!(is_significant_mutation(&fragments));
    }

    #[test]
    fn plain_highlight_churn_is_ignored() {
        let fragments = vec![
            r#"<div class="hover-highlight"></div>"#.to_string(),
            r#"<td>$12.34</td>"#.to_string(),
        ];
        assert!(!is_significant_mutation(&fragments));
        assert!(!is_significant_mutation(&[]));
    }

    #[test]
    fn the_indicator_itself_matches_too() {
        let fragments = vec![r#"<div role="progressbar"></div>"#.to_string()];
        assert!(is_significant_mutation(&fragments));
    }
}

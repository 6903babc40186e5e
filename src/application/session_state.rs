//! Shared session state.
//!
//! One explicit, injectable record owned by the coordinator; every component
//! receives the handle rather than reaching for a process-wide singleton.
//! Reset on navigation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::model::{
    AreaKind, BackoffState, FeatureConfig, IdentifierSet, MetricRow, PageContext, ParentIds,
    RefreshCacheEntry,
};
use crate::infrastructure::page_context::default_date_range;

/// The mutable session record.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub initialized: bool,
    /// Set once the session observed that the host left the managed
    /// application; everything is stopped at that point.
    pub session_ended: bool,
    /// Page-derived context, replaced wholesale on navigation.
    pub context: PageContext,
    pub features: FeatureConfig,
    /// Identifiers extracted from the currently rendered rows.
    pub visible_ids: IdentifierSet,
    /// Latest metrics handed to the display collaborator, if any.
    pub current_data: Option<Vec<MetricRow>>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub backoff: BackoffState,
    /// The single remembered prior request (dedup slot).
    pub request_cache: Option<RefreshCacheEntry>,
    /// Single-flight guard; re-entrant refresh triggers are dropped while set.
    pub is_refreshing: bool,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            session_ended: false,
            context: PageContext {
                area_kind: AreaKind::None,
                account_id: None,
                date_range: default_date_range(),
                parent_ids: ParentIds::default(),
            },
            features: FeatureConfig::default(),
            visible_ids: IdentifierSet::default(),
            current_data: None,
            last_update_at: None,
            backoff: BackoffState::default(),
            request_cache: None,
            is_refreshing: false,
        }
    }

    /// Clear everything data-related; called as part of the navigation reset.
    pub fn reset_data_state(&mut self) {
        self.visible_ids.clear();
        self.current_data = None;
        self.backoff.reset();
        self.request_cache = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle to the session record.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<SessionState>>,
}

impl SharedSession {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(SessionState::new())) }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.write().await
    }

    /// Copy of the whole record, for status surfaces and assertions.
    pub async fn snapshot(&self) -> SessionState {
        self.inner.read().await.clone()
    }
}

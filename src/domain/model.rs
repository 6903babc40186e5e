//! Core value types shared across the refresh pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which of the managed list views the page currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaKind {
    Campaign,
    Adset,
    Ad,
    /// Not on a recognized list view (or not on the managed application at all).
    None,
}

impl AreaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::Adset => "adset",
            Self::Ad => "ad",
            Self::None => "none",
        }
    }

    /// True for the three recognized list views.
    #[must_use]
    pub fn is_managed_view(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for AreaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive reporting date range, canonically serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} – {}", self.start, self.end)
    }
}

/// Parent selection carried in the host URL on ad-set and ad views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentIds {
    pub campaign_id: Option<String>,
    pub adset_id: Option<String>,
}

/// Everything derived from the host page at navigation time.
///
/// Immutable per navigation epoch; replaced wholesale when the area changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub area_kind: AreaKind,
    pub account_id: Option<String>,
    pub date_range: DateRange,
    pub parent_ids: ParentIds,
}

/// Deduplicated identifiers extracted from the currently rendered rows.
///
/// Order-irrelevant by construction; a `BTreeSet` also gives the canonical
/// ordering the request fingerprint relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet {
    pub campaign_ids: BTreeSet<String>,
    pub adset_ids: BTreeSet<String>,
    pub ad_ids: BTreeSet<String>,
}

impl IdentifierSet {
    /// Total identifier count across all three entity types.
    #[must_use]
    pub fn total(&self) -> usize {
        self.campaign_ids.len() + self.adset_ids.len() + self.ad_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn clear(&mut self) {
        self.campaign_ids.clear();
        self.adset_ids.clear();
        self.ad_ids.clear();
    }
}

/// The exact tuple handed to the metrics fetch collaborator.
///
/// Two params are equal iff their canonical serialization matches; the id
/// vectors are sorted at construction so field order alone determines the
/// serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequestParams {
    pub campaign_ids: Vec<String>,
    pub adset_ids: Vec<String>,
    pub ad_ids: Vec<String>,
    pub account_id: Option<String>,
    pub date_range: DateRange,
}

impl RefreshRequestParams {
    /// Assemble params from the deduplicated sets plus parent selection.
    ///
    /// Parent ids join the matching set; the `BTreeSet` pass keeps the result
    /// deduplicated and sorted even when a parent id is also visible in a row.
    #[must_use]
    pub fn assemble(
        ids: &IdentifierSet,
        parents: &ParentIds,
        account_id: Option<String>,
        date_range: DateRange,
    ) -> Self {
        let mut campaign_ids = ids.campaign_ids.clone();
        let mut adset_ids = ids.adset_ids.clone();
        if let Some(cid) = &parents.campaign_id {
            campaign_ids.insert(cid.clone());
        }
        if let Some(aid) = &parents.adset_id {
            adset_ids.insert(aid.clone());
        }
        Self {
            campaign_ids: campaign_ids.into_iter().collect(),
            adset_ids: adset_ids.into_iter().collect(),
            ad_ids: ids.ad_ids.iter().cloned().collect(),
            account_id,
            date_range,
        }
    }

    #[must_use]
    pub fn total_id_count(&self) -> usize {
        self.campaign_ids.len() + self.adset_ids.len() + self.ad_ids.len()
    }

    /// Content fingerprint over the canonical serialization.
    #[must_use]
    pub fn fingerprint(&self) -> blake3::Hash {
        // Serialization of this struct cannot fail: strings and dates only.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&canonical)
    }
}

/// The single remembered prior request. Not a general cache.
#[derive(Debug, Clone, Copy)]
pub struct RefreshCacheEntry {
    pub fingerprint: blake3::Hash,
    pub requested_at: Instant,
}

impl RefreshCacheEntry {
    #[must_use]
    pub fn now(fingerprint: blake3::Hash) -> Self {
        Self { fingerprint, requested_at: Instant::now() }
    }

    /// Whether this entry still deduplicates a request within `window`.
    #[must_use]
    pub fn is_fresh(&self, window: Duration) -> bool {
        self.requested_at.elapsed() < window
    }

    #[must_use]
    pub fn matches(&self, fingerprint: &blake3::Hash, window: Duration) -> bool {
        self.fingerprint == *fingerprint && self.is_fresh(window)
    }
}

/// Consecutive failure / empty-result streaks driving the adaptive interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub consecutive_errors: u32,
    pub consecutive_empty: u32,
}

impl BackoffState {
    pub fn reset(&mut self) {
        self.consecutive_errors = 0;
        self.consecutive_empty = 0;
    }

    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.consecutive_errors == 0 && self.consecutive_empty == 0
    }
}

/// One annotated metrics row from the external API. Consumed, not owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub id: String,
    #[serde(default)]
    pub checkout_count: u64,
    #[serde(default)]
    pub payment_count: u64,
    #[serde(default)]
    pub payment_amount: f64,
}

/// Outcome of one metrics fetch. Call sites match exhaustively.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Rows(Vec<MetricRow>),
    Empty,
    Failed(String),
}

/// Feature toggles polled from the settings collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub auto_refresh: bool,
    pub enable_reporting: bool,
    pub show_status_indicator: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { auto_refresh: true, enable_reporting: true, show_status_indicator: true }
    }
}

/// Best-effort status payload broadcast after every refresh attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub area_kind: AreaKind,
    pub account_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Severity of a user-facing notice handed to the display collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

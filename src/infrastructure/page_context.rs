//! Page-context derivation: area kind, account id, parent selection and the
//! reporting date range, all read from the hosting page at call time.
//!
//! Date-range captions appear in several formats depending on the host
//! locale; parsing tries each known shape and falls back to a trailing
//! 30-day range.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::domain::constants::{query, site};
use crate::domain::model::{AreaKind, DateRange, PageContext, ParentIds};
use crate::domain::PageProvider;

/// Whether the URL belongs to the managed application at all.
#[must_use]
pub fn is_managed_url(url: &str) -> bool {
    url.contains(site::MANAGED_PATH)
}

/// Which list view the URL points at.
#[must_use]
pub fn area_kind_from_url(url: &str) -> AreaKind {
    if url.contains(site::CAMPAIGNS_PATH) {
        AreaKind::Campaign
    } else if url.contains(site::ADSETS_PATH) {
        AreaKind::Adset
    } else if url.contains(site::ADS_PATH) {
        AreaKind::Ad
    } else {
        AreaKind::None
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Ad account id from the URL query.
#[must_use]
pub fn account_id_from_url(url: &str) -> Option<String> {
    query_param(url, query::ACCOUNT_ID)
}

/// Parent campaign/ad-set selection carried in the URL on drill-down views.
#[must_use]
pub fn parent_ids_from_url(url: &str, area_kind: AreaKind) -> ParentIds {
    let mut parents = ParentIds::default();
    if matches!(area_kind, AreaKind::Adset | AreaKind::Ad) {
        parents.campaign_id = query_param(url, query::SELECTED_CAMPAIGN_IDS);
    }
    if area_kind == AreaKind::Ad {
        parents.adset_id = query_param(url, query::SELECTED_ADSET_IDS);
    }
    parents
}

// CJK caption, e.g. "2025年7月28日 – 2025年8月26日".
static CJK_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日\s*[–—-]\s*(\d{4})年(\d{1,2})月(\d{1,2})日")
        .expect("static regex")
});
// English caption, e.g. "Jul 28, 2025 – Aug 26, 2025".
static EN_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z]{3})\s+(\d{1,2}),\s+(\d{4})\s*[–—-]\s*([A-Za-z]{3})\s+(\d{1,2}),\s+(\d{4})")
        .expect("static regex")
});
// ISO caption, e.g. "2025-07-28 – 2025-08-26".
static ISO_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})\s*[–—-]\s*(\d{4})-(\d{1,2})-(\d{1,2})")
        .expect("static regex")
});
// Short caption, e.g. "7/28/2025 – 8/26/2025".
static SHORT_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})\s*[–—-]\s*(\d{1,2})/(\d{1,2})/(\d{4})")
        .expect("static regex")
});

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn month_name(mon: &str, day: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{mon} {day} {year}"), "%b %d %Y").ok()
}

/// Parse a date-range caption; `None` when no known shape matches.
#[must_use]
pub fn parse_date_range(text: &str) -> Option<DateRange> {
    if let Some(c) = CJK_RANGE.captures(text) {
        let start = ymd(&c[1], &c[2], &c[3])?;
        let end = ymd(&c[4], &c[5], &c[6])?;
        return Some(DateRange { start, end });
    }
    if let Some(c) = EN_RANGE.captures(text) {
        let start = month_name(&c[1], &c[2], &c[3])?;
        let end = month_name(&c[4], &c[5], &c[6])?;
        return Some(DateRange { start, end });
    }
    if let Some(c) = ISO_RANGE.captures(text) {
        let start = ymd(&c[1], &c[2], &c[3])?;
        let end = ymd(&c[4], &c[5], &c[6])?;
        return Some(DateRange { start, end });
    }
    if let Some(c) = SHORT_RANGE.captures(text) {
        let start = ymd(&c[3], &c[1], &c[2])?;
        let end = ymd(&c[6], &c[4], &c[5])?;
        return Some(DateRange { start, end });
    }
    None
}

/// Trailing 30-day range ending today, used when the caption is missing or
/// unparseable.
#[must_use]
pub fn default_date_range() -> DateRange {
    let end = Utc::now().date_naive();
    DateRange { start: end - ChronoDuration::days(30), end }
}

/// Current date range as shown by the page, with fallback.
#[must_use]
pub fn date_range_of(page: &dyn PageProvider) -> DateRange {
    match page.stats_range_text().as_deref().and_then(parse_date_range) {
        Some(range) => range,
        None => {
            warn!("Date range caption missing or unparseable, using default 30-day range");
            default_date_range()
        }
    }
}

/// Read a complete [`PageContext`] from the page.
#[must_use]
pub fn read_context(page: &dyn PageProvider) -> PageContext {
    let url = page.url();
    let area_kind = area_kind_from_url(&url);
    let context = PageContext {
        area_kind,
        account_id: account_id_from_url(&url),
        date_range: date_range_of(page),
        parent_ids: parent_ids_from_url(&url, area_kind),
    };
    debug!(area = %context.area_kind, account = ?context.account_id, "page context read");
    context
}

/// Whether the anchors the pipeline depends on are rendered.
#[must_use]
pub fn page_ready(page: &dyn PageProvider) -> bool {
    page.table_html().is_some() && page.stats_range_text().is_some()
}

#[derive(Debug, Default)]
struct Snapshot {
    url: String,
    table_html: Option<String>,
    stats_range_text: Option<String>,
}

/// [`PageProvider`] over an explicitly updated snapshot.
///
/// Embedders feed it the host page's current URL and table region; the test
/// suites drive it directly.
#[derive(Debug, Clone, Default)]
pub struct StaticPageProvider {
    inner: std::sync::Arc<std::sync::RwLock<Snapshot>>,
}

impl StaticPageProvider {
    #[must_use]
    pub fn new(url: &str) -> Self {
        let provider = Self::default();
        provider.set_url(url);
        provider
    }

    pub fn set_url(&self, url: &str) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.url = url.to_string();
        }
    }

    pub fn set_table_html(&self, html: Option<String>) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.table_html = html;
        }
    }

    pub fn set_stats_range_text(&self, text: Option<String>) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.stats_range_text = text;
        }
    }
}

impl PageProvider for StaticPageProvider {
    fn url(&self) -> String {
        self.inner.read().map(|s| s.url.clone()).unwrap_or_default()
    }

    fn table_html(&self) -> Option<String> {
        self.inner.read().ok().and_then(|s| s.table_html.clone())
    }

    fn stats_range_text(&self) -> Option<String> {
        self.inner.read().ok().and_then(|s| s.stats_range_text.clone())
    }
}

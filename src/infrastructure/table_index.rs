//! Table header scanning and column resolution.
//!
//! The host table is rendered with ARIA roles; the header region is scanned
//! once per navigation epoch and each expected logical column is matched
//! against its known header labels. Columns the current page does not show
//! stay unresolved, which downstream consumers treat as "feature unavailable
//! for this page" rather than an error.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

/// Logical columns the pipeline knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    CampaignId,
    AdsetId,
    AdId,
    CheckoutCount,
    PaymentCount,
    Roas,
    AmountSpent,
}

impl ColumnKey {
    pub const ALL: [Self; 7] = [
        Self::CampaignId,
        Self::AdsetId,
        Self::AdId,
        Self::CheckoutCount,
        Self::PaymentCount,
        Self::Roas,
        Self::AmountSpent,
    ];

    /// Known header labels for this column, lowercased. The host renders
    /// slightly different captions across locales and layout versions, so
    /// each key carries a small alias list.
    #[must_use]
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Self::CampaignId => &["campaign id"],
            Self::AdsetId => &["ad set id", "adset id"],
            Self::AdId => &["ad id"],
            Self::CheckoutCount => &["checkouts initiated", "initiate checkout"],
            Self::PaymentCount => &["results", "purchases"],
            Self::Roas => &["purchase roas (return on ad spend)", "purchase roas"],
            Self::AmountSpent => &["amount spent"],
        }
    }
}

/// Mapping from logical column key to header position.
///
/// Absent keys are unresolved. Never partially stale: the mapper either hands
/// out a freshly built map or an empty one, and `invalidate` wipes the whole
/// cached map at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndexMap {
    indices: HashMap<ColumnKey, usize>,
}

impl ColumnIndexMap {
    /// Position of `key` in the header, or `None` when this page does not
    /// show the column.
    #[must_use]
    pub fn index(&self, key: ColumnKey) -> Option<usize> {
        self.indices.get(&key).copied()
    }

    #[must_use]
    pub fn is_resolved(&self, key: ColumnKey) -> bool {
        self.indices.contains_key(&key)
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.indices.len()
    }
}

static HEADER_CELLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[role="columnheader"]"#).expect("static selector"));

/// Resolves and caches the column map for the current navigation epoch.
pub struct TableIndexMapper {
    cached: Mutex<Option<ColumnIndexMap>>,
}

impl TableIndexMapper {
    #[must_use]
    pub fn new() -> Self {
        Self { cached: Mutex::new(None) }
    }

    /// Return the cached map, building it from `table_html` on first use.
    /// Idempotent once resolved; O(header cell count) on rebuild.
    #[must_use]
    pub fn resolve(&self, table_html: &str) -> ColumnIndexMap {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(map) = cached.as_ref() {
            return map.clone();
        }
        let map = build_column_map(table_html);
        debug!(resolved = map.resolved_count(), "column index map rebuilt");
        *cached = Some(map.clone());
        map
    }

    /// Force the next `resolve` to rebuild from scratch.
    pub fn invalidate(&self) {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cached = None;
    }
}

impl Default for TableIndexMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// One pass over the header cells, matching trimmed text against the label
/// catalog. The first matching cell wins for each key.
fn build_column_map(table_html: &str) -> ColumnIndexMap {
    let fragment = Html::parse_fragment(table_html);
    let mut indices = HashMap::new();

    for (position, cell) in fragment.select(&HEADER_CELLS).enumerate() {
        let caption = cell.text().collect::<String>().trim().to_lowercase();
        if caption.is_empty() {
            continue;
        }
        for key in ColumnKey::ALL {
            if indices.contains_key(&key) {
                continue;
            }
            if key.labels().iter().any(|label| caption == *label) {
                indices.insert(key, position);
            }
        }
    }

    ColumnIndexMap { indices }
}

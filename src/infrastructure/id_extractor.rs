//! Identifier extraction from the currently rendered table rows.
//!
//! A pure read: the extractor walks the rendered rows (a viewport/pagination
//! window, not the full remote dataset) through the resolved column indices
//! and hands back deduplicated identifier sets. It never mutates the page and
//! never schedules anything.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::trace;

use crate::domain::model::IdentifierSet;
use crate::infrastructure::table_index::{ColumnIndexMap, ColumnKey};

static ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[role="row"]"#).expect("static selector"));
static CELLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[role="cell"], [role="gridcell"]"#).expect("static selector"));

/// Extract the identifiers visible in `table_html`.
///
/// Cell values are trimmed and empty strings excluded; each entity set is
/// deduplicated here so downstream consumers receive canonical sets. Columns
/// the map could not resolve contribute nothing.
#[must_use]
pub fn extract_visible_ids(table_html: &str, map: &ColumnIndexMap) -> IdentifierSet {
    let fragment = Html::parse_fragment(table_html);
    let mut ids = IdentifierSet::default();

    for row in fragment.select(&ROWS) {
        let cells: Vec<ElementRef<'_>> = row.select(&CELLS).collect();
        if cells.is_empty() {
            // Header row: columnheader cells only.
            continue;
        }
        collect_cell(&cells, map.index(ColumnKey::CampaignId), &mut ids.campaign_ids);
        collect_cell(&cells, map.index(ColumnKey::AdsetId), &mut ids.adset_ids);
        collect_cell(&cells, map.index(ColumnKey::AdId), &mut ids.ad_ids);
    }

    trace!(
        campaigns = ids.campaign_ids.len(),
        adsets = ids.adset_ids.len(),
        ads = ids.ad_ids.len(),
        "extracted visible identifiers"
    );
    ids
}

fn collect_cell(
    cells: &[ElementRef<'_>],
    index: Option<usize>,
    into: &mut std::collections::BTreeSet<String>,
) {
    let Some(index) = index else { return };
    let Some(cell) = cells.get(index) else { return };
    let value = cell.text().collect::<String>().trim().to_string();
    if !value.is_empty() {
        into.insert(value);
    }
}

//! Data models for harvested news items and persisted dataset rows.
//!
//! Two shapes flow through the application:
//! - [`NewsItem`]: a title/link pair extracted from the live results page,
//!   keyed by its link for deduplication
//! - [`NewsRecord`]: one row of the CSV dataset, stamped with the harvest date
//!
//! The dataset columns carry the Chinese header names the file has always
//! used; the serde renames keep the Rust field names conventional while the
//! on-disk header stays byte-for-byte stable.

use serde::{Deserialize, Serialize};

/// Fixed dataset column order. A file whose header differs from this in any
/// way (names, order, count) is rejected before anything is written.
pub const DATASET_COLUMNS: [&str; 3] = ["日期", "新闻标题", "详情页链接"];

/// A news item extracted from the results page.
///
/// Identity is the `link` exactly as extracted from the anchor's `href`;
/// no normalization is applied, so URLs differing only in query parameters
/// count as distinct items. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    /// The headline text, whitespace-trimmed.
    pub title: String,
    /// Absolute `http`/`https` URL of the detail page.
    pub link: String,
}

/// One persisted dataset row.
///
/// `date` is the harvest target date in `YYYY-MM-DD` form, not a publication
/// date extracted from the page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewsRecord {
    #[serde(rename = "日期")]
    pub date: String,
    #[serde(rename = "新闻标题")]
    pub title: String,
    #[serde(rename = "详情页链接")]
    pub link: String,
}

impl NewsRecord {
    /// Stamp a harvested item with its row date.
    pub fn from_item(item: &NewsItem, date: &str) -> Self {
        Self {
            date: date.to_string(),
            title: item.title.clone(),
            link: item.link.clone(),
        }
    }
}

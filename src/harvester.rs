//! Incremental scroll/extract loop over one page session.
//!
//! The harvester repeatedly snapshots the DOM, extracts result items, and
//! scrolls for more, until one of four things happens: the target count is
//! reached, the wall-clock budget runs out, the scroll ceiling is hit, or a
//! scroll produces no new page height (a stall; nothing further will load).
//!
//! Deduplication is by link, first seen wins, insertion order preserved.
//! An empty result is a valid outcome, not an error.

use once_cell::sync::Lazy;
use rand::Rng;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::HarvestConfig;
use crate::models::NewsItem;
use crate::session::{PageFetcher, SessionError};

// Structural markers of a result entry on the search page. Version-sensitive:
// a markup change degrades to fewer items, never to a crash.
static RESULT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.result-op.c-container.xpath-log.new-pmd").unwrap());
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.news-title_1YtI1").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Stop conditions for one harvest attempt.
#[derive(Debug, Clone)]
pub struct HarvestLimits {
    pub target_count: usize,
    pub max_scrolls: u32,
    pub time_budget: Duration,
    /// Uniform random pause between scrolls, seconds.
    pub scroll_delay: (f64, f64),
}

impl From<&HarvestConfig> for HarvestLimits {
    fn from(config: &HarvestConfig) -> Self {
        let [a, b] = config.scroll_delay_secs;
        Self {
            target_count: config.target_count,
            max_scrolls: config.max_scrolls,
            time_budget: Duration::from_secs(config.time_budget_secs),
            scroll_delay: (a.min(b), a.max(b)),
        }
    }
}

/// Drive the extract/scroll loop until a stop condition fires.
///
/// Returns the deduplicated items in first-seen order, truncated to the
/// target count. Only page-session failures surface as errors.
#[instrument(level = "info", skip_all, fields(target = limits.target_count))]
pub async fn harvest<F: PageFetcher>(
    fetcher: &F,
    limits: &HarvestLimits,
) -> Result<Vec<NewsItem>, SessionError> {
    let started = Instant::now();
    let mut seen: HashSet<String> = HashSet::new();
    let mut items: Vec<NewsItem> = Vec::new();
    let mut scroll_count: u32 = 0;
    let mut last_height = fetcher.current_height().await?;

    loop {
        let html = fetcher.snapshot().await?;
        let added = extract_items(&html, &mut seen, &mut items);
        debug!(added, total = items.len(), scroll_count, "Extracted result batch");

        if items.len() >= limits.target_count {
            debug!("Target count reached");
            break;
        }
        if started.elapsed() > limits.time_budget {
            info!(collected = items.len(), "Time budget exhausted");
            break;
        }
        if scroll_count >= limits.max_scrolls {
            info!(collected = items.len(), "Scroll ceiling reached");
            break;
        }

        fetcher.scroll_to_bottom().await?;
        scroll_count += 1;
        tokio::time::sleep(scroll_pause(limits.scroll_delay)).await;

        let height = fetcher.current_height().await?;
        if height == last_height {
            info!(height, scroll_count, "Page height unchanged; no further content loads");
            break;
        }
        last_height = height;
    }

    items.truncate(limits.target_count);
    info!(
        count = items.len(),
        scrolls = scroll_count,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Harvest loop finished"
    );
    Ok(items)
}

/// Pull result items out of one DOM snapshot.
///
/// An entry is accepted only with a non-empty title and an absolute
/// `http`/`https` link; links already in `seen` are silently dropped, so the
/// first-seen title wins. Returns how many items this snapshot added.
fn extract_items(html: &str, seen: &mut HashSet<String>, items: &mut Vec<NewsItem>) -> usize {
    let document = Html::parse_document(html);
    let mut added = 0;
    for container in document.select(&RESULT_SELECTOR) {
        let Some(title_el) = container.select(&TITLE_SELECTOR).next() else {
            continue;
        };
        let Some(anchor) = title_el.select(&LINK_SELECTOR).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let title: String = title_el.text().map(str::trim).collect();
        let link = href.trim();
        if title.is_empty() || !has_http_scheme(link) {
            continue;
        }
        if seen.insert(link.to_string()) {
            items.push(NewsItem {
                title,
                link: link.to_string(),
            });
            added += 1;
        }
    }
    added
}

fn has_http_scheme(link: &str) -> bool {
    Url::parse(link)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Anti-detection pacing: a uniform random pause from the configured range.
fn scroll_pause((low, high): (f64, f64)) -> Duration {
    let secs = if high > low {
        rand::rng().random_range(low..=high)
    } else {
        low
    };
    Duration::from_secs_f64(secs.max(0.0))
}

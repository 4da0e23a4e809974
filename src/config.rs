//! Run configuration for the harvester.
//!
//! All tunables live in one immutable [`HarvestConfig`] value that is built
//! once at startup (defaults, then an optional YAML file, then CLI overrides)
//! and passed by reference into the retry controller. Nothing reads
//! configuration from ambient global state.

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

/// Tunables for one harvest run.
///
/// Every field has a default, so an empty (or absent) configuration file is
/// a complete configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// How many deduplicated items one run aims to collect.
    pub target_count: usize,
    /// Date the query is scoped to. Defaults to today when unset.
    pub target_date: Option<NaiveDate>,
    /// Uniform random pause between scrolls, seconds `[low, high]`.
    pub scroll_delay_secs: [f64; 2],
    /// Scroll-count ceiling for one attempt.
    pub max_scrolls: u32,
    /// Wall-clock budget for one harvest attempt, seconds.
    pub time_budget_secs: u64,
    /// Page-load timeout, seconds.
    pub nav_timeout_secs: u64,
    /// Attempt ceiling for transient failures.
    pub retry_attempts: u32,
    /// CSV dataset location.
    pub dataset_path: PathBuf,
    /// User-agent string the browser announces.
    pub user_agent: String,
    /// News search endpoint the date query is issued against.
    pub search_endpoint: String,
    /// Optional search keyword; empty means "all news for the date".
    pub query_keyword: String,
    /// Chrome/Chromium binary location. Autodetected when unset.
    pub browser_binary: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target_count: 51,
            target_date: None,
            scroll_delay_secs: [2.0, 5.0],
            max_scrolls: 10,
            time_budget_secs: 60,
            nav_timeout_secs: 60,
            retry_attempts: 3,
            dataset_path: PathBuf::from("百度新闻.csv"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            search_endpoint: "https://www.baidu.com/s".to_string(),
            query_keyword: String::new(),
            browser_binary: None,
        }
    }
}

impl HarvestConfig {
    /// Load configuration from a YAML file, or fall back to the defaults
    /// when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                let config: Self = serde_yaml::from_str(&text)?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// The date this run harvests for.
    pub fn target_date_or_today(&self) -> NaiveDate {
        self.target_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Build the date-scoped query URL, with both range parameters pinned
    /// to the same day.
    pub fn query_url(&self, date: NaiveDate) -> String {
        format!(
            "{}?tn=news&ie=utf-8&wd={}&y0={date}&y1={date}",
            self.search_endpoint,
            urlencoding::encode(&self.query_keyword),
        )
    }
}

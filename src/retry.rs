//! Bounded-retry harvest driver with explicit failure classification.
//!
//! One run is a sequence of attempts, each of which opens a fresh browser
//! session, harvests, and releases the session before the outcome is acted
//! on. Failures carry their classification in the type: an
//! [`AttemptError::Transient`] is retried with exponential backoff and
//! jitter up to the configured ceiling, while an [`AttemptError::Permanent`]
//! aborts the run immediately. Sessions are never reused across attempts.
//!
//! # Backoff
//!
//! ```text
//! delay = min(2s * 2^(attempt-1), 10s) + random_jitter(0..=250ms)
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::HarvestConfig;
use crate::harvester::{self, HarvestLimits};
use crate::models::NewsItem;
use crate::session::{BrowserSession, SessionError};

/// First transient-retry delay; doubles per attempt.
pub const BACKOFF_BASE: Duration = Duration::from_secs(2);
/// Upper bound on any single backoff delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Outcome classification for one failed attempt.
///
/// The controller switches on this tag, never on the identity of some
/// underlying exception type.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Believed recoverable with a fresh session.
    #[error(transparent)]
    Transient(#[from] SessionError),
    /// Not expected to resolve by retrying.
    #[error("{0}")]
    Permanent(String),
}

/// Terminal failure of a whole run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("all {attempts} harvest attempts failed: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: SessionError,
    },
    #[error("harvest aborted: {0}")]
    Fatal(String),
}

/// How many attempts a run may consume.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
}

/// Harvest with retries: the production entry point.
#[instrument(level = "info", skip_all)]
pub async fn run(config: &HarvestConfig) -> Result<Vec<NewsItem>, HarvestError> {
    let date = config.target_date_or_today();
    let limits = HarvestLimits::from(config);
    let policy = RetryPolicy {
        attempts: config.retry_attempts,
    };
    run_with_retry(&policy, |attempt| {
        let limits = limits.clone();
        async move {
            info!(attempt, %date, "Opening harvest session");
            attempt_once(config, &limits, date).await
        }
    })
    .await
}

/// One scoped attempt: open, harvest, release.
///
/// The session is closed on every path before the outcome is returned, so
/// the next attempt always starts from a fresh browser.
async fn attempt_once(
    config: &HarvestConfig,
    limits: &HarvestLimits,
    date: chrono::NaiveDate,
) -> Result<Vec<NewsItem>, AttemptError> {
    let target = config.query_url(date);
    // A query target that does not even parse cannot be fixed by retrying.
    Url::parse(&target)
        .map_err(|e| AttemptError::Permanent(format!("invalid query target {target}: {e}")))?;

    let session = BrowserSession::open(config, &target).await?;
    let outcome = harvester::harvest(&session, limits).await;
    session.close().await;
    Ok(outcome?)
}

/// Retry loop over a pluggable attempt, so tests can script outcomes
/// without a browser.
pub async fn run_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<Vec<NewsItem>, HarvestError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<NewsItem>, AttemptError>>,
{
    let attempts = policy.attempts.max(1);
    let mut last: Option<SessionError> = None;

    for index in 1..=attempts {
        match attempt(index).await {
            Ok(items) => {
                if index > 1 {
                    info!(attempt = index, "Recovered after transient failures");
                }
                return Ok(items);
            }
            Err(AttemptError::Permanent(reason)) => {
                error!(attempt = index, %reason, "Permanent failure; aborting run");
                return Err(HarvestError::Fatal(reason));
            }
            Err(AttemptError::Transient(cause)) => {
                if index < attempts {
                    let delay = backoff_delay(index) + jitter();
                    warn!(
                        attempt = index,
                        max = attempts,
                        ?delay,
                        error = %cause,
                        "Attempt failed; backing off"
                    );
                    last = Some(cause);
                    tokio::time::sleep(delay).await;
                } else {
                    error!(attempt = index, max = attempts, error = %cause, "Attempts exhausted");
                    last = Some(cause);
                }
            }
        }
    }

    Err(match last {
        Some(source) => HarvestError::RetriesExhausted { attempts, source },
        // Unreachable with attempts >= 1; kept so the loop never panics.
        None => HarvestError::Fatal("retry loop ran no attempts".to_string()),
    })
}

/// Deterministic exponential delay for the given 1-based attempt index.
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    BACKOFF_BASE.saturating_mul(1 << shift).min(BACKOFF_CAP)
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..=250))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sample_items(count: usize) -> Vec<NewsItem> {
        (0..count)
            .map(|index| NewsItem {
                title: format!("新闻 {index}"),
                link: format!("https://example.com/{index}"),
            })
            .collect()
    }

    fn flaky() -> AttemptError {
        AttemptError::Transient(SessionError::Page("connection reset".to_string()))
    }

    #[test]
    fn test_backoff_is_monotone_and_capped() {
        let delays: Vec<Duration> = (1..=8).map(backoff_delay).collect();
        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[1], Duration::from_secs(4));
        assert_eq!(delays[2], Duration::from_secs(8));
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        for delay in &delays {
            assert!(*delay <= BACKOFF_CAP);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_attempt_succeeds_after_two_transients() {
        let calls = Cell::new(0u32);
        let result = run_with_retry(&RetryPolicy { attempts: 3 }, |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 3 {
                    Err(flaky())
                } else {
                    Ok(sample_items(4))
                }
            }
        })
        .await;
        assert_eq!(calls.get(), 3);
        assert_eq!(result.unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_spends_no_retry_budget() {
        let calls = Cell::new(0u32);
        let result = run_with_retry(&RetryPolicy { attempts: 5 }, |_| {
            calls.set(calls.get() + 1);
            async move {
                Err(AttemptError::Permanent("selector table corrupt".to_string()))
            }
        })
        .await;
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(HarvestError::Fatal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempt_count_and_last_cause() {
        let calls = Cell::new(0u32);
        let result = run_with_retry(&RetryPolicy { attempts: 3 }, |_| {
            calls.set(calls.get() + 1);
            async move { Err(flaky()) }
        })
        .await;
        assert_eq!(calls.get(), 3);
        match result {
            Err(HarvestError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, SessionError::Page(_)));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}

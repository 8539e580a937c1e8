//! Pagination driver.
//!
//! Turns one logical query into a sequence of page fetches, following
//! cursors forward-only until exhaustion, a count target, or the date
//! boundary. Rate-limit cooldowns happen below this layer, inside each
//! client's request loop; the driver only handles the cursor anomaly and
//! the stop conditions.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDateTime;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Pacing;
use crate::error::{InstagramError, Result};
use crate::extract::item_timestamp;
use crate::types::{Cursor, FetchQuery, Page};

const DATESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parse a `YYYYMMDDHHMMSS` parameter into epoch seconds.
///
/// # Errors
///
/// `Validation` on any other format; parsing happens before the first
/// request goes out.
pub(crate) fn parse_datestamp(stamp: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(stamp, DATESTAMP_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| {
            InstagramError::Validation(format!("date parameter {stamp} is not YYYYMMDDHHMMSS"))
        })
}

/// Resolved bounds and limits of one fetch, validated up front.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DriveOptions {
    pub limit: Option<usize>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub anomaly_min: Duration,
    pub anomaly_max: Duration,
}

impl DriveOptions {
    /// Validate a query's bounds against the given pacing.
    pub(crate) fn from_query(query: &FetchQuery, pacing: &Pacing) -> Result<Self> {
        Ok(Self {
            limit: query.count,
            since: query.since.as_deref().map(parse_datestamp).transpose()?,
            until: query.until.as_deref().map(parse_datestamp).transpose()?,
            anomaly_min: Duration::from_secs(pacing.anomaly_min_secs),
            anomaly_max: Duration::from_secs(pacing.anomaly_max_secs),
        })
    }

    fn anomaly_delay(&self) -> Duration {
        if self.anomaly_max <= self.anomaly_min {
            return self.anomaly_min;
        }
        rand::thread_rng().gen_range(self.anomaly_min..=self.anomaly_max)
    }
}

/// Drive `next_page` from the first page to a finite, truncated result.
///
/// Items are assumed delivered newest-first: the first item older than
/// `since` terminates the whole fetch. Items newer than `until` are skipped
/// without terminating. A page that advertises more data but yields no
/// computable cursor is refetched after a short randomized delay rather
/// than failed; the scraping path intermittently returns such pages.
pub(crate) async fn drive<F, Fut>(options: &DriveOptions, mut next_page: F) -> Result<Vec<Value>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page>>,
{
    let mut collected: Vec<Value> = Vec::new();
    let mut cursor: Option<Cursor> = None;

    loop {
        let page = next_page(cursor.clone()).await?;

        if page.is_cursor_anomaly() {
            let delay = options.anomaly_delay();
            warn!(delay_ms = delay.as_millis(), "next-page cursor missing, refetching page");
            tokio::time::sleep(delay).await;
            continue;
        }

        let fetched = page.items.len();
        let mut hit_since = false;
        for item in page.items {
            let stamp = item_timestamp(&item);
            if let (Some(since), Some(stamp)) = (options.since, stamp) {
                if stamp < since {
                    hit_since = true;
                    break;
                }
            }
            if let (Some(until), Some(stamp)) = (options.until, stamp) {
                if stamp > until {
                    continue;
                }
            }
            collected.push(item);
        }

        debug!(fetched, total = collected.len(), "page consumed");

        if hit_since {
            break;
        }
        if options.limit.is_some_and(|limit| collected.len() >= limit) {
            break;
        }
        if fetched == 0 || !page.more {
            break;
        }
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    if let Some(limit) = options.limit {
        collected.truncate(limit);
    }
    Ok(collected)
}

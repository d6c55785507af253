//! Hourly price cache with publish-time-aware refresh scheduling
//!
//! The cache holds the known hourly price series (typically spanning
//! yesterday through tomorrow once the provider has published) and derives
//! "is a refresh due" from the cache content itself rather than from a fixed
//! polling clock, which keeps it correct across restarts and clock drift.
//! Scheduled refreshes fire after a uniformly random delay so that many
//! instances sharing the same publish cutoff do not stampede the API.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use tokio::task::JoinHandle;

use crate::clock;
use crate::config::PricesConfig;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::tibber::client::ApiClient;
use crate::tibber::types::{PriceEntry, PriceInfo};

/// Source of fresh price data; the GraphQL client in production, a scripted
/// feed in tests
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Fetch today's and tomorrow's hourly prices
    async fn fetch_price_info(&self) -> Result<PriceInfo>;
}

#[async_trait]
impl PriceFeed for ApiClient {
    async fn fetch_price_info(&self) -> Result<PriceInfo> {
        ApiClient::fetch_price_info(self).await
    }
}

/// Derived view over the cached series for a given instant
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    /// Entries on the instant's local calendar day
    pub today: Vec<PriceEntry>,

    /// The entry whose hour contains the instant
    pub latest: Option<PriceEntry>,

    /// Cheapest entry of the day
    pub lowest_today: Option<PriceEntry>,

    /// Most expensive entry of the day
    pub highest_today: Option<PriceEntry>,
}

/// Cache of the hourly price series for one home
pub struct PriceCache {
    feed: Arc<dyn PriceFeed>,
    tz: Tz,
    cfg: PricesConfig,
    series: Arc<Mutex<Vec<PriceEntry>>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    logger: StructuredLogger,
}

impl PriceCache {
    /// Create an empty cache
    pub fn new(feed: Arc<dyn PriceFeed>, tz: Tz, cfg: PricesConfig) -> Self {
        Self {
            feed,
            tz,
            cfg,
            series: Arc::new(Mutex::new(Vec::new())),
            refresh_task: Mutex::new(None),
            logger: get_logger("prices"),
        }
    }

    /// Return the cached series, fetching synchronously only when the cache
    /// is empty. May schedule a background refresh as a side effect; it never
    /// blocks on one.
    pub async fn get_prices(&self) -> Result<Vec<PriceEntry>> {
        let now = clock::reference_now(self.tz);
        self.get_prices_at(now).await
    }

    /// As [`Self::get_prices`], evaluated against an explicit instant
    pub async fn get_prices_at(&self, now: DateTime<Tz>) -> Result<Vec<PriceEntry>> {
        if self.cached_series().is_empty() {
            self.logger
                .info("No prices cached. Fetch prices immediately.");
            refresh_series(self.feed.as_ref(), &self.series, now, &self.logger).await?;
        }

        let series = self.cached_series();
        if series.is_empty() {
            self.logger.info("No prices available. Retry later.");
            return Ok(series);
        }

        self.maybe_schedule_refresh(&series, &now);
        Ok(series)
    }

    /// Derive the today/latest/extrema view for an instant
    pub fn snapshot(&self, now: &DateTime<Tz>) -> PriceSnapshot {
        let series = self.cached_series();
        let day_start = clock::start_of_day(now);
        let today: Vec<PriceEntry> = series
            .iter()
            .filter(|p| clock::start_of_day(&p.starts_at.with_timezone(&self.tz)) == day_start)
            .cloned()
            .collect();

        let now_hour = clock::hour_floor(now);
        let latest = series
            .iter()
            .find(|p| clock::hour_floor(&p.starts_at) == now_hour)
            .cloned();

        let lowest_today = min_by_total(&today).cloned();
        let highest_today = max_by_total(&today).cloned();

        PriceSnapshot {
            today,
            latest,
            lowest_today,
            highest_today,
        }
    }

    /// Whether a scheduled refresh is currently pending
    pub fn pending_refresh(&self) -> bool {
        self.refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel any pending refresh. Reentrant-safe.
    pub fn destroy(&self) {
        let mut slot = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    fn cached_series(&self) -> Vec<PriceEntry> {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // A refresh is due when the last cached entry still belongs to a day
    // before tomorrow and the provider's daily publish cutoff has passed.
    // Polling earlier would reliably return the data we already hold.
    fn needs_refresh(&self, series: &[PriceEntry], now: &DateTime<Tz>) -> bool {
        let Some(last) = series.last() else {
            return true;
        };

        let last_entry_day = clock::start_of_day(&last.starts_at.with_timezone(&self.tz));
        let tomorrow = clock::start_of_tomorrow(now);
        let cutoff = clock::publish_cutoff(now, self.cfg.publish_cutoff_hour);

        last_entry_day < tomorrow && *now > cutoff
    }

    fn maybe_schedule_refresh(&self, series: &[PriceEntry], now: &DateTime<Tz>) {
        if !self.needs_refresh(series, now) {
            self.logger.debug("Last price info entry is up-to-date");
            return;
        }

        let mut slot = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            self.logger.debug("Price refresh already scheduled");
            return;
        }

        let delay = clock::random_delay(0, self.cfg.max_refresh_delay_secs);
        self.logger.info(&format!(
            "Last price info entry is before tomorrow and publish cutoff has passed. Schedule re-fetch after {} seconds.",
            delay.as_secs()
        ));

        let feed = Arc::clone(&self.feed);
        let series = Arc::clone(&self.series);
        let tz = self.tz;
        let logger = self.logger.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let now = clock::reference_now(tz);
            if let Err(e) = refresh_series(feed.as_ref(), &series, now, &logger).await {
                // Deliberately no immediate retry: the next poll cycle
                // re-evaluates needs_refresh and reschedules.
                logger.error(&format!(
                    "Scheduled price refresh failed, keeping stale data: {}",
                    e
                ));
            }
        }));
    }
}

impl Drop for PriceCache {
    fn drop(&mut self) {
        self.destroy();
    }
}

// Fetch fresh prices and replace the cached series wholesale: a trailing
// window of yesterday's entries already in cache is retained so comparators
// spanning midnight keep working, then today+tomorrow come from the feed.
async fn refresh_series(
    feed: &dyn PriceFeed,
    series: &Arc<Mutex<Vec<PriceEntry>>>,
    now: DateTime<Tz>,
    logger: &StructuredLogger,
) -> Result<()> {
    let fresh = feed.fetch_price_info().await?;

    let day_start = clock::start_of_day(&now);
    let yesterday_start = clock::shift_days(&day_start, -1);

    let mut next = {
        let current = series.lock().unwrap_or_else(PoisonError::into_inner);
        current
            .iter()
            .filter(|p| p.starts_at >= yesterday_start && p.starts_at < day_start)
            .cloned()
            .collect::<Vec<_>>()
    };
    next.extend(fresh.today);
    next.extend(fresh.tomorrow);

    logger.info(&format!("Cached {} hourly price entries", next.len()));
    let mut current = series.lock().unwrap_or_else(PoisonError::into_inner);
    *current = next;
    Ok(())
}

/// First entry with the minimal total
fn min_by_total(entries: &[PriceEntry]) -> Option<&PriceEntry> {
    entries.iter().fold(None, |best, entry| match best {
        Some(b) if b.total <= entry.total => Some(b),
        _ => Some(entry),
    })
}

/// First entry with the maximal total
fn max_by_total(entries: &[PriceEntry]) -> Option<&PriceEntry> {
    entries.iter().fold(None, |best, entry| match best {
        Some(b) if b.total >= entry.total => Some(b),
        _ => Some(entry),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tibber::types::PriceLevel;
    use chrono::{DateTime, Duration, FixedOffset};
    use chrono_tz::Europe::Oslo;

    fn oslo(value: &str) -> DateTime<Tz> {
        DateTime::parse_from_rfc3339(value)
            .unwrap()
            .with_timezone(&Oslo)
    }

    fn entry(starts_at: &str, total: f64) -> PriceEntry {
        PriceEntry {
            starts_at: DateTime::<FixedOffset>::parse_from_rfc3339(starts_at).unwrap(),
            total,
            energy: total * 0.7,
            tax: total * 0.3,
            level: PriceLevel::Normal,
        }
    }

    fn day_of_entries(first_hour: &str, base: f64) -> Vec<PriceEntry> {
        let start = DateTime::<FixedOffset>::parse_from_rfc3339(first_hour).unwrap();
        (0..24)
            .map(|h| PriceEntry {
                starts_at: start + Duration::hours(h),
                total: base + h as f64,
                energy: base,
                tax: 0.1,
                level: PriceLevel::Normal,
            })
            .collect()
    }

    struct StaticFeed(PriceInfo);

    #[async_trait]
    impl PriceFeed for StaticFeed {
        async fn fetch_price_info(&self) -> Result<PriceInfo> {
            Ok(self.0.clone())
        }
    }

    fn cache_with(series: Vec<PriceEntry>) -> PriceCache {
        let cache = PriceCache::new(
            Arc::new(StaticFeed(PriceInfo::default())),
            Oslo,
            PricesConfig::default(),
        );
        *cache.series.lock().unwrap() = series;
        cache
    }

    #[test]
    fn needs_refresh_only_after_publish_cutoff() {
        // Series ends with today's last hour, i.e. tomorrow is missing
        let cache = cache_with(day_of_entries("2023-02-01T00:00:00+01:00", 1.0));
        let series = cache.cached_series();

        assert!(!cache.needs_refresh(&series, &oslo("2023-02-01T12:59:00+01:00")));
        assert!(cache.needs_refresh(&series, &oslo("2023-02-01T13:01:00+01:00")));
    }

    #[test]
    fn needs_refresh_false_when_tomorrow_is_cached() {
        let mut series = day_of_entries("2023-02-01T00:00:00+01:00", 1.0);
        series.extend(day_of_entries("2023-02-02T00:00:00+01:00", 2.0));
        let cache = cache_with(series.clone());

        assert!(!cache.needs_refresh(&series, &oslo("2023-02-01T14:00:00+01:00")));
    }

    #[test]
    fn needs_refresh_true_for_empty_cache() {
        let cache = cache_with(Vec::new());
        assert!(cache.needs_refresh(&[], &oslo("2023-02-01T08:00:00+01:00")));
    }

    #[test]
    fn snapshot_selects_latest_by_containing_hour() {
        let cache = cache_with(day_of_entries("2023-02-01T00:00:00+01:00", 1.0));
        let snapshot = cache.snapshot(&oslo("2023-02-01T10:45:00+01:00"));

        assert_eq!(snapshot.today.len(), 24);
        let latest = snapshot.latest.unwrap();
        assert_eq!(latest.starts_at.to_rfc3339(), "2023-02-01T10:00:00+01:00");
        assert_eq!(snapshot.lowest_today.unwrap().total, 1.0);
        assert_eq!(snapshot.highest_today.unwrap().total, 24.0);
    }

    #[test]
    fn snapshot_today_excludes_other_days() {
        let mut series = day_of_entries("2023-01-31T00:00:00+01:00", 5.0);
        series.extend(day_of_entries("2023-02-01T00:00:00+01:00", 1.0));
        series.extend(day_of_entries("2023-02-02T00:00:00+01:00", 9.0));
        let cache = cache_with(series);

        let snapshot = cache.snapshot(&oslo("2023-02-01T00:10:00+01:00"));
        assert_eq!(snapshot.today.len(), 24);
        assert!(
            snapshot
                .today
                .iter()
                .all(|p| p.starts_at.to_rfc3339().starts_with("2023-02-01"))
        );
    }

    #[test]
    fn extrema_prefer_the_earliest_entry_on_ties() {
        let entries = vec![
            entry("2023-02-01T00:00:00+01:00", 0.5),
            entry("2023-02-01T01:00:00+01:00", 0.5),
            entry("2023-02-01T02:00:00+01:00", 0.9),
        ];
        let lowest = min_by_total(&entries).unwrap();
        assert_eq!(lowest.starts_at.to_rfc3339(), "2023-02-01T00:00:00+01:00");
    }

    #[tokio::test]
    async fn refresh_keeps_a_trailing_day_of_history() {
        let fresh = PriceInfo {
            today: day_of_entries("2023-02-01T00:00:00+01:00", 1.0),
            tomorrow: day_of_entries("2023-02-02T00:00:00+01:00", 2.0),
        };
        let feed = StaticFeed(fresh);

        // Cache currently holds two stale days: the day before yesterday and
        // yesterday. Only yesterday must survive the refresh.
        let mut stale = day_of_entries("2023-01-30T00:00:00+01:00", 7.0);
        stale.extend(day_of_entries("2023-01-31T00:00:00+01:00", 8.0));
        let series = Arc::new(Mutex::new(stale));

        let logger = get_logger("prices-test");
        refresh_series(
            &feed,
            &series,
            oslo("2023-02-01T13:30:00+01:00"),
            &logger,
        )
        .await
        .unwrap();

        let result = series.lock().unwrap().clone();
        assert_eq!(result.len(), 72);
        assert_eq!(
            result.first().unwrap().starts_at.to_rfc3339(),
            "2023-01-31T00:00:00+01:00"
        );
        assert_eq!(
            result.last().unwrap().starts_at.to_rfc3339(),
            "2023-02-02T23:00:00+01:00"
        );
    }
}

//! Comparator engine for automation conditions
//!
//! Pure predicates over the cached hourly series and its derived snapshot.
//! None of them hold state, which keeps them independently testable, and a
//! condition that cannot be evaluated (empty subset, unknown current price,
//! rank not found) fails closed: it logs and returns `false` instead of
//! erroring, so a broken data situation never breaks the automation flow.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::clock::{hour_floor, parse_clock_time, shift_days};
use crate::logging::StructuredLogger;
use crate::prices::PriceSnapshot;
use crate::tibber::types::PriceEntry;

/// Options for the average-deviation comparator
#[derive(Debug, Clone, Default)]
pub struct AveragePriceOptions {
    /// Window of hours relative to now: positive looks forward, negative
    /// backward, `None` uses today's entries
    pub hours: Option<i64>,

    /// Minimum deviation from the average, in percent
    pub percentage: f64,
}

/// Options for the extremes comparator
#[derive(Debug, Clone, Default)]
pub struct ExtremePriceOptions {
    /// Window of hours relative to now; `None` uses today's entries
    pub hours: Option<i64>,

    /// When set, test rank membership instead of exact extremes
    pub ranked_hours: Option<usize>,
}

/// Options for the time-window ranked comparator
#[derive(Debug, Clone)]
pub struct TimeWindowOptions {
    /// How many of the cheapest hours count as "among the lowest"
    pub ranked_hours: usize,

    /// Wall-clock window start, "HH:MM" in the reference timezone
    pub start_time: String,

    /// Wall-clock window end, "HH:MM"; lexically before `start_time` means
    /// the window wraps midnight
    pub end_time: String,
}

/// Whether the current price deviates from the window average by more than
/// `percentage` percent, below or above.
pub fn price_vs_average(
    logger: &StructuredLogger,
    hourly_prices: &[PriceEntry],
    snapshot: &PriceSnapshot,
    now: &DateTime<Tz>,
    options: &AveragePriceOptions,
    below: bool,
) -> bool {
    // A zero-width window is meaningless, not an error
    if options.hours == Some(0) {
        return false;
    }

    let prices = working_subset(hourly_prices, snapshot, now, options.hours);

    let Some(avg_price) = mean(&prices) else {
        logger.debug("Cannot determine condition. No prices for next hours available.");
        return false;
    };

    let Some(latest) = snapshot.latest.as_ref() else {
        return false;
    };

    let mut diff_avg_current = (latest.total - avg_price) / avg_price * 100.0;
    if below {
        diff_avg_current = -diff_avg_current;
    }

    let condition_met = diff_avg_current > options.percentage;
    logger.debug(&format!(
        "{} is {:.2}% {} avg ({:.4}) over {}. Condition of min {} percent met = {}",
        latest.total,
        diff_avg_current,
        if below { "below" } else { "above" },
        avg_price,
        options
            .hours
            .map_or_else(|| "today".to_string(), |h| format!("{} hours", h)),
        options.percentage,
        condition_met
    ));
    condition_met
}

/// Whether the current price is the exact extreme of the window, or (with
/// `ranked_hours`) within the N cheapest/most expensive entries.
pub fn price_extremes(
    logger: &StructuredLogger,
    hourly_prices: &[PriceEntry],
    snapshot: &PriceSnapshot,
    now: &DateTime<Tz>,
    options: &ExtremePriceOptions,
    lowest: bool,
) -> bool {
    if options.hours == Some(0) || options.ranked_hours == Some(0) {
        return false;
    }

    let prices = working_subset(hourly_prices, snapshot, now, options.hours);

    if prices.is_empty() {
        logger.debug("Cannot determine condition. No prices for next hours available.");
        return false;
    }

    let Some(latest) = snapshot.latest.as_ref() else {
        logger.debug("Cannot determine condition. The last price is undefined.");
        return false;
    };

    let condition_met = if let Some(ranked_hours) = options.ranked_hours {
        let sorted = sort_by_total(prices);
        // Locate the current hour by exact timestamp identity, not by value;
        // rank lookup must stay unambiguous when totals collide.
        let Some(rank) = sorted.iter().position(|p| p.starts_at == latest.starts_at) else {
            logger.debug("Could not find the current hour rank among the selected hours");
            return false;
        };

        let met = if lowest {
            rank < ranked_hours
        } else {
            rank >= sorted.len().saturating_sub(ranked_hours)
        };
        logger.debug(&format!(
            "{} is among the {} {} hours = {}",
            latest.total,
            if lowest { "lowest" } else { "highest" },
            ranked_hours,
            met
        ));
        met
    } else {
        let to_compare = if lowest {
            prices.iter().map(|p| p.total).fold(f64::INFINITY, f64::min)
        } else {
            prices
                .iter()
                .map(|p| p.total)
                .fold(f64::NEG_INFINITY, f64::max)
        };

        let met = if lowest {
            latest.total <= to_compare
        } else {
            latest.total >= to_compare
        };
        logger.debug(&format!(
            "{} is {} ({}) = {}",
            latest.total,
            if lowest {
                "lower than the lowest"
            } else {
                "higher than the highest"
            },
            to_compare,
            met
        ));
        met
    };

    condition_met
}

/// Whether now lies inside the `[start, end)` wall-clock window and the
/// current price ranks among the `ranked_hours` cheapest entries of that
/// window. Windows where start > end wrap midnight and are anchored so that
/// `now` falls inside a single correctly-dated interval.
pub fn lowest_price_within_time_frame(
    logger: &StructuredLogger,
    hourly_prices: &[PriceEntry],
    snapshot: &PriceSnapshot,
    now: &DateTime<Tz>,
    options: &TimeWindowOptions,
) -> bool {
    if options.ranked_hours == 0 {
        return false;
    }

    let non_adjusted_start = match parse_clock_time(&options.start_time, now) {
        Ok(t) => t,
        Err(e) => {
            logger.warn(&format!("Invalid window start time: {}", e));
            return false;
        }
    };
    let non_adjusted_end = match parse_clock_time(&options.end_time, now) {
        Ok(t) => t,
        Err(e) => {
            logger.warn(&format!("Invalid window end time: {}", e));
            return false;
        }
    };

    let mut start = non_adjusted_start.clone();
    let mut end = non_adjusted_end.clone();

    let stretches_over_midnight = non_adjusted_start > non_adjusted_end;
    if stretches_over_midnight {
        if *now < non_adjusted_end {
            start = shift_days(&start, -1);
        }
        if *now > non_adjusted_end {
            end = shift_days(&end, 1);
        }
    }

    if *now < start || *now >= end {
        logger.debug("Time conditions not met");
        return false;
    }

    let within_time_frame: Vec<PriceEntry> = hourly_prices
        .iter()
        .filter(|p| hour_floor(&p.starts_at) >= hour_floor(&start) && p.starts_at < end)
        .cloned()
        .collect();

    if within_time_frame.is_empty() {
        logger.debug("Cannot determine condition. No prices for next hours available.");
        return false;
    }

    let Some(latest) = snapshot.latest.as_ref() else {
        logger.debug("Cannot determine condition. The last price is undefined.");
        return false;
    };

    let sorted = sort_by_total(within_time_frame);
    let Some(rank) = sorted.iter().position(|p| p.starts_at == latest.starts_at) else {
        logger.debug("Could not find the current hour rank among the window's hours");
        return false;
    };

    let condition_met = rank < options.ranked_hours;
    logger.debug(&format!(
        "{} is among the lowest {} prices between {} and {} = {}",
        latest.total,
        options.ranked_hours,
        start.to_rfc3339(),
        end.to_rfc3339(),
        condition_met
    ));
    condition_met
}

// Select the entries a windowed comparator works on: today's entries when no
// window is given, otherwise up to |hours| entries strictly after now
// (hours > 0) or in hours strictly before now's hour (hours < 0). Fewer
// entries than requested is tolerated.
fn working_subset(
    hourly_prices: &[PriceEntry],
    snapshot: &PriceSnapshot,
    now: &DateTime<Tz>,
    hours: Option<i64>,
) -> Vec<PriceEntry> {
    match hours {
        None => snapshot.today.clone(),
        Some(h) if h > 0 => {
            let upcoming: Vec<PriceEntry> = hourly_prices
                .iter()
                .filter(|p| p.starts_at > *now)
                .cloned()
                .collect();
            take_from_start_or_end(upcoming, h)
        }
        Some(h) => {
            let past: Vec<PriceEntry> = hourly_prices
                .iter()
                .filter(|p| hour_floor(&p.starts_at) < hour_floor(now))
                .cloned()
                .collect();
            take_from_start_or_end(past, h)
        }
    }
}

/// Arithmetic mean of `total`; `None` for an empty slice
fn mean(entries: &[PriceEntry]) -> Option<f64> {
    if entries.is_empty() {
        return None;
    }
    let sum: f64 = entries.iter().map(|p| p.total).sum();
    Some(sum / entries.len() as f64)
}

/// Take up to `quantity` entries from the start (positive) or the end
/// (negative), preserving order and clamping to what exists
fn take_from_start_or_end(entries: Vec<PriceEntry>, quantity: i64) -> Vec<PriceEntry> {
    let len = entries.len();
    if quantity >= 0 {
        let take = (quantity as usize).min(len);
        entries.into_iter().take(take).collect()
    } else {
        let take = (quantity.unsigned_abs() as usize).min(len);
        entries.into_iter().skip(len - take).collect()
    }
}

/// Stable ascending sort by total
fn sort_by_total(mut entries: Vec<PriceEntry>) -> Vec<PriceEntry> {
    entries.sort_by(|a, b| {
        a.total
            .partial_cmp(&b.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    entries
}

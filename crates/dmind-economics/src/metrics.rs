/// BURN METRICS
///
/// Pure aggregations over the burn event log. Nothing here is stored; every
/// figure is recomputed from the events on request.

use chrono::{DateTime, Duration, Utc};
use dmind_core::{timestamp, DmtAmount};
use serde::{Deserialize, Serialize};

use crate::burning::{BurnEvent, BurnSource};

/// Fixed DMT total supply used for the burn-rate percentage
pub const TOTAL_SUPPLY: DmtAmount = DmtAmount::from_dmt(1_000_000_000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurningMetrics {
    pub total_burned: DmtAmount,
    pub minting_burned: DmtAmount,
    pub subscription_burned: DmtAmount,
    pub upgrade_burned: DmtAmount,
    pub marketplace_burned: DmtAmount,
    pub dao_burned: DmtAmount,
    #[serde(with = "timestamp")]
    pub last_burn_date: DateTime<Utc>,
    /// Total burned as a percentage of `TOTAL_SUPPLY`
    pub burn_rate: f64,
    /// Burned in the last 24 hours
    pub daily_burn_rate: DmtAmount,
    /// Burned in the last 30 days
    pub monthly_burn_rate: DmtAmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurningStats {
    pub total_burn_events: usize,
    pub total_burned: DmtAmount,
    pub average_burn_per_event: DmtAmount,
    pub most_active_source: String,
    pub burn_trend: BurnTrend,
}

fn sum_where<F: Fn(&BurnEvent) -> bool>(events: &[BurnEvent], pred: F) -> DmtAmount {
    events.iter().filter(|e| pred(e)).map(|e| e.amount).sum()
}

pub fn compute_metrics(events: &[BurnEvent], now: DateTime<Utc>) -> BurningMetrics {
    let total_burned: DmtAmount = events.iter().map(|e| e.amount).sum();
    let by_source = |source: BurnSource| sum_where(events, |e| e.source == source);

    let one_day_ago = now - Duration::hours(24);
    let one_month_ago = now - Duration::days(30);

    let burn_rate = if total_burned.is_zero() {
        0.0
    } else {
        total_burned.units() as f64 / TOTAL_SUPPLY.units() as f64 * 100.0
    };

    BurningMetrics {
        total_burned,
        minting_burned: by_source(BurnSource::Minting),
        subscription_burned: by_source(BurnSource::Subscription),
        upgrade_burned: by_source(BurnSource::Upgrade),
        marketplace_burned: by_source(BurnSource::Marketplace),
        dao_burned: by_source(BurnSource::Dao),
        last_burn_date: events.iter().map(|e| e.timestamp).max().unwrap_or(now),
        burn_rate,
        daily_burn_rate: sum_where(events, |e| e.timestamp > one_day_ago),
        monthly_burn_rate: sum_where(events, |e| e.timestamp > one_month_ago),
    }
}

/// Compare the last 7 days with the 7 days before, with a 10% dead band
pub fn burn_trend(recent: DmtAmount, previous: DmtAmount) -> BurnTrend {
    let (recent, previous) = (recent.units(), previous.units());
    if recent.saturating_mul(10) > previous.saturating_mul(11) {
        BurnTrend::Increasing
    } else if recent.saturating_mul(10) < previous.saturating_mul(9) {
        BurnTrend::Decreasing
    } else {
        BurnTrend::Stable
    }
}

/// Source with the most events; ties go to the source seen first
pub fn most_active_source(events: &[BurnEvent]) -> Option<BurnSource> {
    let mut counts: Vec<(BurnSource, usize)> = Vec::new();
    for event in events {
        match counts.iter_mut().find(|(s, _)| *s == event.source) {
            Some((_, n)) => *n += 1,
            None => counts.push((event.source, 1)),
        }
    }
    counts
        .iter()
        .fold(None, |best: Option<(BurnSource, usize)>, &(source, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((source, n)),
        })
        .map(|(source, _)| source)
}

pub fn compute_stats(events: &[BurnEvent], now: DateTime<Utc>) -> BurningStats {
    let total_burned: DmtAmount = events.iter().map(|e| e.amount).sum();
    let count = events.len();
    let average = if count == 0 {
        DmtAmount::ZERO
    } else {
        total_burned.mul_div(1, count as u128)
    };

    let seven_days_ago = now - Duration::days(7);
    let fourteen_days_ago = now - Duration::days(14);
    let recent = sum_where(events, |e| e.timestamp > seven_days_ago);
    let previous = sum_where(events, |e| e.timestamp > fourteen_days_ago && e.timestamp <= seven_days_ago);

    log::debug!("burn trend window: recent {} previous {}", recent, previous);

    BurningStats {
        total_burn_events: count,
        total_burned,
        average_burn_per_event: average,
        most_active_source: most_active_source(events)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "none".to_string()),
        burn_trend: burn_trend(recent, previous),
    }
}

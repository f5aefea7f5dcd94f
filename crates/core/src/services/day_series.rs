use chrono::{DateTime, Days, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::models::price::{PricePoint, RawPoint, Series};

/// Anything that can be bucketed into a calendar day.
pub trait DaySample {
    /// UTC calendar day of the sample, `None` if the timestamp is out of range.
    fn day(&self) -> Option<NaiveDate>;
    fn price(&self) -> Decimal;
}

impl DaySample for RawPoint {
    fn day(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(self.timestamp_ms).map(|dt| dt.date_naive())
    }

    fn price(&self) -> Decimal {
        self.price
    }
}

impl DaySample for PricePoint {
    fn day(&self) -> Option<NaiveDate> {
        Some(self.date)
    }

    fn price(&self) -> Decimal {
        self.price
    }
}

/// Collapse samples to one price per UTC day.
///
/// Later samples in input order overwrite earlier ones for the same day.
/// The result is sorted ascending by date.
pub fn dedupe_by_day<T: DaySample>(points: &[T]) -> Series {
    let mut per_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for point in points {
        if let Some(day) = point.day() {
            per_day.insert(day, point.price());
        }
    }
    per_day
        .into_iter()
        .map(|(date, price)| PricePoint { date, price })
        .collect()
}

/// Keep the points within `days` calendar days of the last point.
///
/// `cutoff = last.date - (days - 1)`; gaps in the input mean the result may
/// hold fewer than `days` points.
pub fn slice_last_days(series: &[PricePoint], days: u32) -> Series {
    let Some(last) = series.last() else {
        return Vec::new();
    };
    if days == 0 {
        return Vec::new();
    }
    let cutoff = last
        .date
        .checked_sub_days(Days::new(u64::from(days - 1)))
        .unwrap_or(NaiveDate::MIN);
    series.iter().filter(|p| p.date >= cutoff).cloned().collect()
}

/// The last `count` points (all of them if the series is shorter).
pub fn tail(series: &[PricePoint], count: u32) -> Series {
    let count = count as usize;
    let start = series.len().saturating_sub(count);
    series[start..].to_vec()
}

/// `days` consecutive days ending on `today`, all at exactly $1.00.
pub fn stable_series(today: NaiveDate, days: u32) -> Series {
    (0..days)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
        .map(|date| PricePoint {
            date,
            price: Decimal::ONE,
        })
        .collect()
}

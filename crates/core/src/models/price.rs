use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One day of a price series: calendar day (UTC) → USD price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: Decimal) -> Self {
        Self { date, price }
    }
}

/// Daily series for one coin over a trailing window.
/// At most one point per day, sorted ascending by date.
pub type Series = Vec<PricePoint>;

/// A raw upstream sample before day deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPoint {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    pub price: Decimal,
}

impl RawPoint {
    pub fn new(timestamp_ms: i64, price: Decimal) -> Self {
        Self {
            timestamp_ms,
            price,
        }
    }
}

/// An OHLC candle as returned by the upstream `/ohlc` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    /// The candle's closing price, used as that day's price.
    pub fn close_point(&self) -> RawPoint {
        RawPoint::new(self.timestamp_ms, self.close)
    }
}

/// The `days` parameter of the market-chart endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartDays {
    Days(u32),
    /// Entire available history.
    Max,
}

impl fmt::Display for ChartDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartDays::Days(d) => write!(f, "{d}"),
            ChartDays::Max => f.write_str("max"),
        }
    }
}

/// A cached series together with its key and write time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub coin_id: String,
    pub days: u32,
    pub series: Series,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh while `now - written_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.written_at) < ttl
    }
}

/// Upstream query shape attempted by the fetch cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Market chart for exactly `days`, forced daily interval.
    DailyChart,
    /// Market chart for `days`, upstream-chosen granularity.
    StandardChart,
    /// Full history at daily interval, sliced locally.
    MaxRange,
    /// OHLC candles for the nearest allowed period, closes sliced locally.
    Ohlc,
    /// 30-day ranged chart requests stitched together.
    SegmentedRange,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::DailyChart,
        StrategyKind::StandardChart,
        StrategyKind::MaxRange,
        StrategyKind::Ohlc,
        StrategyKind::SegmentedRange,
    ];

    /// Short label used in failure reasons and logs.
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::DailyChart => "daily",
            StrategyKind::StandardChart => "standard",
            StrategyKind::MaxRange => "max",
            StrategyKind::Ohlc => "ohlc",
            StrategyKind::SegmentedRange => "range",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a resolved series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesSource {
    /// Synthetic flat $1 series for a pegged coin.
    Stable,
    /// Exact-window fresh cache hit.
    Cache,
    /// Trailing slice of a fresh, larger cached window.
    CacheSlice { parent: u32 },
    /// Fetched upstream by the given strategy.
    Strategy(StrategyKind),
    /// Nothing obtainable.
    None,
}

/// Result of resolving one `(symbol, days)` request.
///
/// An empty `series` is a normal outcome: `reason` then explains why, and the
/// caller is expected to skip the coin. A non-empty series may still carry a
/// reason listing the strategies that failed before one succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesOutcome {
    pub series: Series,
    pub reason: Option<String>,
    pub source: SeriesSource,
    /// Whether any failed strategy was refused with a rate-limit status.
    pub rate_limited: bool,
}

impl SeriesOutcome {
    pub fn found(series: Series, source: SeriesSource) -> Self {
        Self {
            series,
            reason: None,
            source,
            rate_limited: false,
        }
    }

    pub fn missing(reason: impl Into<String>) -> Self {
        Self {
            series: Vec::new(),
            reason: Some(reason.into()),
            source: SeriesSource::None,
            rate_limited: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// The `(series, reason)` pair consumed by the rest of the application.
    pub fn into_parts(self) -> (Series, Option<String>) {
        (self.series, self.reason)
    }
}

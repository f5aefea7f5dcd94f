use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::errors::CoreError;
use crate::models::price::{ChartDays, RawPoint, Series, StrategyKind};
use crate::models::settings::Settings;
use crate::providers::traits::MarketDataSource;
use crate::services::day_series::{dedupe_by_day, slice_last_days, tail};

const SECONDS_PER_DAY: i64 = 86_400;

/// What a strategy needs besides `(coin_id, days)`.
pub struct StrategyContext<'a> {
    pub source: &'a dyn MarketDataSource,
    pub settings: &'a Settings,
    pub now: DateTime<Utc>,
}

/// Outcome of running the strategy list for one coin/window.
#[derive(Debug, Clone, Default)]
pub struct CascadeResult {
    pub series: Series,
    /// The strategy that produced `series`, if any did.
    pub winner: Option<StrategyKind>,
    /// `"<label>: <why>"` for every strategy that failed before the winner.
    pub failures: Vec<String>,
    pub rate_limited: bool,
}

impl CascadeResult {
    /// Failure fragments joined with `"; "`, `None` when nothing failed.
    pub fn reason(&self) -> Option<String> {
        (!self.failures.is_empty()).then(|| self.failures.join("; "))
    }
}

/// Try `settings.strategies` in order until one yields a non-empty series.
///
/// Strategy errors never escape: they are recorded in `failures` and the next
/// strategy runs.
pub async fn run_cascade(ctx: &StrategyContext<'_>, coin_id: &str, days: u32) -> CascadeResult {
    let mut result = CascadeResult::default();

    for &kind in &ctx.settings.strategies {
        debug!(coin_id, days, strategy = %kind, "trying strategy");
        match run_strategy(kind, ctx, coin_id, days).await {
            Ok(series) if !series.is_empty() => {
                info!(coin_id, days, strategy = %kind, points = series.len(), "series fetched");
                result.series = series;
                result.winner = Some(kind);
                return result;
            }
            Ok(_) => {
                debug!(coin_id, days, strategy = %kind, "strategy returned no data");
                result.failures.push(format!("{kind}: no data"));
            }
            Err(e) => {
                debug!(coin_id, days, strategy = %kind, error = %e, "strategy failed");
                result.rate_limited |= e.is_rate_limit();
                result.failures.push(format!("{kind}: {e}"));
            }
        }
    }

    result
}

/// Run one upstream query shape and normalize its output to a daily series.
pub async fn run_strategy(
    kind: StrategyKind,
    ctx: &StrategyContext<'_>,
    coin_id: &str,
    days: u32,
) -> Result<Series, CoreError> {
    let source = ctx.source;
    match kind {
        StrategyKind::DailyChart => {
            let raw = source
                .market_chart(coin_id, ChartDays::Days(days), true)
                .await?;
            Ok(tail(&dedupe_by_day(&raw), days))
        }
        StrategyKind::StandardChart => {
            let raw = source
                .market_chart(coin_id, ChartDays::Days(days), false)
                .await?;
            Ok(tail(&dedupe_by_day(&raw), days))
        }
        StrategyKind::MaxRange => {
            let raw = source.market_chart(coin_id, ChartDays::Max, true).await?;
            Ok(tail(&dedupe_by_day(&raw), days))
        }
        StrategyKind::Ohlc => {
            let period = ohlc_period(days, &ctx.settings.ohlc_periods);
            let candles = source.ohlc(coin_id, period).await?;
            let closes: Vec<RawPoint> = candles.iter().map(|c| c.close_point()).collect();
            Ok(slice_last_days(&dedupe_by_day(&closes), days))
        }
        StrategyKind::SegmentedRange => {
            let windows = segment_windows(ctx.now.timestamp(), days, ctx.settings.segment_days);
            let mut raw = Vec::new();
            for (i, (from, to)) in windows.iter().enumerate() {
                if i > 0 {
                    sleep(ctx.settings.segment_delay.sample()).await;
                }
                raw.extend(source.market_chart_range(coin_id, *from, *to).await?);
            }
            Ok(slice_last_days(&dedupe_by_day(&raw), days))
        }
    }
}

/// Largest allowed OHLC period not above `days`, else the smallest allowed.
pub fn ohlc_period(days: u32, allowed: &[u32]) -> u32 {
    allowed
        .iter()
        .copied()
        .filter(|&p| p <= days)
        .max()
        .or_else(|| allowed.iter().copied().min())
        .unwrap_or(days)
}

/// Split `[now - days, now]` (unix seconds) into consecutive windows of
/// `segment_days`; the last window is clipped at `now`.
pub fn segment_windows(now: i64, days: u32, segment_days: u32) -> Vec<(i64, i64)> {
    let start = now - i64::from(days) * SECONDS_PER_DAY;
    let width = i64::from(segment_days.max(1)) * SECONDS_PER_DAY;

    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < now {
        let end = (cursor + width).min(now);
        windows.push((cursor, end));
        cursor = end;
    }
    windows
}

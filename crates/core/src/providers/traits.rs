use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::price::{Candle, ChartDays, RawPoint};

/// The upstream market-data endpoints the fetch cascade consumes.
///
/// `CoinGeckoProvider` is the production implementation; tests substitute
/// scripted sources. An `Ok` with an empty vec means the endpoint answered
/// but had no data, which the cascade treats like a failure.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Human-readable name of this source (for logs/errors).
    fn name(&self) -> &str;

    /// Chart-by-days. `daily` forces one sample per day.
    async fn market_chart(
        &self,
        coin_id: &str,
        days: ChartDays,
        daily: bool,
    ) -> Result<Vec<RawPoint>, CoreError>;

    /// OHLC candles for one of the upstream's allowed periods.
    async fn ohlc(&self, coin_id: &str, days: u32) -> Result<Vec<Candle>, CoreError>;

    /// Chart between two unix timestamps (seconds).
    async fn market_chart_range(
        &self,
        coin_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<RawPoint>, CoreError>;
}

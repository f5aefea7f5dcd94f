use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::http::HttpFetcher;
use super::traits::MarketDataSource;
use crate::errors::CoreError;
use crate::models::price::{Candle, ChartDays, RawPoint};
use crate::models::settings::Settings;

const VS_CURRENCY: &str = "usd";

/// CoinGecko v3 market data, USD only.
///
/// - **Endpoints**: `/coins/{id}/market_chart`, `/coins/{id}/market_chart/range`,
///   `/coins/{id}/ohlc`
/// - **Auth**: optional API key, sent as headers by [`HttpFetcher`].
///
/// Note: CoinGecko answers some coins with an empty `prices` array instead of
/// an error, rejects `interval=daily` for others, and only serves OHLC for a
/// fixed set of periods. All of those surface here as empty or failed results
/// for the cascade to route around.
pub struct CoinGeckoProvider {
    fetcher: HttpFetcher,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(settings: &Settings) -> Result<Self, CoreError> {
        Ok(Self::with_fetcher(
            HttpFetcher::new(settings)?,
            settings.base_url.clone(),
        ))
    }

    pub fn with_fetcher(fetcher: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn coin_url(&self, coin_id: &str, endpoint: &str) -> String {
        format!("{}/coins/{coin_id}/{endpoint}", self.base_url)
    }
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Deserialize)]
struct MarketChartResponse {
    /// `[[timestamp_ms, price], ...]`; absent or null on some coins.
    #[serde(default)]
    prices: Option<Vec<Vec<Option<f64>>>>,
    #[serde(default)]
    error: Option<Value>,
}

/// `[[timestamp_ms, open, high, low, close], ...]`
type OhlcResponse = Vec<Vec<Option<f64>>>;

fn parse_chart(json: Value) -> Result<Vec<RawPoint>, CoreError> {
    let resp: MarketChartResponse = serde_json::from_value(json)?;
    if let Some(error) = resp.error {
        return Err(CoreError::MalformedResponse(format!(
            "upstream reported error: {error}"
        )));
    }

    let points = resp
        .prices
        .unwrap_or_default()
        .into_iter()
        .filter_map(|row| {
            let ts = (*row.first()?)?;
            let price = to_price((*row.get(1)?)?)?;
            Some(RawPoint::new(ts as i64, price))
        })
        .collect();

    Ok(points)
}

fn parse_ohlc(json: Value) -> Result<Vec<Candle>, CoreError> {
    let rows: OhlcResponse = serde_json::from_value(json)?;

    let candles = rows
        .into_iter()
        .filter_map(|row| {
            if row.len() < 5 {
                return None;
            }
            Some(Candle {
                timestamp_ms: row[0]? as i64,
                open: to_price(row[1]?)?,
                high: to_price(row[2]?)?,
                low: to_price(row[3]?)?,
                close: to_price(row[4]?)?,
            })
        })
        .collect();

    Ok(candles)
}

/// Finite, non-negative floats only.
fn to_price(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Decimal::from_f64(value)
}

#[async_trait]
impl MarketDataSource for CoinGeckoProvider {
    fn name(&self) -> &str {
        "CoinGecko"
    }

    async fn market_chart(
        &self,
        coin_id: &str,
        days: ChartDays,
        daily: bool,
    ) -> Result<Vec<RawPoint>, CoreError> {
        let mut params = vec![
            ("vs_currency", VS_CURRENCY.to_string()),
            ("days", days.to_string()),
        ];
        if daily {
            params.push(("interval", "daily".to_string()));
        }

        let json = self
            .fetcher
            .request(&self.coin_url(coin_id, "market_chart"), &params)
            .await?;
        parse_chart(json)
    }

    async fn ohlc(&self, coin_id: &str, days: u32) -> Result<Vec<Candle>, CoreError> {
        let params = [
            ("vs_currency", VS_CURRENCY.to_string()),
            ("days", days.to_string()),
        ];

        let json = self
            .fetcher
            .request(&self.coin_url(coin_id, "ohlc"), &params)
            .await?;
        parse_ohlc(json)
    }

    async fn market_chart_range(
        &self,
        coin_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<RawPoint>, CoreError> {
        let params = [
            ("vs_currency", VS_CURRENCY.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ];

        let json = self
            .fetcher
            .request(&self.coin_url(coin_id, "market_chart/range"), &params)
            .await?;
        parse_chart(json)
    }
}

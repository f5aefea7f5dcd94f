use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::errors::CoreError;
use crate::models::price::{Series, SeriesOutcome, SeriesSource};
use crate::models::settings::Settings;
use crate::providers::coingecko::CoinGeckoProvider;
use crate::providers::registry::SymbolRegistry;
use crate::providers::traits::MarketDataSource;
use crate::services::cascade::{run_cascade, StrategyContext};
use crate::services::clock::{Clock, SystemClock};
use crate::services::day_series::stable_series;
use crate::storage::cache::{DaySeriesCache, FileSeriesStore, SeriesStore};

/// Resolves `(symbol, days)` into a daily USD price series.
///
/// Resolution order:
/// 1. Stable coins: flat $1 series, no cache, no network.
/// 2. Exact fresh cache entry.
/// 3. Trailing slice of a fresh, larger cached window (365 → 180 → 90).
/// 4. The fetch cascade (`Settings::strategies`), caching the first success.
///
/// Failure to obtain data is not an error: the outcome carries an empty
/// series and a reason, and callers skip that coin.
///
/// Calls for the same coin are serialized so a check-fetch-write sequence
/// never runs twice concurrently for one key.
pub struct HistoryService {
    settings: Settings,
    registry: SymbolRegistry,
    cache: DaySeriesCache,
    source: Arc<dyn MarketDataSource>,
    clock: Arc<dyn Clock>,
    coin_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Per-coin series for a multi-holding chart, plus the coins that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioHistory {
    pub series: BTreeMap<String, Series>,
    /// `(symbol, reason)` for every coin without data.
    pub failures: Vec<(String, String)>,
}

impl HistoryService {
    pub fn new(
        settings: Settings,
        registry: SymbolRegistry,
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn SeriesStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = DaySeriesCache::new(store, settings.ttl(), clock.clone());
        Self {
            settings,
            registry,
            cache,
            source,
            clock,
            coin_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: CoinGecko upstream, file cache in `settings.cache_dir`,
    /// built-in symbol table, system clock.
    pub fn from_settings(settings: Settings) -> Result<Self, CoreError> {
        let source = Arc::new(CoinGeckoProvider::new(&settings)?);
        let store = Arc::new(FileSeriesStore::new(settings.cache_dir.clone()));
        Ok(Self::new(
            settings,
            SymbolRegistry::with_defaults(),
            source,
            store,
            Arc::new(SystemClock),
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &DaySeriesCache {
        &self.cache
    }

    /// Exclusive access to one coin's cache keys.
    pub(crate) async fn lock_coin(&self, coin_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.coin_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(coin_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Resolve one symbol over a trailing window of `days`.
    pub async fn resolve_series(&self, symbol: &str, days: u32) -> SeriesOutcome {
        let symbol = symbol.trim().to_uppercase();

        if days == 0 {
            return SeriesOutcome::missing(format!("{symbol}: window must be at least one day"));
        }
        if days > self.settings.max_window_days {
            return SeriesOutcome::missing(format!(
                "{symbol}: window of {days} days exceeds the {}-day limit",
                self.settings.max_window_days
            ));
        }

        if self.registry.is_stable(&symbol) {
            debug!(%symbol, days, "flat $1 series for stable coin");
            let today = self.clock.now().date_naive();
            return SeriesOutcome::found(stable_series(today, days), SeriesSource::Stable);
        }

        let coin_id = match self.registry.resolve(&symbol) {
            Ok(id) => id.to_string(),
            Err(e) => return SeriesOutcome::missing(e.to_string()),
        };

        let _guard = self.lock_coin(&coin_id).await;

        if let Some(series) = self.cache.get(&coin_id, days) {
            debug!(%symbol, days, points = series.len(), "cache hit");
            return SeriesOutcome::found(series, SeriesSource::Cache);
        }

        if let Some((parent, series)) =
            self.cache
                .get_sliced(&coin_id, days, &self.settings.parent_windows)
        {
            debug!(%symbol, days, parent, "cache slice hit");
            return SeriesOutcome::found(series, SeriesSource::CacheSlice { parent });
        }

        let ctx = StrategyContext {
            source: self.source.as_ref(),
            settings: &self.settings,
            now: self.clock.now(),
        };
        let cascade = run_cascade(&ctx, &coin_id, days).await;
        let reason = cascade.reason();

        match cascade.winner {
            Some(kind) => {
                self.cache.put(&coin_id, days, &cascade.series);
                SeriesOutcome {
                    series: cascade.series,
                    reason,
                    source: SeriesSource::Strategy(kind),
                    rate_limited: cascade.rate_limited,
                }
            }
            None => {
                info!(%symbol, days, reason = reason.as_deref().unwrap_or(""), "no series obtainable");
                SeriesOutcome {
                    series: Vec::new(),
                    reason: Some(reason.unwrap_or_else(|| "no data".to_string())),
                    source: SeriesSource::None,
                    rate_limited: cascade.rate_limited,
                }
            }
        }
    }

    /// Resolve several coins one after another, pausing `settings.throttle`
    /// between coins. Coins without data are listed in `failures`.
    pub async fn resolve_many<S: AsRef<str>>(&self, symbols: &[S], days: u32) -> PortfolioHistory {
        let mut history = PortfolioHistory::default();

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 {
                sleep(self.settings.throttle).await;
            }
            let symbol = symbol.as_ref().trim().to_uppercase();
            let outcome = self.resolve_series(&symbol, days).await;
            if outcome.is_empty() {
                let reason = outcome.reason.unwrap_or_else(|| "no data".to_string());
                history.failures.push((symbol, reason));
            } else {
                history.series.insert(symbol, outcome.series);
            }
        }

        history
    }
}

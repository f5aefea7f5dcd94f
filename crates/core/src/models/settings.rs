use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::price::StrategyKind;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_CACHE_DIR: &str = ".cg_cache";

/// A uniformly sampled delay in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    pub min: Duration,
    pub max: Duration,
}

impl JitterRange {
    pub const ZERO: JitterRange = JitterRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub const fn millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::rng().random_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

/// Backoff parameters for the HTTP fetch primitive.
///
/// `attempt` is zero-based everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// 429/418: `rate_limit_unit * rate_limit_base^attempt + jitter`.
    pub rate_limit_unit: Duration,
    pub rate_limit_base: f64,
    pub rate_limit_jitter: JitterRange,
    /// 5xx / malformed body: `server_error_delay + server_error_step * attempt`.
    pub server_error_delay: Duration,
    pub server_error_step: Duration,
    /// Transport failure: `transport_delay + transport_step * attempt + jitter`.
    pub transport_delay: Duration,
    pub transport_step: Duration,
    pub transport_jitter: JitterRange,
    /// Upper bound on the exponential part of the rate-limit delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            rate_limit_unit: Duration::from_secs(1),
            rate_limit_base: 1.6,
            rate_limit_jitter: JitterRange::millis(400, 900),
            server_error_delay: Duration::from_millis(500),
            server_error_step: Duration::from_millis(300),
            transport_delay: Duration::from_millis(350),
            transport_step: Duration::from_millis(250),
            transport_jitter: JitterRange::millis(0, 250),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rate_limit_unit: Duration::ZERO,
            rate_limit_base: 1.0,
            rate_limit_jitter: JitterRange::ZERO,
            server_error_delay: Duration::ZERO,
            server_error_step: Duration::ZERO,
            transport_delay: Duration::ZERO,
            transport_step: Duration::ZERO,
            transport_jitter: JitterRange::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.rate_limit_unit.as_secs_f64() * self.rate_limit_base.powi(exponent);
        let backoff = Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff);
        backoff.saturating_add(self.rate_limit_jitter.sample())
    }

    pub fn server_error_delay(&self, attempt: u32) -> Duration {
        self.server_error_delay
            .saturating_add(self.server_error_step.saturating_mul(attempt))
    }

    pub fn transport_delay(&self, attempt: u32) -> Duration {
        self.transport_delay
            .saturating_add(self.transport_step.saturating_mul(attempt))
            .saturating_add(self.transport_jitter.sample())
    }
}

/// Engine configuration, passed explicitly to `HistoryService`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Upstream API root, without trailing slash.
    pub base_url: String,

    /// Sent as request headers only, never in the query string.
    pub api_key: Option<String>,

    /// Directory holding one file per `(coin_id, days)` cache record.
    pub cache_dir: PathBuf,

    /// Entries younger than this are served without a network call.
    pub cache_ttl: Duration,

    /// Fixed pause between coins in batch operations.
    pub throttle: Duration,
    pub throttle_jitter: JitterRange,

    /// Per-request timeout; exceeding it counts as a transport failure.
    pub request_timeout: Duration,

    /// Requests allowed in flight at once through one fetcher.
    pub max_concurrent_requests: usize,

    /// Minimum spacing between the starts of any two outbound requests.
    pub min_request_spacing: Duration,

    pub retry: RetryPolicy,

    /// Longest window `resolve_series` accepts, in days.
    pub max_window_days: u32,

    /// Window length of each ranged request in the segmented strategy.
    pub segment_days: u32,
    pub segment_delay: JitterRange,

    /// Larger cached windows that may be sliced down, largest first.
    pub parent_windows: Vec<u32>,

    /// Periods accepted by the OHLC endpoint, largest first.
    pub ohlc_periods: Vec<u32>,

    /// Cascade order after the cache checks.
    pub strategies: Vec<StrategyKind>,

    /// Symbols to prewarm when the caller passes none. `None` = every mapped coin.
    pub prewarm_symbols: Option<Vec<String>>,

    /// Consecutive rate-limited coins after which prewarm stops.
    pub prewarm_rate_limit_abort: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_ttl: Duration::from_secs(6 * 3600),
            throttle: Duration::from_millis(850),
            throttle_jitter: JitterRange::millis(50, 250),
            request_timeout: Duration::from_secs(25),
            max_concurrent_requests: 1,
            min_request_spacing: Duration::ZERO,
            retry: RetryPolicy::default(),
            max_window_days: 7300,
            segment_days: 30,
            segment_delay: JitterRange::millis(150, 350),
            parent_windows: vec![365, 180, 90],
            ohlc_periods: vec![365, 180, 90, 30, 14, 7],
            strategies: StrategyKind::ALL.to_vec(),
            prewarm_symbols: None,
            prewarm_rate_limit_abort: 5,
        }
    }
}

impl Settings {
    /// Defaults overridden by environment variables:
    ///
    /// | variable | field |
    /// |---|---|
    /// | `COINGECKO_API_KEY` (or `COINGECKO_API`) | `api_key` |
    /// | `COINGECKO_BASE_URL` | `base_url` |
    /// | `CG_CACHE_DIR` | `cache_dir` |
    /// | `CG_CACHE_TTL_SECS` | `cache_ttl` |
    /// | `CG_THROTTLE_MS` | `throttle` |
    /// | `CG_PREWARM_COINS` | `prewarm_symbols` (comma separated) |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Settings::from_env`] but reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Settings {
            api_key: var("COINGECKO_API_KEY").or_else(|| var("COINGECKO_API")),
            ..Settings::default()
        };

        if let Some(url) = var("COINGECKO_BASE_URL") {
            settings.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = var("CG_CACHE_DIR") {
            settings.cache_dir = PathBuf::from(dir);
        }
        if let Some(secs) = var("CG_CACHE_TTL_SECS") {
            settings.cache_ttl = Duration::from_secs(parse_number("CG_CACHE_TTL_SECS", &secs)?);
        }
        if let Some(ms) = var("CG_THROTTLE_MS") {
            settings.throttle = Duration::from_millis(parse_number("CG_THROTTLE_MS", &ms)?);
        }
        if let Some(list) = var("CG_PREWARM_COINS") {
            settings.prewarm_symbols = Some(parse_symbol_list(&list));
        }

        Ok(settings)
    }

    /// The TTL as a chrono duration for comparisons against timestamps.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cache_ttl).unwrap_or(chrono::Duration::MAX)
    }
}

/// Split `"btc, eth,,SOL"` into `["BTC", "ETH", "SOL"]`.
pub fn parse_symbol_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number(name: &str, value: &str) -> Result<u64, CoreError> {
    value
        .parse()
        .map_err(|e| CoreError::Config(format!("{name}={value:?}: {e}")))
}

use std::collections::HashSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::models::price::PricePoint;
use crate::services::day_series::tail;
use crate::services::history_service::HistoryService;

/// Window fetched once per coin.
pub const PREWARM_WINDOW: u32 = 365;

/// Windows derived locally from the prewarm window.
pub const DERIVED_WINDOWS: [u32; 2] = [180, 90];

/// How many entries of each list `PrewarmReport::summary` prints.
const SUMMARY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrewarmedSymbol {
    pub symbol: String,
    /// Derived from an existing 365-day entry without a network call.
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// Partial-success report of a prewarm batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrewarmReport {
    pub succeeded: Vec<PrewarmedSymbol>,
    pub skipped: Vec<SkippedSymbol>,
    /// Set when the batch stopped after persistent rate limiting; symbols
    /// after that point appear in neither list.
    pub stopped_early: Option<String>,
}

impl PrewarmReport {
    pub fn succeeded_symbols(&self) -> Vec<&str> {
        self.succeeded.iter().map(|s| s.symbol.as_str()).collect()
    }

    /// Human-readable summary, at most ten entries per list.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        if !self.succeeded.is_empty() {
            let names: Vec<String> = self
                .succeeded
                .iter()
                .take(SUMMARY_LIMIT)
                .map(|s| {
                    if s.from_cache {
                        format!("{} (cache)", s.symbol)
                    } else {
                        s.symbol.clone()
                    }
                })
                .collect();
            let more = if self.succeeded.len() > SUMMARY_LIMIT { "…" } else { "" };
            lines.push(format!("Cached: {}{more}", names.join(", ")));
        }

        let mut skipped: Vec<String> = self
            .skipped
            .iter()
            .map(|s| format!("{}: {}", s.symbol, s.reason))
            .collect();
        if let Some(notice) = &self.stopped_early {
            skipped.push(notice.clone());
        }
        if !skipped.is_empty() {
            let more = if skipped.len() > SUMMARY_LIMIT { "\n…" } else { "" };
            let shown: Vec<&str> = skipped.iter().take(SUMMARY_LIMIT).map(String::as_str).collect();
            lines.push(format!("Skipped:\n- {}{more}", shown.join("\n- ")));
        }

        if lines.is_empty() {
            "Done.".to_string()
        } else {
            lines.join("\n")
        }
    }
}

impl HistoryService {
    /// Symbols a prewarm batch would visit.
    ///
    /// Explicit `symbols` win over `Settings::prewarm_symbols`; with neither,
    /// every mapped non-stable symbol is used. Unknown and stable symbols
    /// are dropped from explicit lists.
    pub fn prewarm_candidates(&self, symbols: Option<&[String]>) -> Vec<String> {
        let requested = symbols.or(self.settings().prewarm_symbols.as_deref());
        let Some(requested) = requested else {
            return self.registry().mapped_symbols();
        };

        let mut seen = HashSet::new();
        requested
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .filter(|s| self.registry().resolve(s).is_ok() && !self.registry().is_stable(s))
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    /// Populate 365/180/90-day cache entries for a batch of coins.
    ///
    /// A coin with any 365-day entry (fresh or stale) is sliced locally with
    /// no network call. Otherwise its 365-day series is resolved through the
    /// cascade and the shorter windows are derived from it. The batch stops
    /// after `Settings::prewarm_rate_limit_abort` consecutive coins fail with
    /// rate limiting.
    pub async fn prewarm(&self, symbols: Option<&[String]>) -> PrewarmReport {
        let candidates = self.prewarm_candidates(symbols);
        let mut report = PrewarmReport::default();
        let mut consecutive_rate_limits = 0u32;
        let abort_after = self.settings().prewarm_rate_limit_abort.max(1);

        info!(count = candidates.len(), "prewarm started");

        for (i, symbol) in candidates.iter().enumerate() {
            let coin_id = match self.registry().resolve(symbol) {
                Ok(id) => id.to_string(),
                Err(e) => {
                    report.skipped.push(SkippedSymbol {
                        symbol: symbol.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let cached = {
                let _guard = self.lock_coin(&coin_id).await;
                match self.cache().get_raw(&coin_id, PREWARM_WINDOW) {
                    Some(series) => {
                        self.derive_windows(&coin_id, &series);
                        true
                    }
                    None => false,
                }
            };

            if cached {
                debug!(%symbol, "derived shorter windows from cached 365-day series");
                report.succeeded.push(PrewarmedSymbol {
                    symbol: symbol.clone(),
                    from_cache: true,
                });
                consecutive_rate_limits = 0;
                continue;
            }

            let outcome = self.resolve_series(symbol, PREWARM_WINDOW).await;
            if outcome.is_empty() {
                let reason = outcome.reason.unwrap_or_else(|| "no data".to_string());
                warn!(%symbol, %reason, "prewarm skipped");
                report.skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason,
                });
                if outcome.rate_limited {
                    consecutive_rate_limits += 1;
                } else {
                    consecutive_rate_limits = 0;
                }
            } else {
                {
                    let _guard = self.lock_coin(&coin_id).await;
                    self.derive_windows(&coin_id, &outcome.series);
                }
                report.succeeded.push(PrewarmedSymbol {
                    symbol: symbol.clone(),
                    from_cache: false,
                });
                consecutive_rate_limits = 0;
            }

            if consecutive_rate_limits >= abort_after {
                warn!(consecutive_rate_limits, "prewarm stopped early");
                report.stopped_early = Some("Stopped early due to persistent rate limit.".to_string());
                break;
            }

            if i + 1 < candidates.len() {
                let pause = self.settings().throttle + self.settings().throttle_jitter.sample();
                sleep(pause).await;
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            stopped_early = report.stopped_early.is_some(),
            "prewarm finished"
        );
        report
    }

    /// Cache the trailing 180- and 90-point slices of a 365-day series.
    fn derive_windows(&self, coin_id: &str, series: &[PricePoint]) {
        for window in DERIVED_WINDOWS {
            self.cache().put(coin_id, window, &tail(series, window));
        }
    }
}

//! Historical price resolution for the crypto portfolio tracker.
//!
//! The rest of the application asks for `(symbol, days)` and gets back a
//! day-granular USD series, resolved cache-first against a rate-limited
//! upstream through an ordered fallback cascade:
//!
//! ```no_run
//! # async fn demo() -> Result<(), crypto_history_core::errors::CoreError> {
//! use crypto_history_core::{HistoryService, Settings};
//!
//! let service = HistoryService::from_settings(Settings::from_env()?)?;
//! let (series, reason) = service.resolve_series("BTC", 90).await.into_parts();
//! if series.is_empty() {
//!     eprintln!("skipping BTC: {}", reason.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

pub use errors::CoreError;
pub use models::price::{PricePoint, Series, SeriesOutcome, SeriesSource, StrategyKind};
pub use models::settings::{RetryPolicy, Settings};
pub use providers::registry::SymbolRegistry;
pub use services::history_service::{HistoryService, PortfolioHistory};
pub use services::prewarm::PrewarmReport;

pub mod registry;
pub mod traits;

// Upstream access
pub mod coingecko;
pub mod http;

// ═══════════════════════════════════════════════════════════════════
// Provider Tests — SymbolRegistry, CoinGecko endpoint parsing
// ═══════════════════════════════════════════════════════════════════

use mockito::{Matcher, Server, ServerGuard};
use rust_decimal::Decimal;
use std::str::FromStr;

use crypto_history_core::errors::CoreError;
use crypto_history_core::models::price::ChartDays;
use crypto_history_core::models::settings::{RetryPolicy, Settings};
use crypto_history_core::providers::coingecko::CoinGeckoProvider;
use crypto_history_core::providers::http::HttpFetcher;
use crypto_history_core::providers::registry::SymbolRegistry;
use crypto_history_core::providers::traits::MarketDataSource;

fn provider(server: &ServerGuard) -> CoinGeckoProvider {
    let settings = Settings {
        retry: RetryPolicy::immediate(1),
        ..Settings::default()
    };
    let fetcher = HttpFetcher::new(&settings).unwrap();
    CoinGeckoProvider::with_fetcher(fetcher, format!("{}/", server.url()))
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// SymbolRegistry
// ═══════════════════════════════════════════════════════════════════

mod registry {
    use super::*;

    #[test]
    fn defaults_cover_majors() {
        let registry = SymbolRegistry::with_defaults();
        assert_eq!(registry.resolve("BTC").unwrap(), "bitcoin");
        assert_eq!(registry.resolve("ETH").unwrap(), "ethereum");
        assert_eq!(registry.resolve("AVAX").unwrap(), "avalanche-2");
        assert!(registry.len() > 50);
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let registry = SymbolRegistry::with_defaults();
        assert_eq!(registry.resolve("sol").unwrap(), "solana");
        assert_eq!(registry.resolve(" Doge ").unwrap(), "dogecoin");
    }

    #[test]
    fn unknown_symbol_is_not_mapped() {
        let registry = SymbolRegistry::with_defaults();
        let err = registry.resolve("xyz").unwrap_err();
        assert!(matches!(&err, CoreError::NotMapped { symbol } if symbol == "XYZ"));
        assert_eq!(err.to_string(), "XYZ: no mapping");
    }

    #[test]
    fn stables() {
        let registry = SymbolRegistry::with_defaults();
        for symbol in ["USDT", "USDC", "DAI", "FRAX", "TUSD", "USDD", "usdt"] {
            assert!(registry.is_stable(symbol), "{symbol} should be stable");
        }
        assert!(!registry.is_stable("BTC"));
    }

    #[test]
    fn mapped_symbols_exclude_stables_and_are_sorted() {
        let registry = SymbolRegistry::with_defaults();
        let symbols = registry.mapped_symbols();
        assert!(!symbols.contains(&"USDT".to_string()));
        let mut sorted = symbols.clone();
        sorted.sort();
        assert_eq!(symbols, sorted);
    }

    #[test]
    fn custom_registry() {
        let mut registry = SymbolRegistry::new();
        assert!(registry.is_empty());

        registry.insert("pepe", "pepe");
        registry.insert("WIF", "dogwifcoin");
        registry.mark_stable("pyusd");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("PEPE").unwrap(), "pepe");
        assert!(registry.is_stable("PYUSD"));
        assert!(registry.resolve("BTC").is_err());
    }

    #[test]
    fn insert_replaces_existing_mapping() {
        let mut registry = SymbolRegistry::with_defaults();
        registry.insert("MATIC", "polygon-ecosystem-token");
        assert_eq!(registry.resolve("MATIC").unwrap(), "polygon-ecosystem-token");
    }
}

// ═══════════════════════════════════════════════════════════════════
// CoinGecko market_chart
// ═══════════════════════════════════════════════════════════════════

mod market_chart {
    use super::*;

    #[tokio::test]
    async fn daily_request_sets_interval() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/coins/bitcoin/market_chart")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
                Matcher::UrlEncoded("days".into(), "30".into()),
                Matcher::UrlEncoded("interval".into(), "daily".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"prices": [[1719705600000, 61234.5], [1719792000000, 62000]],
                    "market_caps": [], "total_volumes": []}"#,
            )
            .create_async()
            .await;

        let points = provider(&server)
            .market_chart("bitcoin", ChartDays::Days(30), true)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp_ms, 1_719_705_600_000);
        assert_eq!(points[0].price, dec("61234.5"));
        assert_eq!(points[1].price, dec("62000"));
    }

    #[tokio::test]
    async fn standard_request_omits_interval() {
        let mut server = Server::new_async().await;
        let with_interval = server
            .mock("GET", "/coins/ethereum/market_chart")
            .match_query(Matcher::UrlEncoded("interval".into(), "daily".into()))
            .with_status(200)
            .with_body(r#"{"prices": []}"#)
            .expect(0)
            .create_async()
            .await;
        let without = server
            .mock("GET", "/coins/ethereum/market_chart")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"prices": [[1719705600000, 3400.25]]}"#)
            .create_async()
            .await;

        let points = provider(&server)
            .market_chart("ethereum", ChartDays::Days(90), false)
            .await
            .unwrap();

        with_interval.assert_async().await;
        without.assert_async().await;
        assert_eq!(points.len(), 1);
    }

    #[tokio::test]
    async fn max_history_sends_max() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/coins/bitcoin/market_chart")
            .match_query(Matcher::UrlEncoded("days".into(), "max".into()))
            .with_status(200)
            .with_body(r#"{"prices": [[1719705600000, 1]]}"#)
            .create_async()
            .await;

        provider(&server)
            .market_chart("bitcoin", ChartDays::Max, true)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_or_null_prices_are_empty_or_skipped() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/coins/bitcoin/market_chart")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"prices": [[1719705600000, null], [1719792000000, 5], [1719878400000]]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/coins/tether/market_chart")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"market_caps": []}"#)
            .create_async()
            .await;

        let p = provider(&server);
        let points = p
            .market_chart("bitcoin", ChartDays::Days(3), true)
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price, dec("5"));

        let none = p
            .market_chart("tether", ChartDays::Days(3), true)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn negative_prices_are_dropped() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/coins/bitcoin/market_chart")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"prices": [[1719705600000, -1.0], [1719792000000, 0.5]]}"#)
            .create_async()
            .await;

        let points = provider(&server)
            .market_chart("bitcoin", ChartDays::Days(2), true)
            .await
            .unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price, dec("0.5"));
    }

    #[tokio::test]
    async fn error_body_is_a_malformed_response() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/coins/bitcoin/market_chart")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error": "coin not found"}"#)
            .create_async()
            .await;

        let err = provider(&server)
            .market_chart("bitcoin", ChartDays::Days(30), true)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::MalformedResponse(_)));
        assert!(err.to_string().contains("coin not found"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// CoinGecko ohlc and range
// ═══════════════════════════════════════════════════════════════════

mod other_endpoints {
    use super::*;

    #[tokio::test]
    async fn ohlc_parses_candles() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/coins/solana/ohlc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
                Matcher::UrlEncoded("days".into(), "30".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[[1719705600000, 140, 150.5, 135, 148.25],
                    [1719792000000, 148, 152, 147],
                    [1719878400000, 148.25, 155, 146, 151]]"#,
            )
            .create_async()
            .await;

        let candles = provider(&server).ohlc("solana", 30).await.unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec("140"));
        assert_eq!(candles[0].high, dec("150.5"));
        assert_eq!(candles[0].close, dec("148.25"));
        assert_eq!(candles[1].close_point().price, dec("151"));
    }

    #[tokio::test]
    async fn ohlc_object_body_is_malformed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/coins/solana/ohlc")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error": "invalid days"}"#)
            .create_async()
            .await;

        let err = provider(&server).ohlc("solana", 2).await.unwrap_err();
        assert!(matches!(err, CoreError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn range_sends_unix_bounds() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/coins/cardano/market_chart/range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
                Matcher::UrlEncoded("from".into(), "1717200000".into()),
                Matcher::UrlEncoded("to".into(), "1719792000".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"prices": [[1717200000000, 0.45], [1719705600000, 0.39]]}"#)
            .create_async()
            .await;

        let points = provider(&server)
            .market_chart_range("cardano", 1_717_200_000, 1_719_792_000)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].price, dec("0.39"));
    }

    #[tokio::test]
    async fn upstream_rate_limit_surfaces_as_rate_limited() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/coins/cardano/market_chart/range")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let err = provider(&server)
            .market_chart_range("cardano", 0, 86_400)
            .await
            .unwrap_err();

        assert!(err.is_rate_limit());
    }

    #[test]
    fn provider_name() {
        let settings = Settings::default();
        let provider = CoinGeckoProvider::new(&settings).unwrap();
        assert_eq!(provider.name(), "CoinGecko");
    }
}

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::CoreError;

/// Ticker → CoinGecko coin id, seeded with the coins the tracker supports.
const DEFAULT_COIN_IDS: &[(&str, &str)] = &[
    // L1 / majors
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("TRX", "tron"),
    ("DOT", "polkadot"),
    ("LTC", "litecoin"),
    ("ATOM", "cosmos"),
    ("NEAR", "near"),
    ("AVAX", "avalanche-2"),
    ("TON", "toncoin"),
    ("MATIC", "matic-network"),
    ("POL", "pol-ex-matic"),
    ("ETC", "ethereum-classic"),
    ("ICP", "internet-computer"),
    ("ALGO", "algorand"),
    ("EGLD", "multiversx"),
    ("KAS", "kaspa"),
    ("SEI", "sei-network"),
    ("TIA", "celestia"),
    ("STX", "stacks"),
    ("RON", "ronin"),
    ("AR", "arweave"),
    ("OP", "optimism"),
    ("ARB", "arbitrum"),
    ("APT", "aptos"),
    ("SUI", "sui"),
    ("KAVA", "kava"),
    ("FTM", "fantom"),
    ("HBAR", "hedera-hashgraph"),
    // Stables
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("DAI", "dai"),
    ("FRAX", "frax"),
    ("TUSD", "true-usd"),
    ("USDD", "usdd"),
    // Wrapped / staking
    ("WBTC", "wrapped-bitcoin"),
    ("WETH", "weth"),
    ("RPL", "rocket-pool"),
    ("LDO", "lido-dao"),
    // DeFi / infra
    ("AAVE", "aave"),
    ("UNI", "uniswap"),
    ("SNX", "synthetix-network-token"),
    ("COMP", "compound-governance-token"),
    ("GMX", "gmx"),
    ("DYDX", "dydx"),
    ("PENDLE", "pendle"),
    ("AERO", "aerodrome-finance"),
    ("ONDO", "ondo"),
    ("ETHFI", "ether-fi"),
    ("W", "wormhole"),
    // Oracles / data
    ("LINK", "chainlink"),
    ("PYTH", "pyth-network"),
    // AI / compute
    ("RNDR", "render"),
    ("GRT", "the-graph"),
    // Storage
    ("FIL", "filecoin"),
    // L2 / ZK
    ("STRK", "starknet"),
    ("ZK", "zksync"),
    // Solana ecosystem
    ("JUP", "jupiter"),
    ("JTO", "jito"),
    ("RAY", "raydium"),
    ("BONK", "bonk"),
    ("WIF", "dogwifhat"),
    // Memes
    ("PEPE", "pepe"),
    ("SHIB", "shiba-inu"),
    ("FLOKI", "floki"),
    // Exchange / governance
    ("INJ", "injective"),
    ("MKR", "maker"),
    ("RUNE", "thorchain"),
    ("LRC", "loopring"),
    // Gaming
    ("AXS", "axie-infinity"),
    ("SAND", "the-sandbox"),
    ("MANA", "decentraland"),
    ("IMX", "immutable"),
    // Wallet / misc
    ("TWT", "trust-wallet-token"),
    ("JASMY", "jasmycoin"),
    ("JOE", "joe"),
    ("WLD", "worldcoin"),
    ("ORDI", "ordi"),
    ("BCH", "bitcoin-cash"),
    ("XLM", "stellar"),
    ("XMR", "monero"),
    ("DASH", "dash"),
    ("ZEC", "zcash"),
    ("VET", "vechain"),
    ("VRA", "verasity"),
];

/// Pegged coins priced at a flat $1 without touching the network.
const DEFAULT_STABLES: &[&str] = &["USDT", "USDC", "DAI", "FRAX", "TUSD", "USDD"];

/// Static mapping from ticker symbol to upstream coin identifier.
///
/// Lookups are case-insensitive; symbols are stored upper-cased.
/// Extra mappings can be registered at runtime with [`SymbolRegistry::insert`].
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    coin_ids: BTreeMap<String, String>,
    stables: BTreeSet<String>,
}

impl SymbolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            coin_ids: BTreeMap::new(),
            stables: BTreeSet::new(),
        }
    }

    /// Create a registry with the built-in coin table and stable set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (symbol, id) in DEFAULT_COIN_IDS {
            registry.insert(symbol, id);
        }
        for symbol in DEFAULT_STABLES {
            registry.mark_stable(symbol);
        }
        registry
    }

    /// Register (or replace) a symbol → coin id mapping.
    pub fn insert(&mut self, symbol: &str, coin_id: &str) {
        self.coin_ids
            .insert(symbol.trim().to_uppercase(), coin_id.to_string());
    }

    /// Treat `symbol` as pegged to $1.
    pub fn mark_stable(&mut self, symbol: &str) {
        self.stables.insert(symbol.trim().to_uppercase());
    }

    /// Resolve a ticker like "btc" to its coin id ("bitcoin").
    pub fn resolve(&self, symbol: &str) -> Result<&str, CoreError> {
        let upper = symbol.trim().to_uppercase();
        self.coin_ids
            .get(&upper)
            .map(String::as_str)
            .ok_or(CoreError::NotMapped { symbol: upper })
    }

    pub fn is_stable(&self, symbol: &str) -> bool {
        self.stables.contains(&symbol.trim().to_uppercase())
    }

    /// All mapped symbols that need a network fetch, sorted.
    pub fn mapped_symbols(&self) -> Vec<String> {
        self.coin_ids
            .keys()
            .filter(|s| !self.stables.contains(*s))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.coin_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coin_ids.is_empty()
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

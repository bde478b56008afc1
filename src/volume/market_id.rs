use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

const MARKET_ID_LEN: usize = 10;

/// Aggregation key for daily volume: a short SHA-256 digest of
/// `{exchange}_{base}_{quote}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    pub fn new(exchange_name: &str, base_asset_code: &str, quote_asset_code: &str) -> Self {
        let id = format!("{}_{}_{}", exchange_name, base_asset_code, quote_asset_code);
        let digest = hex::encode(Sha256::digest(id.as_bytes()));
        Self(digest[..MARKET_ID_LEN].to_string())
    }

    /// Wrap an id that was computed elsewhere (e.g. listed in config)
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `first` followed by `others`, each id kept once, first occurrence wins
pub fn dedupe_market_ids(first: MarketId, others: &[MarketId]) -> Vec<MarketId> {
    let mut seen = HashSet::with_capacity(others.len() + 1);
    std::iter::once(first)
        .chain(others.iter().cloned())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_id_is_deterministic() {
        let a = MarketId::new("kraken", "XLM", "USD");
        let b = MarketId::new("kraken", "XLM", "USD");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), MARKET_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_market_id_depends_on_every_part() {
        let base = MarketId::new("kraken", "XLM", "USD");
        assert_ne!(base, MarketId::new("binance", "XLM", "USD"));
        assert_ne!(base, MarketId::new("kraken", "BTC", "USD"));
        assert_ne!(base, MarketId::new("kraken", "XLM", "EUR"));
    }

    #[test]
    fn test_dedupe_keeps_first_market_once() {
        let first = MarketId::from_raw("own");
        let others = vec![
            MarketId::from_raw("m1"),
            MarketId::from_raw("own"),
            MarketId::from_raw("m1"),
            MarketId::from_raw("m2"),
        ];
        let ids: Vec<String> = dedupe_market_ids(first, &others)
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["own", "m1", "m2"]);
    }
}

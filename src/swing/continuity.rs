//! Price continuity map
//!
//! Remembers which swing price produced each displayed level price so a
//! fill at that price can be traced back to its swing anchor. One map is
//! shared by the buy and sell providers of a market; both sides write real
//! (quote per base) prices into it.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::OrderSide;

#[derive(Debug, Clone, Default)]
pub struct PriceContinuityMap {
    entries: Arc<Mutex<HashMap<Decimal, Decimal>>>,
}

impl PriceContinuityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the swing price for a quantized level price
    pub fn upsert(&self, price: Decimal, swing_price: Decimal) {
        self.entries.lock().insert(price.normalize(), swing_price);
    }

    pub fn get(&self, price: Decimal) -> Option<Decimal> {
        self.entries.lock().get(&price.normalize()).copied()
    }

    /// Resolve a quantized trade price back to a swing price.
    ///
    /// An exact key wins. Otherwise the nearest key on the side the trade
    /// came from is used: strictly above the trade price for a buy, strictly
    /// below it for a sell. `None` when no key qualifies.
    pub fn resolve(&self, trade_price: Decimal, trade_side: OrderSide) -> Option<Decimal> {
        let entries = self.entries.lock();
        if let Some(swing) = entries.get(&trade_price.normalize()) {
            return Some(*swing);
        }

        let mut closest: Option<(Decimal, Decimal)> = None;
        for (&price, &swing) in entries.iter() {
            let on_side = match trade_side {
                OrderSide::Buy => price > trade_price,
                OrderSide::Sell => price < trade_price,
            };
            if !on_side {
                continue;
            }
            let nearer = match closest {
                None => true,
                Some((best, _)) => match trade_side {
                    OrderSide::Buy => price < best,
                    OrderSide::Sell => price > best,
                },
            };
            if nearer {
                closest = Some((price, swing));
            }
        }

        if let Some((price, swing)) = closest {
            debug!(
                %trade_price,
                closest_price = %price,
                %swing,
                "trade price not in continuity map, using closest entry"
            );
        }
        closest.map(|(_, swing)| swing)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries sorted by price
    pub fn snapshot(&self) -> Vec<(Decimal, Decimal)> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(price, swing)| (*price, *swing))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn log_entries(&self) {
        if self.is_empty() {
            debug!("price continuity map is empty");
            return;
        }
        let entries = self.snapshot();
        debug!(count = entries.len(), "price continuity map");
        for (price, swing) in entries {
            debug!("    {} -> {}", price, swing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded() -> PriceContinuityMap {
        let map = PriceContinuityMap::new();
        map.upsert(dec!(1.0), dec!(0.99));
        map.upsert(dec!(1.2), dec!(1.19));
        map.upsert(dec!(1.4), dec!(1.39));
        map
    }

    #[test]
    fn test_exact_match_ignores_scale() {
        let map = seeded();
        assert_eq!(map.resolve(dec!(1.20000), OrderSide::Buy), Some(dec!(1.19)));
        assert_eq!(map.get(dec!(1.4000000)), Some(dec!(1.39)));
    }

    #[test]
    fn test_buy_trade_takes_nearest_price_above() {
        let map = seeded();
        assert_eq!(map.resolve(dec!(1.1), OrderSide::Buy), Some(dec!(1.19)));
        assert_eq!(map.resolve(dec!(0.5), OrderSide::Buy), Some(dec!(0.99)));
    }

    #[test]
    fn test_sell_trade_takes_nearest_price_below() {
        let map = seeded();
        assert_eq!(map.resolve(dec!(1.3), OrderSide::Sell), Some(dec!(1.19)));
        assert_eq!(map.resolve(dec!(9), OrderSide::Sell), Some(dec!(1.39)));
    }

    #[test]
    fn test_no_qualifying_entry_is_unknown() {
        let map = seeded();
        assert_eq!(map.resolve(dec!(2.0), OrderSide::Buy), None);
        assert_eq!(map.resolve(dec!(0.1), OrderSide::Sell), None);
        assert_eq!(PriceContinuityMap::new().resolve(dec!(1), OrderSide::Sell), None);
    }

    #[test]
    fn test_upsert_keeps_one_entry_per_price() {
        let map = seeded();
        map.upsert(dec!(1.20), dec!(1.5));
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(dec!(1.2)), Some(dec!(1.5)));
    }

    #[test]
    fn test_clones_share_entries() {
        let buy_side = PriceContinuityMap::new();
        let sell_side = buy_side.clone();
        sell_side.upsert(dec!(2.02), dec!(2.02));
        assert_eq!(buy_side.get(dec!(2.02)), Some(dec!(2.02)));
    }

    #[test]
    fn test_concurrent_upserts() {
        let map = PriceContinuityMap::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        map.upsert(Decimal::from(t * 100 + i), Decimal::from(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 400);
    }
}

use anyhow::{anyhow, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimals every price and amount is quantized to before it
/// leaves the core.
pub const DEFAULT_PRECISION: u32 = 7;

/// Market identity: base asset priced in quote asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rung of a ladder produced by a level provider.
///
/// `amount` is always expressed in base units of the real pair. For the
/// buy side `price` is inverted (base per quote).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
}

/// An order-mutation intent. `price` is quote per base, `amount` is base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
}

impl Operation {
    pub fn sell(price: Decimal, amount: Decimal) -> Self {
        Self {
            side: OrderSide::Sell,
            price,
            amount,
        }
    }

    pub fn buy(price: Decimal, amount: Decimal) -> Self {
        Self {
            side: OrderSide::Buy,
            price,
            amount,
        }
    }

    /// Quote-unit equivalent of `amount`
    pub fn quote_amount(&self) -> Result<Decimal> {
        self.amount
            .checked_mul(self.price)
            .ok_or_else(|| anyhow!("quote value of {} overflows", self))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {}", self.side, self.amount, self.price)
    }
}

/// Opaque position in an adapter's trade history feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeCursor(String);

impl TradeCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TradeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A past trade as reported by a trade history source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub transaction_id: String,
    /// Milliseconds since the unix epoch
    pub timestamp: i64,
    pub side: OrderSide,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Best bid and ask. A missing side means that side of the book is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

/// Round to `precision` decimals (banker's rounding) and normalize so equal
/// values hash to the same key.
pub fn quantize(value: Decimal, precision: u32) -> Decimal {
    value.round_dp(precision).normalize()
}

/// Truncate towards zero at `precision` decimals. Used wherever rounding up
/// could breach a limit.
pub fn floor_to(value: Decimal, precision: u32) -> Decimal {
    value
        .round_dp_with_strategy(precision, RoundingStrategy::ToZero)
        .normalize()
}

/// `1 / value`, failing instead of panicking on zero
pub fn invert(value: Decimal) -> Result<Decimal> {
    Decimal::ONE
        .checked_div(value)
        .ok_or_else(|| anyhow!("cannot invert price {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quantize_normalizes_scale() {
        assert_eq!(quantize(dec!(2.020000000), 7), dec!(2.02));
        assert_eq!(quantize(dec!(2.020000000), 7).scale(), 2);
        assert_eq!(quantize(dec!(1.123456789), 7), dec!(1.1234568));
    }

    #[test]
    fn test_floor_never_rounds_up() {
        assert_eq!(floor_to(dec!(0.33333339), 7), dec!(0.3333333));
        assert_eq!(floor_to(dec!(0.5), 7), dec!(0.5));
    }

    #[test]
    fn test_invert_zero_is_error() {
        assert!(invert(Decimal::ZERO).is_err());
        assert_eq!(invert(dec!(4)).unwrap(), dec!(0.25));
    }

    #[test]
    fn test_quote_amount_overflow_is_error() {
        assert_eq!(Operation::sell(dec!(2), dec!(1.5)).quote_amount().unwrap(), dec!(3));
        assert!(Operation::sell(Decimal::MAX, dec!(2)).quote_amount().is_err());
    }

    #[test]
    fn test_side_parse_roundtrip() {
        for side in [OrderSide::Buy, OrderSide::Sell] {
            assert_eq!(OrderSide::parse(side.as_str()), Some(side));
        }
        assert_eq!(OrderSide::parse("hold"), None);
    }
}

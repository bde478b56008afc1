//! Trade history source contract
//!
//! Adapters return trades oldest to newest after a cursor. An empty page
//! means the caller is caught up. How a cursor advances past a trade is an
//! adapter capability (`CursorPolicy`) so the polling loop stays generic.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Trade, TradeCursor, TradingPair};

/// How the next cursor is derived from the last trade of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPolicy {
    /// Cursor is the trade's transaction id, exclusive
    #[default]
    TransactionId,
    /// Cursor is a millisecond timestamp and the adapter treats it as
    /// inclusive, so it must be bumped past the last trade seen
    InclusiveTimestamp,
}

impl CursorPolicy {
    pub fn next_cursor(&self, trade: &Trade) -> Result<TradeCursor> {
        match self {
            CursorPolicy::TransactionId => Ok(TradeCursor::new(trade.transaction_id.clone())),
            CursorPolicy::InclusiveTimestamp => {
                let next = trade.timestamp.checked_add(1).ok_or_else(|| {
                    anyhow!(
                        "trade timestamp {} cannot be advanced (tx {})",
                        trade.timestamp,
                        trade.transaction_id
                    )
                })?;
                Ok(TradeCursor::new(next.to_string()))
            }
        }
    }
}

#[async_trait]
pub trait TradeFetcher: Send + Sync {
    fn cursor_policy(&self) -> CursorPolicy {
        CursorPolicy::TransactionId
    }

    async fn fetch_trade_history(
        &self,
        pair: &TradingPair,
        cursor: &TradeCursor,
        limit: Option<usize>,
    ) -> Result<Vec<Trade>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;
    use rust_decimal_macros::dec;

    fn trade(id: &str, timestamp: i64) -> Trade {
        Trade {
            transaction_id: id.to_string(),
            timestamp,
            side: OrderSide::Sell,
            price: dec!(1.5),
            volume: dec!(10),
        }
    }

    #[test]
    fn test_transaction_id_cursor_is_unmodified() {
        let next = CursorPolicy::TransactionId
            .next_cursor(&trade("tx-42", 1_700_000_000_000))
            .unwrap();
        assert_eq!(next.as_str(), "tx-42");
    }

    #[test]
    fn test_inclusive_timestamp_cursor_is_bumped() {
        let next = CursorPolicy::InclusiveTimestamp
            .next_cursor(&trade("tx-42", 1_700_000_000_000))
            .unwrap();
        assert_eq!(next.as_str(), "1700000000001");
    }

    #[test]
    fn test_inclusive_timestamp_overflow_is_error() {
        assert!(CursorPolicy::InclusiveTimestamp
            .next_cursor(&trade("tx", i64::MAX))
            .is_err());
    }
}

use anyhow::{anyhow, bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market_id::{dedupe_market_ids, MarketId};
use crate::models::{OrderSide, Operation};

/// Base and quote volume for one calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyVolume {
    pub base: Decimal,
    pub quote: Decimal,
}

impl DailyVolume {
    pub fn new(base: Decimal, quote: Decimal) -> Self {
        Self { base, quote }
    }

    pub fn record(&mut self, op: &Operation) -> Result<()> {
        let quote = op.quote_amount()?;
        let (Some(base), Some(quote)) = (
            self.base.checked_add(op.amount),
            self.quote.checked_add(quote),
        ) else {
            return Err(anyhow!("daily volume overflows after {}", op));
        };
        self.base = base;
        self.quote = quote;
        Ok(())
    }
}

/// Which records a daily volume aggregation covers. Market ids are
/// deduplicated with the filtered market first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyVolumeQuery {
    market_ids: Vec<MarketId>,
    action: OrderSide,
    account_ids: Vec<String>,
}

impl DailyVolumeQuery {
    pub fn new(
        market_id: MarketId,
        additional_market_ids: &[MarketId],
        action: OrderSide,
        account_ids: Vec<String>,
    ) -> Result<Self> {
        let market_ids = dedupe_market_ids(market_id, additional_market_ids);
        if market_ids.iter().any(|id| id.as_str().is_empty()) {
            bail!("daily volume query cannot include an empty market id");
        }
        if account_ids.iter().any(|id| id.is_empty()) {
            bail!("daily volume query cannot include an empty account id");
        }

        Ok(Self {
            market_ids,
            action,
            account_ids,
        })
    }

    pub fn market_ids(&self) -> &[MarketId] {
        &self.market_ids
    }

    pub fn action(&self) -> OrderSide {
        self.action
    }

    /// Empty means every account
    pub fn account_ids(&self) -> &[String] {
        &self.account_ids
    }
}

/// Store that can total today's traded volume
pub trait DailyVolumeSource: Send + Sync {
    fn daily_volume(&self, query: &DailyVolumeQuery) -> Result<DailyVolume>;
}

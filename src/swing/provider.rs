//! Swing Level Provider
//!
//! Builds a ladder of levels for one side of a market anchored on a swing
//! price instead of the raw last trade. The swing price only moves when
//! trade history shows a new fill, and the fill is mapped back through the
//! shared continuity map to the swing price that displayed it.
//!
//! The sell side works in real prices (quote per base). The buy side works
//! in inverted prices (base per quote) and keeps its inventory in quote
//! terms, so it is called with the quote balance as `max_asset_base`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::continuity::PriceContinuityMap;
use crate::history::TradeFetcher;
use crate::models::{invert, quantize, Level, OrderSide, TradeCursor, TradingPair};

/// Static parameters of one side's ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingParams {
    pub spread: Decimal,
    pub offset_spread: Decimal,
    /// Base units per level
    pub amount_base: Decimal,
    pub max_levels: u16,
    /// Last price at which a level may be placed: a ceiling for the sell
    /// side, a floor for the buy side. Always a real price.
    pub price_limit: Decimal,
    /// Inventory that must stay unexposed
    pub min_base: Decimal,
    pub precision: u32,
}

impl SwingParams {
    pub fn validate(&self) -> Result<()> {
        if self.spread <= Decimal::ZERO {
            bail!("spread must be positive, got {}", self.spread);
        }
        if self.offset_spread <= Decimal::NEGATIVE_ONE * Decimal::TWO {
            bail!("offset spread must be greater than -2, got {}", self.offset_spread);
        }
        if self.amount_base <= Decimal::ZERO {
            bail!("amount_base must be positive, got {}", self.amount_base);
        }
        if self.price_limit < Decimal::ZERO {
            bail!("price limit cannot be negative, got {}", self.price_limit);
        }
        if self.min_base < Decimal::ZERO {
            bail!("min_base cannot be negative, got {}", self.min_base);
        }
        Ok(())
    }
}

/// Long-lived reconciliation state of one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwingState {
    /// Always a real price, also for the buy side
    pub last_trade_price: Decimal,
    pub last_trade_cursor: TradeCursor,
    pub is_first_run: bool,
}

/// Newest trade seen while polling history
#[derive(Debug, Clone)]
struct LatestTrade {
    price: Decimal,
    cursor: TradeCursor,
    side: OrderSide,
}

pub struct SwingLevelProvider {
    side: OrderSide,
    params: SwingParams,
    state: SwingState,
    pair: TradingPair,
    fetcher: Arc<dyn TradeFetcher>,
    continuity: PriceContinuityMap,
}

impl SwingLevelProvider {
    pub fn new(
        side: OrderSide,
        params: SwingParams,
        seed_price: Decimal,
        seed_cursor: TradeCursor,
        pair: TradingPair,
        fetcher: Arc<dyn TradeFetcher>,
        continuity: PriceContinuityMap,
    ) -> Result<Self> {
        params
            .validate()
            .with_context(|| format!("invalid {} side swing parameters for {}", side, pair))?;
        if seed_price <= Decimal::ZERO {
            bail!("seed last trade price must be positive, got {}", seed_price);
        }

        Ok(Self {
            side,
            params,
            state: SwingState {
                last_trade_price: seed_price,
                last_trade_cursor: seed_cursor,
                is_first_run: true,
            },
            pair,
            fetcher,
            continuity,
        })
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn state(&self) -> &SwingState {
        &self.state
    }

    fn is_inverted(&self) -> bool {
        self.side == OrderSide::Buy
    }

    /// Produce this cycle's ladder.
    ///
    /// Returns an empty ladder without touching trade history when the
    /// inventory is already at or below `min_base`. A history fetch error
    /// leaves the swing state untouched.
    pub async fn get_levels(
        &mut self,
        max_asset_base: Decimal,
        _max_asset_quote: Decimal,
    ) -> Result<Vec<Level>> {
        if max_asset_base <= self.params.min_base {
            return Ok(Vec::new());
        }

        let latest = self
            .fetch_latest_trade()
            .await
            .with_context(|| format!("{} side of {}: trade history unavailable", self.side, self.pair))?;
        self.apply_latest_trade(latest);

        self.build_levels(max_asset_base)
    }

    async fn fetch_latest_trade(&self) -> Result<LatestTrade> {
        let policy = self.fetcher.cursor_policy();
        let mut latest = LatestTrade {
            price: self.state.last_trade_price,
            cursor: self.state.last_trade_cursor.clone(),
            side: OrderSide::Sell,
        };

        loop {
            let trades = self
                .fetcher
                .fetch_trade_history(&self.pair, &latest.cursor, None)
                .await
                .with_context(|| format!("fetching trades after cursor '{}'", latest.cursor))?;

            let Some(last) = trades.last() else {
                return Ok(latest);
            };

            for trade in &trades {
                debug!(side = %self.side, ?trade, "trade since last cycle");
            }

            let next_cursor = policy.next_cursor(last)?;
            if next_cursor == latest.cursor {
                bail!(
                    "trade history did not advance past cursor '{}' ({} trades returned)",
                    latest.cursor,
                    trades.len()
                );
            }

            latest = LatestTrade {
                price: last.price,
                cursor: next_cursor,
                side: last.side,
            };
        }
    }

    /// Reconcile the swing anchor with the newest trade.
    ///
    /// A trade price with no usable continuity entry anchors the ladder on
    /// the raw trade price (with a warning) instead of an "unknown" sentinel
    /// price, which would compound into negative level prices.
    fn apply_latest_trade(&mut self, latest: LatestTrade) {
        if self.state.is_first_run {
            self.state.is_first_run = false;
            self.state.last_trade_cursor = latest.cursor;
            info!(
                side = %self.side,
                cursor = %self.state.last_trade_cursor,
                last_trade_price = %self.state.last_trade_price,
                "first history run, adopted cursor and kept seed price"
            );
            return;
        }

        if latest.cursor == self.state.last_trade_cursor {
            debug!(
                side = %self.side,
                cursor = %self.state.last_trade_cursor,
                last_trade_price = %self.state.last_trade_price,
                "no new trades"
            );
            return;
        }

        self.state.last_trade_cursor = latest.cursor;
        let key = quantize(latest.price, self.params.precision);
        self.continuity.log_entries();
        self.state.last_trade_price = match self.continuity.resolve(key, latest.side) {
            Some(swing) => swing,
            None => {
                warn!(
                    side = %self.side,
                    trade_price = %latest.price,
                    "no swing price known for trade, anchoring on the trade price"
                );
                latest.price
            }
        };
        info!(
            side = %self.side,
            cursor = %self.state.last_trade_cursor,
            trade_price = %latest.price,
            last_trade_price = %self.state.last_trade_price,
            "swing price updated"
        );
    }

    fn build_levels(&self, max_asset_base: Decimal) -> Result<Vec<Level>> {
        let inverted = self.is_inverted();
        let half_spread = Decimal::ONE + self.params.spread / Decimal::TWO;
        let half_offset = Decimal::ONE + self.params.offset_spread / Decimal::TWO;
        let precision = self.params.precision;

        let mut swing = if inverted {
            invert(self.state.last_trade_price)?
        } else {
            self.state.last_trade_price
        };

        let mut levels = Vec::with_capacity(self.params.max_levels as usize);
        let mut base_exposed = Decimal::ZERO;
        for _ in 0..self.params.max_levels {
            let next = swing
                .checked_mul(half_spread)
                .and_then(|next| next.checked_mul(half_offset).map(|price| (next, price)));
            let Some((next_swing, price)) = next else {
                warn!(side = %self.side, %swing, "stopping ladder, price overflow");
                break;
            };
            swing = next_swing;

            let base_usage = if inverted {
                match self.params.amount_base.checked_div(price) {
                    Some(usage) => usage,
                    None => break,
                }
            } else {
                self.params.amount_base
            };
            let ending_base = max_asset_base - base_exposed - base_usage;
            if ending_base <= self.params.min_base {
                debug!(
                    side = %self.side,
                    %ending_base,
                    min_base = %self.params.min_base,
                    "stopping ladder, inventory floor reached"
                );
                break;
            }

            let real_price = if inverted { invert(price)? } else { price };
            let crossed = if inverted {
                real_price < self.params.price_limit
            } else {
                real_price > self.params.price_limit
            };
            if crossed {
                debug!(
                    side = %self.side,
                    price_limit = %self.params.price_limit,
                    price = %real_price,
                    "stopping ladder, price limit crossed"
                );
                break;
            }
            if quantize(real_price, precision).is_zero() {
                debug!(side = %self.side, price = %real_price, "stopping ladder, price rounds to zero");
                break;
            }

            levels.push(Level {
                price: quantize(price, precision),
                amount: quantize(self.params.amount_base, precision),
            });

            let real_swing = if inverted { invert(swing)? } else { swing };
            self.continuity
                .upsert(quantize(real_price, precision), real_swing);

            base_exposed += base_usage;
        }

        info!(side = %self.side, pair = %self.pair, count = levels.len(), "levels created");
        self.continuity.log_entries();

        Ok(levels)
    }
}

//! One strategy cycle: ladders, filters, submission.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::models::{invert, quantize, Level, Operation, OrderSide, TradingPair};
use crate::submit::{OrderBookSource, SubmitFilter};
use crate::swing::SwingLevelProvider;
use crate::volume::VolumeFilter;

#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit_operations(&self, ops: &[Operation]) -> Result<()>;
}

/// Spendable inventory at the start of a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balances {
    pub base: Decimal,
    pub quote: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sell_levels: usize,
    pub buy_levels: usize,
    pub after_volume_filter: usize,
    pub submitted: Vec<Operation>,
}

/// Turn a ladder into operations on the real pair.
///
/// Buy levels carry inverted prices and are flipped back here. Amounts stay
/// in base units on both sides.
pub fn levels_to_operations(
    side: OrderSide,
    levels: &[Level],
    precision: u32,
) -> Result<Vec<Operation>> {
    levels
        .iter()
        .map(|level| {
            let price = match side {
                OrderSide::Sell => level.price,
                OrderSide::Buy => invert(level.price)?,
            };
            Ok(Operation {
                side,
                price: quantize(price, precision),
                amount: quantize(level.amount, precision),
            })
        })
        .collect()
}

pub struct Trader {
    pair: TradingPair,
    precision: u32,
    sell: SwingLevelProvider,
    buy: SwingLevelProvider,
    volume_filter: Option<VolumeFilter>,
    submit_filter: SubmitFilter,
    book: Arc<dyn OrderBookSource>,
    submitter: Arc<dyn Submitter>,
}

impl Trader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair: TradingPair,
        precision: u32,
        sell: SwingLevelProvider,
        buy: SwingLevelProvider,
        volume_filter: Option<VolumeFilter>,
        submit_filter: SubmitFilter,
        book: Arc<dyn OrderBookSource>,
        submitter: Arc<dyn Submitter>,
    ) -> Result<Self> {
        if sell.side() != OrderSide::Sell || buy.side() != OrderSide::Buy {
            bail!(
                "trader for {} needs a sell and a buy provider, got {} and {}",
                pair,
                sell.side(),
                buy.side()
            );
        }
        Ok(Self {
            pair,
            precision,
            sell,
            buy,
            volume_filter,
            submit_filter,
            book,
            submitter,
        })
    }

    pub fn sell_provider(&self) -> &SwingLevelProvider {
        &self.sell
    }

    pub fn buy_provider(&self) -> &SwingLevelProvider {
        &self.buy
    }

    /// Run one cycle. Nothing is submitted unless every stage succeeds.
    pub async fn run_cycle(&mut self, balances: Balances) -> Result<CycleReport> {
        let sell_levels = self
            .sell
            .get_levels(balances.base, balances.quote)
            .await
            .context("sell ladder")?;
        // the buy ladder spends quote
        let buy_levels = self
            .buy
            .get_levels(balances.quote, balances.base)
            .await
            .context("buy ladder")?;

        let mut ops = levels_to_operations(OrderSide::Sell, &sell_levels, self.precision)?;
        ops.extend(levels_to_operations(OrderSide::Buy, &buy_levels, self.precision)?);

        if let Some(volume_filter) = &self.volume_filter {
            ops = volume_filter.apply(ops)?;
        }
        let after_volume_filter = ops.len();

        let ops = self.submit_filter.apply(self.book.as_ref(), ops).await?;

        if !ops.is_empty() {
            self.submitter
                .submit_operations(&ops)
                .await
                .with_context(|| format!("submitting {} operations on {}", ops.len(), self.pair))?;
        }

        info!(
            pair = %self.pair,
            sell_levels = sell_levels.len(),
            buy_levels = buy_levels.len(),
            after_volume_filter,
            submitted = ops.len(),
            "cycle complete"
        );

        Ok(CycleReport {
            sell_levels: sell_levels.len(),
            buy_levels: buy_levels.len(),
            after_volume_filter,
            submitted: ops,
        })
    }
}

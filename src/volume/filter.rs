//! Daily volume admission filter
//!
//! Caps the sell volume of a market per calendar day. Each cycle reads the
//! volume already on the books (OTB) once, then admits operations one at a
//! time against a to-be-booked (TBB) accumulator that starts at zero. An
//! operation that would overshoot a cap is cut down to what is left; one
//! with nothing left is dropped.

use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use super::config::{VolumeFilterConfig, VolumeFilterMode, VolumeLimits};
use super::market_id::MarketId;
use super::query::{DailyVolume, DailyVolumeQuery, DailyVolumeSource};
use crate::models::{floor_to, Operation, OrderSide, TradingPair};

pub struct VolumeFilter {
    name: &'static str,
    pair: TradingPair,
    config: VolumeFilterConfig,
    query: DailyVolumeQuery,
    precision: u32,
    source: Arc<dyn DailyVolumeSource>,
}

impl VolumeFilter {
    pub fn new(
        exchange_name: &str,
        pair: &TradingPair,
        base_asset_code: &str,
        quote_asset_code: &str,
        config: VolumeFilterConfig,
        precision: u32,
        source: Arc<dyn DailyVolumeSource>,
    ) -> Result<Self> {
        config
            .validate()
            .with_context(|| format!("invalid volume filter config for {}", pair))?;

        let market_id = MarketId::new(exchange_name, base_asset_code, quote_asset_code);
        let query = match config.mode {
            VolumeFilterMode::Exact => {
                DailyVolumeQuery::new(market_id, &[], OrderSide::Sell, Vec::new())?
            }
            VolumeFilterMode::Ignore => {
                let additional: Vec<MarketId> = config
                    .additional_market_ids
                    .iter()
                    .map(|id| MarketId::from_raw(id.trim()))
                    .collect();
                DailyVolumeQuery::new(
                    market_id,
                    &additional,
                    OrderSide::Sell,
                    config.optional_account_ids.clone(),
                )?
            }
        };

        Ok(Self {
            name: "volume_filter",
            pair: pair.clone(),
            config,
            query,
            precision,
            source,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &VolumeFilterConfig {
        &self.config
    }

    pub fn query(&self) -> &DailyVolumeQuery {
        &self.query
    }

    /// Run a cycle's operations through the caps, strictly in order.
    pub fn apply(&self, ops: Vec<Operation>) -> Result<Vec<Operation>> {
        let otb = self.source.daily_volume(&self.query).with_context(|| {
            format!(
                "{}: could not load today's volume for {} (markets {:?})",
                self.name,
                self.pair,
                self.query.market_ids()
            )
        })?;
        let mut tbb = DailyVolume::default();
        let limits = self.config.limits();

        let requested = ops.len();
        let mut admitted = Vec::with_capacity(requested);
        for op in ops {
            let result = volume_filter_fn(&otb, &mut tbb, op, &limits, self.precision)
                .with_context(|| format!("{}: rejected operation {} on {}", self.name, op, self.pair))?;
            if let Some(op) = result {
                admitted.push(op);
            }
        }

        info!(
            filter = self.name,
            pair = %self.pair,
            requested,
            admitted = admitted.len(),
            otb_base = %otb.base,
            otb_quote = %otb.quote,
            tbb_base = %tbb.base,
            tbb_quote = %tbb.quote,
            "volume filter applied"
        );
        Ok(admitted)
    }
}

/// Admit, shrink or drop one operation.
///
/// Only sells are capped; buys pass through and leave `tbb` alone. On
/// admission `tbb` grows by the admitted base amount and its quote value.
pub fn volume_filter_fn(
    otb: &DailyVolume,
    tbb: &mut DailyVolume,
    op: Operation,
    limits: &VolumeLimits,
    precision: u32,
) -> Result<Option<Operation>> {
    if op.side != OrderSide::Sell {
        return Ok(Some(op));
    }
    if op.price <= Decimal::ZERO {
        bail!("sell price must be positive, got {}", op.price);
    }

    let mut admissible = op.amount;
    if let Some(cap) = limits.sell_base_cap_in_base_units {
        let available = remaining(cap, otb.base, tbb.base)?;
        admissible = admissible.min(available);
    }
    if let Some(cap) = limits.sell_base_cap_in_quote_units {
        let available = remaining(cap, otb.quote, tbb.quote)?;
        let available_base = available
            .checked_div(op.price)
            .ok_or_else(|| anyhow!("{} quote left at price {} overflows", available, op.price))?;
        admissible = admissible.min(available_base);
    }

    let mut admitted = op;
    if admissible < op.amount {
        admitted.amount = floor_to(admissible, precision);
    }
    if admitted.amount <= Decimal::ZERO {
        debug!(%op, mode = %limits.mode, "operation dropped, daily cap reached");
        return Ok(None);
    }
    if admitted.amount < op.amount {
        debug!(
            %op,
            admitted = %admitted.amount,
            mode = %limits.mode,
            "operation reduced to fit daily cap"
        );
    }

    tbb.record(&admitted)?;
    Ok(Some(admitted))
}

/// `cap - (otb + tbb)`
fn remaining(cap: Decimal, otb: Decimal, tbb: Decimal) -> Result<Decimal> {
    otb.checked_add(tbb)
        .and_then(|used| cap.checked_sub(used))
        .ok_or_else(|| anyhow!("daily volume {} + {} against cap {} overflows", otb, tbb, cap))
}

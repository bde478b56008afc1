//! Submission-mode filter
//!
//! Last gate before operations are submitted. Maker-only keeps operations
//! that would rest on the book, taker-only keeps operations that would take
//! liquidity, and `Both` submits everything untouched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::models::{Operation, OrderSide, TopOfBook, TradingPair};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SubmitMode {
    MakerOnly,
    TakerOnly,
    #[default]
    Both,
}

impl SubmitMode {
    /// Unknown values fall back to `Both`
    pub fn parse(value: &str) -> Self {
        match value {
            "maker_only" => SubmitMode::MakerOnly,
            "taker_only" => SubmitMode::TakerOnly,
            _ => SubmitMode::Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitMode::MakerOnly => "maker_only",
            SubmitMode::TakerOnly => "taker_only",
            SubmitMode::Both => "both",
        }
    }
}

impl From<String> for SubmitMode {
    fn from(value: String) -> Self {
        SubmitMode::parse(&value)
    }
}

impl fmt::Display for SubmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait OrderBookSource: Send + Sync {
    /// Best bid and ask, looking at most `depth` levels into each side
    async fn top_of_book(&self, pair: &TradingPair, depth: usize) -> Result<TopOfBook>;
}

/// Would `op` match resting liquidity right away?
pub fn crosses_book(op: &Operation, book: &TopOfBook) -> bool {
    match op.side {
        OrderSide::Sell => book.best_bid.is_some_and(|bid| op.price <= bid),
        OrderSide::Buy => book.best_ask.is_some_and(|ask| op.price >= ask),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitFilter {
    PassThrough,
    MakerOnly { pair: TradingPair },
    TakerOnly { pair: TradingPair },
}

impl SubmitFilter {
    pub fn for_mode(mode: SubmitMode, pair: &TradingPair) -> Self {
        match mode {
            SubmitMode::MakerOnly => SubmitFilter::MakerOnly { pair: pair.clone() },
            SubmitMode::TakerOnly => SubmitFilter::TakerOnly { pair: pair.clone() },
            SubmitMode::Both => SubmitFilter::PassThrough,
        }
    }

    pub fn mode(&self) -> SubmitMode {
        match self {
            SubmitFilter::PassThrough => SubmitMode::Both,
            SubmitFilter::MakerOnly { .. } => SubmitMode::MakerOnly,
            SubmitFilter::TakerOnly { .. } => SubmitMode::TakerOnly,
        }
    }

    /// Filter a whole batch. Failing to read the book fails the batch.
    pub async fn apply(
        &self,
        book: &dyn OrderBookSource,
        ops: Vec<Operation>,
    ) -> Result<Vec<Operation>> {
        let (pair, keep_crossing) = match self {
            SubmitFilter::PassThrough => return Ok(ops),
            SubmitFilter::MakerOnly { pair } => (pair, false),
            SubmitFilter::TakerOnly { pair } => (pair, true),
        };

        let top = book
            .top_of_book(pair, 1)
            .await
            .with_context(|| format!("{} filter: could not fetch top of book for {}", self.mode(), pair))?;

        let before = ops.len();
        let kept: Vec<Operation> = ops
            .into_iter()
            .filter(|op| {
                let keep = crosses_book(op, &top) == keep_crossing;
                if !keep {
                    debug!(mode = %self.mode(), %op, ?top, "operation removed");
                }
                keep
            })
            .collect();

        info!(
            mode = %self.mode(),
            pair = %pair,
            before,
            after = kept.len(),
            "submit filter applied"
        );
        Ok(kept)
    }
}

//! SQLite-backed paper venue
//!
//! Stands in for the exchange during dry runs and tests. It serves trade
//! history, a resting book and today's sell volume, and records submitted
//! operations instead of sending them anywhere. Decimals are stored as TEXT
//! and summed in Rust so nothing goes through floating point.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::history::{CursorPolicy, TradeFetcher};
use crate::models::{Operation, OrderSide, TopOfBook, Trade, TradeCursor, TradingPair};
use crate::submit::OrderBookSource;
use crate::trader::Submitter;
use crate::volume::{DailyVolume, DailyVolumeQuery, DailyVolumeSource, MarketId};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    base TEXT NOT NULL,
    quote TEXT NOT NULL,
    side TEXT NOT NULL,
    price TEXT NOT NULL,
    volume TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trades_pair
    ON trades(base, quote, id);

CREATE TABLE IF NOT EXISTS book_levels (
    base TEXT NOT NULL,
    quote TEXT NOT NULL,
    side TEXT NOT NULL,
    price TEXT NOT NULL,
    amount TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_book_levels_pair
    ON book_levels(base, quote, side);

CREATE TABLE IF NOT EXISTS operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market_id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    side TEXT NOT NULL,
    price TEXT NOT NULL,
    amount TEXT NOT NULL,
    day TEXT NOT NULL,
    submitted_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_operations_day
    ON operations(day, side, market_id);
"#;

const DEFAULT_PAGE_SIZE: usize = 50;

pub struct PaperVenue {
    conn: Arc<Mutex<Connection>>,
    market_id: MarketId,
    account_id: String,
}

impl PaperVenue {
    /// Open (or create) a venue database. `:memory:` works for tests.
    pub fn open(db_path: &str, market_id: MarketId, account_id: impl Into<String>) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open paper venue at {}", db_path))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize paper venue schema")?;

        info!(path = db_path, market_id = %market_id, "paper venue ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            market_id,
            account_id: account_id.into(),
        })
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    /// Append a trade to the history feed, returning its transaction id
    pub fn record_trade(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Decimal,
        volume: Decimal,
        timestamp_ms: i64,
    ) -> Result<String> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO trades (base, quote, side, price, volume, timestamp_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &pair.base,
                &pair.quote,
                side.as_str(),
                price.to_string(),
                volume.to_string(),
                timestamp_ms
            ],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    /// Replace the resting book of a pair
    pub fn set_book(
        &self,
        pair: &TradingPair,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM book_levels WHERE base = ?1 AND quote = ?2",
            params![&pair.base, &pair.quote],
        )?;
        for (side, levels) in [(OrderSide::Buy, bids), (OrderSide::Sell, asks)] {
            for (price, amount) in levels {
                tx.execute(
                    "INSERT INTO book_levels (base, quote, side, price, amount)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        &pair.base,
                        &pair.quote,
                        side.as_str(),
                        price.to_string(),
                        amount.to_string()
                    ],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Record operations on a given day. `submit_operations` uses today.
    pub fn record_operations_on(&self, ops: &[Operation], day: NaiveDate) -> Result<usize> {
        if ops.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let submitted_at = Utc::now().timestamp_millis();
        let tx = conn.transaction()?;
        for op in ops {
            tx.execute(
                "INSERT INTO operations (market_id, account_id, side, price, amount, day, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    self.market_id.as_str(),
                    &self.account_id,
                    op.side.as_str(),
                    op.price.to_string(),
                    op.amount.to_string(),
                    day.to_string(),
                    submitted_at
                ],
            )?;
        }
        tx.commit()?;
        Ok(ops.len())
    }

    /// Volume matching `query` on `day`
    pub fn daily_volume_on(&self, query: &DailyVolumeQuery, day: NaiveDate) -> Result<DailyVolume> {
        let markets = placeholders(3, query.market_ids().len());
        let mut sql = format!(
            "SELECT price, amount FROM operations
             WHERE day = ?1 AND side = ?2 AND market_id IN ({})",
            markets
        );
        if !query.account_ids().is_empty() {
            sql.push_str(&format!(
                " AND account_id IN ({})",
                placeholders(3 + query.market_ids().len(), query.account_ids().len())
            ));
        }

        let mut bind: Vec<String> = vec![day.to_string(), query.action().as_str().to_string()];
        bind.extend(query.market_ids().iter().map(|id| id.as_str().to_string()));
        bind.extend(query.account_ids().iter().cloned());

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut volume = DailyVolume::default();
        for row in rows {
            let (price, amount) = row?;
            let price = parse_decimal(&price, "operation price")?;
            let amount = parse_decimal(&amount, "operation amount")?;
            volume.record(&Operation {
                side: query.action(),
                price,
                amount,
            })?;
        }
        Ok(volume)
    }
}

fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_decimal(value: &str, label: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("invalid {} '{}'", label, value))
}

#[async_trait]
impl TradeFetcher for PaperVenue {
    fn cursor_policy(&self) -> CursorPolicy {
        CursorPolicy::TransactionId
    }

    async fn fetch_trade_history(
        &self,
        pair: &TradingPair,
        cursor: &TradeCursor,
        limit: Option<usize>,
    ) -> Result<Vec<Trade>> {
        let after: i64 = if cursor.is_empty() {
            0
        } else {
            cursor
                .as_str()
                .parse()
                .with_context(|| format!("paper venue cursor '{}' is not a trade id", cursor))?
        };
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE) as i64;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, side, price, volume, timestamp_ms FROM trades
             WHERE base = ?1 AND quote = ?2 AND id > ?3
             ORDER BY id
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![&pair.base, &pair.quote, after, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut trades = Vec::new();
        for row in rows {
            let (id, side, price, volume, timestamp) = row?;
            let side = OrderSide::parse(&side)
                .ok_or_else(|| anyhow!("trade {} has unknown side '{}'", id, side))?;
            trades.push(Trade {
                transaction_id: id.to_string(),
                timestamp,
                side,
                price: parse_decimal(&price, "trade price")?,
                volume: parse_decimal(&volume, "trade volume")?,
            });
        }
        debug!(pair = %pair, %cursor, count = trades.len(), "paper trade history page");
        Ok(trades)
    }
}

#[async_trait]
impl OrderBookSource for PaperVenue {
    async fn top_of_book(&self, pair: &TradingPair, depth: usize) -> Result<TopOfBook> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT side, price FROM book_levels WHERE base = ?1 AND quote = ?2",
        )?;
        let rows = stmt.query_map(params![&pair.base, &pair.quote], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for row in rows {
            let (side, price) = row?;
            let price = parse_decimal(&price, "book price")?;
            match OrderSide::parse(&side) {
                Some(OrderSide::Buy) => bids.push(price),
                Some(OrderSide::Sell) => asks.push(price),
                None => return Err(anyhow!("book level has unknown side '{}'", side)),
            }
        }
        bids.sort_by(|a, b| b.cmp(a));
        asks.sort();
        bids.truncate(depth);
        asks.truncate(depth);

        Ok(TopOfBook {
            best_bid: bids.first().copied(),
            best_ask: asks.first().copied(),
        })
    }
}

impl DailyVolumeSource for PaperVenue {
    fn daily_volume(&self, query: &DailyVolumeQuery) -> Result<DailyVolume> {
        self.daily_volume_on(query, Utc::now().date_naive())
    }
}

#[async_trait]
impl Submitter for PaperVenue {
    async fn submit_operations(&self, ops: &[Operation]) -> Result<()> {
        let count = self.record_operations_on(ops, Utc::now().date_naive())?;
        info!(market_id = %self.market_id, count, "paper operations recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("XLM", "USD")
    }

    fn venue() -> PaperVenue {
        PaperVenue::open(":memory:", MarketId::new("paper", "XLM", "USD"), "acct-1")
            .expect("Failed to open venue")
    }

    #[tokio::test]
    async fn test_trade_history_pages_after_cursor() {
        let venue = venue();
        for i in 0..5 {
            venue
                .record_trade(&pair(), OrderSide::Sell, dec!(1.5) + Decimal::from(i), dec!(2), i)
                .unwrap();
        }
        venue
            .record_trade(&TradingPair::new("BTC", "USD"), OrderSide::Buy, dec!(60000), dec!(1), 9)
            .unwrap();

        let page = venue
            .fetch_trade_history(&pair(), &TradeCursor::default(), Some(3))
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].price, dec!(1.5));

        let cursor = venue.cursor_policy().next_cursor(page.last().unwrap()).unwrap();
        let rest = venue.fetch_trade_history(&pair(), &cursor, Some(3)).await.unwrap();
        let ids: Vec<_> = rest.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "5"]);

        let cursor = venue.cursor_policy().next_cursor(rest.last().unwrap()).unwrap();
        assert!(venue.fetch_trade_history(&pair(), &cursor, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_cursor_is_error() {
        let venue = venue();
        let result = venue
            .fetch_trade_history(&pair(), &TradeCursor::new("not-a-number"), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_top_of_book() {
        let venue = venue();
        assert_eq!(venue.top_of_book(&pair(), 1).await.unwrap(), TopOfBook::default());

        venue
            .set_book(
                &pair(),
                &[(dec!(0.99), dec!(10)), (dec!(1.01), dec!(5)), (dec!(0.5), dec!(1))],
                &[(dec!(1.2), dec!(3)), (dec!(1.05), dec!(2))],
            )
            .unwrap();
        let top = venue.top_of_book(&pair(), 1).await.unwrap();
        assert_eq!(top.best_bid, Some(dec!(1.01)));
        assert_eq!(top.best_ask, Some(dec!(1.05)));
    }

    #[test]
    fn test_daily_volume_scopes() {
        let own = MarketId::new("paper", "XLM", "USD");
        let venue = venue();
        let other = PaperVenue {
            conn: venue.conn.clone(),
            market_id: MarketId::from_raw("other"),
            account_id: "acct-2".to_string(),
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();

        venue
            .record_operations_on(
                &[Operation::sell(dec!(2), dec!(1)), Operation::buy(dec!(1.9), dec!(4))],
                today,
            )
            .unwrap();
        venue
            .record_operations_on(&[Operation::sell(dec!(2), dec!(10))], yesterday)
            .unwrap();
        other
            .record_operations_on(&[Operation::sell(dec!(3), dec!(0.5))], today)
            .unwrap();

        let exact = DailyVolumeQuery::new(own.clone(), &[], OrderSide::Sell, vec![]).unwrap();
        assert_eq!(
            venue.daily_volume_on(&exact, today).unwrap(),
            DailyVolume::new(dec!(1), dec!(2))
        );

        let wide = DailyVolumeQuery::new(
            own.clone(),
            &[MarketId::from_raw("other"), own.clone()],
            OrderSide::Sell,
            vec![],
        )
        .unwrap();
        assert_eq!(
            venue.daily_volume_on(&wide, today).unwrap(),
            DailyVolume::new(dec!(1.5), dec!(3.5))
        );

        let by_account = DailyVolumeQuery::new(
            own,
            &[MarketId::from_raw("other")],
            OrderSide::Sell,
            vec!["acct-2".to_string()],
        )
        .unwrap();
        assert_eq!(
            venue.daily_volume_on(&by_account, today).unwrap(),
            DailyVolume::new(dec!(0.5), dec!(1.5))
        );
    }

    #[test]
    fn test_file_backed_venue_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.db");
        let path = path.to_str().unwrap();
        let market = MarketId::new("paper", "XLM", "USD");

        {
            let venue = PaperVenue::open(path, market.clone(), "acct").unwrap();
            venue
                .record_trade(&pair(), OrderSide::Buy, dec!(1.1), dec!(1), 1)
                .unwrap();
        }

        let venue = PaperVenue::open(path, market, "acct").unwrap();
        let id = venue
            .record_trade(&pair(), OrderSide::Buy, dec!(1.2), dec!(1), 2)
            .unwrap();
        assert_eq!(id, "2");
    }
}

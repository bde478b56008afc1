//! Strategy configuration
//!
//! One TOML file describes the market, both swing ladders, the optional
//! daily volume caps and the submit mode.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{TradeCursor, TradingPair, DEFAULT_PRECISION};
use crate::submit::SubmitMode;
use crate::swing::SwingParams;
use crate::volume::{MarketId, VolumeFilterConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub market: MarketConfig,

    /// Balances the paper venue trades against
    #[serde(default)]
    pub inventory: InventoryConfig,

    pub swing: SwingConfig,

    /// Daily sell caps, disabled when absent
    #[serde(default)]
    pub volume_filter: Option<VolumeFilterConfig>,

    #[serde(default)]
    pub submit_mode: SubmitMode,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub exchange: String,
    pub base: String,
    pub quote: String,

    /// Asset codes used for the market id. Default to `base`/`quote`.
    #[serde(default)]
    pub base_asset_code: Option<String>,
    #[serde(default)]
    pub quote_asset_code: Option<String>,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_account_id")]
    pub account_id: String,
}

fn default_database_path() -> String {
    "./swingbot.db".to_string()
}

fn default_account_id() -> String {
    "paper".to_string()
}

impl MarketConfig {
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(&self.base, &self.quote)
    }

    pub fn base_asset_code(&self) -> &str {
        self.base_asset_code.as_deref().unwrap_or(&self.base)
    }

    pub fn quote_asset_code(&self) -> &str {
        self.quote_asset_code.as_deref().unwrap_or(&self.quote)
    }

    pub fn market_id(&self) -> MarketId {
        MarketId::new(&self.exchange, self.base_asset_code(), self.quote_asset_code())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub base: Decimal,
    #[serde(default)]
    pub quote: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingConfig {
    pub spread: Decimal,
    #[serde(default)]
    pub offset_spread: Decimal,
    pub amount_base: Decimal,
    pub max_levels: u16,
    /// Seed swing price, also the anchor until the first fill
    pub last_trade_price: Decimal,
    /// Sell ladder ceiling
    pub max_price: Decimal,
    /// Buy ladder floor. Zero means no floor: the ladder then ends where
    /// level prices round to zero.
    #[serde(default)]
    pub min_price: Decimal,
    /// Base inventory kept back from the sell ladder
    #[serde(default)]
    pub min_base: Decimal,
    /// Quote inventory kept back from the buy ladder
    #[serde(default)]
    pub min_quote: Decimal,
    #[serde(default)]
    pub last_trade_cursor: TradeCursor,
    #[serde(default = "default_precision")]
    pub precision: u32,
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

impl StrategyConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `SWINGBOT_CONFIG_PATH`, falling back to `swingbot.toml`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let path =
            std::env::var("SWINGBOT_CONFIG_PATH").unwrap_or_else(|_| "swingbot.toml".to_string());
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.market.exchange.trim().is_empty() {
            bail!("market.exchange is required");
        }
        if self.market.base.trim().is_empty() || self.market.quote.trim().is_empty() {
            bail!("market.base and market.quote are required");
        }
        if self.market.base == self.market.quote {
            bail!("market.base and market.quote must differ");
        }
        if self.inventory.base < Decimal::ZERO || self.inventory.quote < Decimal::ZERO {
            bail!("inventory balances cannot be negative");
        }
        if self.swing.last_trade_price <= Decimal::ZERO {
            bail!("swing.last_trade_price must be positive");
        }
        if self.swing.min_quote < Decimal::ZERO {
            bail!("swing.min_quote cannot be negative");
        }
        if self.swing.precision > 28 {
            bail!("swing.precision must be at most 28, got {}", self.swing.precision);
        }
        if self.tick_interval_secs == 0 {
            bail!("tick_interval_secs must be at least 1");
        }

        self.sell_params().validate().context("swing sell side")?;
        self.buy_params().validate().context("swing buy side")?;
        if let Some(volume_filter) = &self.volume_filter {
            volume_filter.validate().context("volume_filter")?;
        }
        Ok(())
    }

    pub fn sell_params(&self) -> SwingParams {
        SwingParams {
            spread: self.swing.spread,
            offset_spread: self.swing.offset_spread,
            amount_base: self.swing.amount_base,
            max_levels: self.swing.max_levels,
            price_limit: self.swing.max_price,
            min_base: self.swing.min_base,
            precision: self.swing.precision,
        }
    }

    /// The buy ladder keeps its inventory in quote units, so `min_quote`
    /// plays the role of `min_base`.
    pub fn buy_params(&self) -> SwingParams {
        SwingParams {
            price_limit: self.swing.min_price,
            min_base: self.swing.min_quote,
            ..self.sell_params()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VolumeFilterMode;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const SAMPLE: &str = r#"
submit_mode = "maker_only"
tick_interval_secs = 5

[market]
exchange = "paper"
base = "XLM"
quote = "USD"

[inventory]
base = "500"
quote = "100"

[swing]
spread = "0.01"
offset_spread = "0.002"
amount_base = "25"
max_levels = 5
last_trade_price = "0.12"
max_price = "0.2"
min_price = "0.08"
min_quote = "5"

[volume_filter]
sell_base_cap_in_base_units = "1000"
mode = "exact"
"#;

    #[test]
    fn test_parse_sample() {
        let config: StrategyConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.submit_mode, SubmitMode::MakerOnly);
        assert_eq!(config.tick_interval_secs, 5);
        assert_eq!(config.market.database_path, "./swingbot.db");
        assert_eq!(config.market.account_id, "paper");
        assert_eq!(config.market.pair(), TradingPair::new("XLM", "USD"));
        assert_eq!(config.inventory.base, dec!(500));
        assert_eq!(config.swing.precision, 7);
        assert!(config.swing.last_trade_cursor.is_empty());

        let volume_filter = config.volume_filter.unwrap();
        assert_eq!(volume_filter.mode, VolumeFilterMode::Exact);
        assert_eq!(volume_filter.sell_base_cap_in_base_units, Some(dec!(1000)));
    }

    #[test]
    fn test_side_params() {
        let config: StrategyConfig = toml::from_str(SAMPLE).unwrap();

        let sell = config.sell_params();
        assert_eq!(sell.price_limit, dec!(0.2));
        assert_eq!(sell.min_base, dec!(0));
        assert_eq!(sell.max_levels, 5);

        let buy = config.buy_params();
        assert_eq!(buy.price_limit, dec!(0.08));
        assert_eq!(buy.min_base, dec!(5));
        assert_eq!(buy.spread, dec!(0.01));
    }

    #[test]
    fn test_market_id_uses_asset_codes() {
        let mut config: StrategyConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.market.market_id(), MarketId::new("paper", "XLM", "USD"));

        config.market.quote_asset_code = Some("USD:GISSUER".to_string());
        assert_eq!(
            config.market.market_id(),
            MarketId::new("paper", "XLM", "USD:GISSUER")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config: StrategyConfig = toml::from_str(SAMPLE).unwrap();
        config.swing.spread = dec!(0);
        assert!(config.validate().is_err());

        let mut config: StrategyConfig = toml::from_str(SAMPLE).unwrap();
        config.market.quote = "XLM".to_string();
        assert!(config.validate().is_err());

        let mut config: StrategyConfig = toml::from_str(SAMPLE).unwrap();
        config.volume_filter = Some(VolumeFilterConfig::default());
        assert!(config.validate().is_err());

        let mut config: StrategyConfig = toml::from_str(SAMPLE).unwrap();
        config.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = StrategyConfig::load(file.path()).unwrap();
        assert_eq!(config.market.exchange, "paper");
        assert!(StrategyConfig::load(file.path().with_extension("missing")).is_err());
    }
}

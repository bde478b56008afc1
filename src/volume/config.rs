use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation scope of the daily volume query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum VolumeFilterMode {
    /// Only volume on the filtered market counts against the caps
    #[default]
    Exact,
    /// Volume on the additional markets (and listed accounts) counts too
    Ignore,
}

impl VolumeFilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeFilterMode::Exact => "exact",
            VolumeFilterMode::Ignore => "ignore",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "exact" => Ok(VolumeFilterMode::Exact),
            "ignore" => Ok(VolumeFilterMode::Ignore),
            other => bail!("unknown volume filter mode '{}'", other),
        }
    }
}

impl TryFrom<String> for VolumeFilterMode {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        VolumeFilterMode::parse(&value)
    }
}

impl fmt::Display for VolumeFilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily sell caps for one market
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeFilterConfig {
    #[serde(default)]
    pub sell_base_cap_in_base_units: Option<Decimal>,
    #[serde(default)]
    pub sell_base_cap_in_quote_units: Option<Decimal>,
    #[serde(default)]
    pub mode: VolumeFilterMode,
    #[serde(default)]
    pub additional_market_ids: Vec<String>,
    #[serde(default)]
    pub optional_account_ids: Vec<String>,
}

impl VolumeFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sell_base_cap_in_base_units.is_none() && self.sell_base_cap_in_quote_units.is_none() {
            bail!("volume filter needs a base-unit or quote-unit sell cap");
        }
        for (label, cap) in [
            ("sell_base_cap_in_base_units", self.sell_base_cap_in_base_units),
            ("sell_base_cap_in_quote_units", self.sell_base_cap_in_quote_units),
        ] {
            if let Some(cap) = cap {
                if cap < Decimal::ZERO {
                    bail!("{} cannot be negative, got {}", label, cap);
                }
            }
        }
        if self.additional_market_ids.iter().any(|id| id.trim().is_empty()) {
            bail!("additional_market_ids contains an empty id");
        }
        if self.optional_account_ids.iter().any(|id| id.trim().is_empty()) {
            bail!("optional_account_ids contains an empty id");
        }
        Ok(())
    }

    pub fn limits(&self) -> VolumeLimits {
        VolumeLimits {
            sell_base_cap_in_base_units: self.sell_base_cap_in_base_units,
            sell_base_cap_in_quote_units: self.sell_base_cap_in_quote_units,
            mode: self.mode,
        }
    }
}

/// The caps as seen by a single admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLimits {
    pub sell_base_cap_in_base_units: Option<Decimal>,
    pub sell_base_cap_in_quote_units: Option<Decimal>,
    pub mode: VolumeFilterMode,
}

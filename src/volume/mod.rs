//! Daily traded-volume admission control

pub mod config;
pub mod filter;
pub mod market_id;
pub mod query;

pub use config::{VolumeFilterConfig, VolumeFilterMode, VolumeLimits};
pub use filter::{volume_filter_fn, VolumeFilter};
pub use market_id::{dedupe_market_ids, MarketId};
pub use query::{DailyVolume, DailyVolumeQuery, DailyVolumeSource};

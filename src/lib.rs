//! Swingbot core
//!
//! Level generation and order admission for a two-sided swing market maker.
//! The binary wires these pieces to the SQLite paper venue; other venues
//! plug in through the `TradeFetcher`, `OrderBookSource`,
//! `DailyVolumeSource` and `Submitter` traits.

pub mod config;
pub mod history;
pub mod models;
pub mod paper;
pub mod submit;
pub mod swing;
pub mod trader;
pub mod volume;

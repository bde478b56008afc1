//! Swing ladder generation

pub mod continuity;
pub mod provider;

pub use continuity::PriceContinuityMap;
pub use provider::{SwingLevelProvider, SwingParams, SwingState};

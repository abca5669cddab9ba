//! # Mathematical Functions
//!
//! Checked integer math, wad fixed-point helpers and decimal normalization.

pub mod decimals;
pub mod leverage;
pub mod safe_math;
pub mod wad;

// Re-export commonly used functions
pub use decimals::*;
pub use leverage::*;
pub use safe_math::*;
pub use wad::*;

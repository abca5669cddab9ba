//! # Core Type Definitions
//!
//! Shared type definitions used by the ledger and keeper.

pub mod ids;
pub mod position;
pub mod settlement;

// Re-export all types
pub use ids::*;
pub use position::*;
pub use settlement::*;

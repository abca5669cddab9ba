//! # Margin Core - Shared Ledger Logic
//!
//! This crate contains the value types and fixed-point math shared by the
//! position ledger and the off-chain keeper. It provides:
//!
//! - Wad (18 fractional digit) arithmetic with 256-bit intermediates
//! - Decimal normalization between native token precision and wads
//! - Token/account identifiers and canonical pair ordering
//! - Position direction/status enums and settlement instructions
//! - The ledger error taxonomy

// Re-export all modules
pub mod constants;
pub mod errors;
pub mod math;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use errors::{LedgerError, LedgerResult, RecordKind};
pub use types::*;

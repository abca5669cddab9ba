pub mod config;
pub mod driver;
pub mod error;
pub mod keeper;

pub use config::{KeeperConfig, MarginMode, MarketConfig, OrderConfig};
pub use driver::{apply_prices, bootstrap, LedgerEngine};
pub use error::{KeeperError, KeeperResult};
pub use keeper::{Keeper, ScanFailure, ScanReport, ScanTarget};

pub mod config;
pub mod marketplace;
pub mod telemetry;

pub use config::{MarketplaceConfig, Policies};
pub use marketplace::Marketplace;
pub use telemetry::init_tracing;

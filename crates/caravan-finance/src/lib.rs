pub mod ledger;
pub mod settlement;

pub use ledger::PaymentLedger;
pub use settlement::SettlementAggregator;

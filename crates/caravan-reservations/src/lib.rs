pub mod validation;
pub mod workflow;

pub use validation::ValidationGate;
pub use workflow::ReservationWorkflow;

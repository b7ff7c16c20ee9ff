// Billrun Infrastructure - Payment Gateway Adapters
// Implements: PaymentProvider

pub mod simulated;

pub use simulated::{SimulatedPaymentProvider, SimulationConfig};

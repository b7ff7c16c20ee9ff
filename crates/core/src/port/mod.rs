// Port Layer - Interfaces for external dependencies

pub mod customer_repository;
pub mod invoice_repository;
pub mod payment_provider;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use customer_repository::CustomerRepository;
pub use invoice_repository::InvoiceRepository;
pub use payment_provider::{PaymentError, PaymentProvider};
pub use time_provider::{OffsetTimeProvider, SystemTimeProvider, TimeProvider};

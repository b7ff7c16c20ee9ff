// Domain Layer - Pure business entities

pub mod customer;
pub mod error;
pub mod invoice;

// Re-exports
pub use customer::{Customer, CustomerId};
pub use error::DomainError;
pub use invoice::{Currency, Invoice, InvoiceId, InvoiceStatus, Money};

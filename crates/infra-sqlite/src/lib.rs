// Billrun Infrastructure - SQLite Adapter
// Implements: InvoiceRepository, CustomerRepository, demo seeding

mod connection;
mod customer_repository;
mod error;
mod invoice_repository;
mod migration;
mod seed;

pub use connection::create_pool;
pub use customer_repository::SqliteCustomerRepository;
pub use invoice_repository::SqliteInvoiceRepository;
pub use migration::run_migrations;
pub use seed::{seed_demo_data, SeedReport, DEMO_TIMEZONES};

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)

//! Shared fixtures: an in-memory SQLite store with customers spread over
//! five timezones that are all past local midnight at `DAY_ONE_9AM`.

#![allow(dead_code)]

use billrun_core::domain::{Currency, Customer, Invoice, InvoiceStatus, Money};
use billrun_infra_sqlite::{
    create_pool, run_migrations, SqliteCustomerRepository, SqliteInvoiceRepository,
};
use sqlx::SqlitePool;

/// 2025-02-01 00:00 UTC
pub const FEB_1: i64 = 1_738_368_000_000;
/// 2025-02-01 09:00 UTC, inside the day-1 grace window
pub const DAY_ONE_9AM: i64 = FEB_1 + 9 * 3_600_000;

pub const ZONES: [(&str, Currency); 5] = [
    ("Europe/Copenhagen", Currency::Dkk),
    ("America/New_York", Currency::Usd),
    ("America/Sao_Paulo", Currency::Usd),
    ("Asia/Tokyo", Currency::Eur),
    ("Pacific/Kiritimati", Currency::Gbp),
];

pub async fn setup_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// One customer per zone and `invoice_count` PENDING invoices round-robin
pub async fn populate(pool: &SqlitePool, invoice_count: i64) {
    let customers = SqliteCustomerRepository::new(pool.clone());
    for (i, (tz, currency)) in ZONES.iter().enumerate() {
        customers
            .insert(&Customer::new(i as i64 + 1, *currency, *tz))
            .await
            .unwrap();
    }

    let invoices = SqliteInvoiceRepository::new(pool.clone());
    for id in 1..=invoice_count {
        let slot = (id % ZONES.len() as i64) as usize;
        let currency = ZONES[slot].1;
        invoices
            .insert(&Invoice::new(
                id,
                slot as i64 + 1,
                Money::parse("99.00", currency).unwrap(),
                InvoiceStatus::Pending,
            ))
            .await
            .unwrap();
    }
}

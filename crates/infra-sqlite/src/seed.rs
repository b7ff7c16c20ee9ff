// Demo data for a freshly created database

use crate::customer_repository::{count_customers, insert_customer};
use crate::error::map_sqlx_error;
use crate::invoice_repository::insert_invoice;
use billrun_core::domain::{Currency, Customer, Invoice, InvoiceStatus, Money};
use billrun_core::error::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::info;

/// Zones handed out to demo customers, from UTC-11 to UTC+14
pub const DEMO_TIMEZONES: &[&str] = &[
    "Pacific/Pago_Pago",
    "Pacific/Honolulu",
    "America/Los_Angeles",
    "America/New_York",
    "America/Sao_Paulo",
    "UTC",
    "Europe/London",
    "Europe/Copenhagen",
    "Europe/Stockholm",
    "Asia/Kolkata",
    "Asia/Tokyo",
    "Australia/Sydney",
    "Pacific/Auckland",
    "Pacific/Kiritimati",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub customers: i64,
    pub invoices: i64,
}

/// Fill an empty store with random customers and invoices
///
/// Each customer gets a random currency and timezone. Their first invoice
/// is PENDING and the rest are PAID. Amounts range from 10.00 to 500.00 in
/// the customer's currency. Does nothing if customers already exist.
pub async fn seed_demo_data(
    pool: &SqlitePool,
    customer_count: i64,
    invoices_per_customer: i64,
) -> Result<SeedReport> {
    if count_customers(pool).await? > 0 {
        info!("Store already has customers, skipping demo seed");
        return Ok(SeedReport {
            customers: 0,
            invoices: 0,
        });
    }

    let (customers, invoices) = generate(customer_count, invoices_per_customer);

    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
    for customer in &customers {
        insert_customer(&mut *tx, customer).await?;
    }
    for invoice in &invoices {
        insert_invoice(&mut *tx, invoice).await?;
    }
    tx.commit().await.map_err(map_sqlx_error)?;

    let report = SeedReport {
        customers: customers.len() as i64,
        invoices: invoices.len() as i64,
    };
    info!(
        customers = report.customers,
        invoices = report.invoices,
        "Seeded demo data"
    );
    Ok(report)
}

fn generate(customer_count: i64, invoices_per_customer: i64) -> (Vec<Customer>, Vec<Invoice>) {
    let mut rng = rand::thread_rng();
    let mut customers = Vec::new();
    let mut invoices = Vec::new();
    let mut next_invoice_id = 1;

    for customer_id in 1..=customer_count {
        let currency = *Currency::ALL.choose(&mut rng).unwrap_or(&Currency::Eur);
        let timezone = DEMO_TIMEZONES.choose(&mut rng).copied().unwrap_or("UTC");
        customers.push(Customer::new(customer_id, currency, timezone));

        for n in 0..invoices_per_customer {
            let status = if n == 0 {
                InvoiceStatus::Pending
            } else {
                InvoiceStatus::Paid
            };
            let cents: i64 = rng.gen_range(1_000..=50_000);
            invoices.push(Invoice::new(
                next_invoice_id,
                customer_id,
                Money::new(Decimal::new(cents, 2), currency),
                status,
            ));
            next_invoice_id += 1;
        }
    }

    (customers, invoices)
}

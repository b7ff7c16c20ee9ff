// SQLite InvoiceRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use billrun_core::domain::{Currency, Invoice, InvoiceId, InvoiceStatus, Money};
use billrun_core::error::{AppError, Result};
use billrun_core::port::InvoiceRepository;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

const INVOICE_COLUMNS: &str = "id, customer_id, amount, currency, status";

#[derive(Clone)]
pub struct SqliteInvoiceRepository {
    pool: SqlitePool,
}

impl SqliteInvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, invoice: &Invoice) -> Result<()> {
        insert_invoice(&self.pool, invoice).await
    }

    pub async fn count_by_status(&self, status: InvoiceStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn fetch_where(&self, filter: Option<InvoiceStatus>) -> Result<Vec<Invoice>> {
        let rows = match filter {
            Some(status) => {
                sqlx::query_as::<_, InvoiceRow>(&format!(
                    "SELECT {} FROM invoices WHERE status = ? ORDER BY id",
                    INVOICE_COLUMNS
                ))
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, InvoiceRow>(&format!(
                    "SELECT {} FROM invoices ORDER BY id",
                    INVOICE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }
}

/// Insert through any executor so seeding can batch inside a transaction
pub(crate) async fn insert_invoice<'e, E>(executor: E, invoice: &Invoice) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO invoices (id, customer_id, amount, currency, status) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(invoice.id)
    .bind(invoice.customer_id)
    .bind(invoice.amount.value.to_string())
    .bind(invoice.amount.currency.code())
    .bind(invoice.status.to_string())
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

#[async_trait]
impl InvoiceRepository for SqliteInvoiceRepository {
    async fn fetch_pending(&self) -> Result<Vec<Invoice>> {
        self.fetch_where(Some(InvoiceStatus::Pending)).await
    }

    async fn fetch_all(&self) -> Result<Vec<Invoice>> {
        self.fetch_where(None).await
    }

    async fn find_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = ?",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(InvoiceRow::into_invoice).transpose()
    }

    async fn update_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<Invoice> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "UPDATE invoices SET status = ? WHERE id = ? RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(status.to_string())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let invoice = row
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", id)))?
            .into_invoice()?;

        debug!(invoice_id = %id, status = %invoice.status, "Invoice status updated");
        Ok(invoice)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    customer_id: i64,
    amount: String,
    currency: String,
    status: String,
}

impl InvoiceRow {
    fn into_invoice(self) -> Result<Invoice> {
        let currency: Currency = self.currency.parse()?;
        let status: InvoiceStatus = self.status.parse()?;
        let amount = Money::parse(&self.amount, currency)?;

        Ok(Invoice::new(self.id, self.customer_id, amount, status))
    }
}

// SQLite CustomerRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use billrun_core::domain::{Customer, CustomerId};
use billrun_core::error::{AppError, Result};
use billrun_core::port::CustomerRepository;
use sqlx::{Executor, Sqlite, SqlitePool};

#[derive(Clone)]
pub struct SqliteCustomerRepository {
    pool: SqlitePool,
}

impl SqliteCustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, customer: &Customer) -> Result<()> {
        insert_customer(&self.pool, customer).await
    }

    pub async fn count(&self) -> Result<i64> {
        count_customers(&self.pool).await
    }
}

pub(crate) async fn insert_customer<'e, E>(executor: E, customer: &Customer) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO customers (id, currency, timezone) VALUES (?, ?, ?)")
        .bind(customer.id)
        .bind(customer.currency.code())
        .bind(&customer.timezone)
        .execute(executor)
        .await
        .map_err(map_sqlx_error)?;

    Ok(())
}

pub(crate) async fn count_customers<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(executor)
        .await
        .map_err(map_sqlx_error)
}

#[async_trait]
impl CustomerRepository for SqliteCustomerRepository {
    async fn fetch(&self, id: CustomerId) -> Result<Customer> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, currency, timezone FROM customers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.ok_or_else(|| AppError::NotFound(format!("Customer {} not found", id)))?
            .into_customer()
    }

    async fn fetch_all(&self) -> Result<Vec<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT id, currency, timezone FROM customers ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(CustomerRow::into_customer)
            .collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    currency: String,
    timezone: String,
}

impl CustomerRow {
    fn into_customer(self) -> Result<Customer> {
        Ok(Customer::new(self.id, self.currency.parse()?, self.timezone))
    }
}

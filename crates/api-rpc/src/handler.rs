//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::types::{
    BillingStatusResponse, GetCustomerRequest, GetInvoiceRequest, HealthResponse,
    RestartRequest, RestartResponse,
};
use billrun_core::application::calendar::next_cycle_anchor;
use billrun_core::application::BillingScheduler;
use billrun_core::domain::{Customer, Invoice};
use billrun_core::error::AppError;
use billrun_core::port::{CustomerRepository, InvoiceRepository};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tracing::info;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    invoice_repo: Arc<dyn InvoiceRepository>,
    customer_repo: Arc<dyn CustomerRepository>,
    scheduler: Arc<BillingScheduler>,
}

impl RpcHandler {
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepository>,
        customer_repo: Arc<dyn CustomerRepository>,
        scheduler: Arc<BillingScheduler>,
    ) -> Self {
        Self {
            invoice_repo,
            customer_repo,
            scheduler,
        }
    }

    /// health.v1
    pub async fn health(&self) -> Result<HealthResponse, ErrorObjectOwned> {
        Ok(HealthResponse {
            status: "ok".to_string(),
            version: billrun_core::VERSION.to_string(),
        })
    }

    /// invoices.list.v1
    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, ErrorObjectOwned> {
        self.invoice_repo.fetch_all().await.map_err(to_rpc_error)
    }

    /// invoices.get.v1
    pub async fn get_invoice(
        &self,
        params: GetInvoiceRequest,
    ) -> Result<Invoice, ErrorObjectOwned> {
        self.invoice_repo
            .find_by_id(params.id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Invoice {} not found", params.id)))
            })
    }

    /// customers.list.v1
    pub async fn list_customers(&self) -> Result<Vec<Customer>, ErrorObjectOwned> {
        self.customer_repo.fetch_all().await.map_err(to_rpc_error)
    }

    /// customers.get.v1
    pub async fn get_customer(
        &self,
        params: GetCustomerRequest,
    ) -> Result<Customer, ErrorObjectOwned> {
        self.customer_repo
            .fetch(params.id)
            .await
            .map_err(to_rpc_error)
    }

    /// billing.status.v1
    pub async fn billing_status(&self) -> Result<BillingStatusResponse, ErrorObjectOwned> {
        let pending = self
            .invoice_repo
            .fetch_pending()
            .await
            .map_err(to_rpc_error)?;

        Ok(BillingStatusResponse {
            state: self.scheduler.state().await,
            now_ms: self.scheduler.now_millis().await,
            pending_invoices: pending.len(),
            current_cycle: self.scheduler.current_cycle().await,
        })
    }

    /// billing.restart.v1
    pub async fn restart_billing(
        &self,
        params: RestartRequest,
    ) -> Result<RestartResponse, ErrorObjectOwned> {
        next_cycle_anchor(params.simulated_now_ms).map_err(|_| {
            to_rpc_error(AppError::Validation(format!(
                "simulated_now_ms {} is outside the supported calendar range",
                params.simulated_now_ms
            )))
        })?;

        info!(
            simulated_now_ms = params.simulated_now_ms,
            unbounded_retries = params.unbounded_retries,
            "Billing restart requested over RPC"
        );

        let cycle = self
            .scheduler
            .restart_with_overrides(params.simulated_now_ms, params.unbounded_retries)
            .await
            .map_err(to_rpc_error)?;

        Ok(RestartResponse {
            state: self.scheduler.state().await,
            cycle,
        })
    }
}

//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use billrun_core::application::{CycleSummary, SchedulerState};
use billrun_core::domain::{CustomerId, InvoiceId};
use serde::{Deserialize, Serialize};

/// health.v1
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// invoices.get.v1
#[derive(Debug, Deserialize)]
pub struct GetInvoiceRequest {
    pub id: InvoiceId,
}

/// customers.get.v1
#[derive(Debug, Deserialize)]
pub struct GetCustomerRequest {
    pub id: CustomerId,
}

/// billing.status.v1
#[derive(Debug, Clone, Serialize)]
pub struct BillingStatusResponse {
    pub state: SchedulerState,
    /// Scheduler clock; simulated after a restart with an overridden time
    pub now_ms: i64,
    pub pending_invoices: usize,
    pub current_cycle: Option<CycleSummary>,
}

/// billing.restart.v1 - Restart the scheduler with a simulated clock
#[derive(Debug, Deserialize)]
pub struct RestartRequest {
    pub simulated_now_ms: i64,
    #[serde(default)]
    pub unbounded_retries: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestartResponse {
    pub state: SchedulerState,
    pub cycle: CycleSummary,
}

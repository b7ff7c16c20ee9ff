//! Charge-Retry Task
//!
//! One schedulable unit of billing work: a fixed list of invoices, all owned
//! by customers in the same timezone, charged once the batch fires.
//! Each invoice runs its own small state machine (attempt counter + delay):
//!
//! ```text
//! charge ──ok(true)──▶ update PAID ──▶ Paid
//!   │
//!   └─declined/error/timeout──▶ policy ──Retry(delay)──▶ wait ──▶ charge
//!                                  └──Exhausted──▶ stays PENDING
//! ```
//!
//! Retry waits are timers raced against the cycle's shutdown token. They do
//! not hold a pool slot; a slot is held only for the payment call itself.

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::shutdown::ShutdownToken;
use crate::domain::{Invoice, InvoiceId, InvoiceStatus};
use crate::port::{InvoiceRepository, PaymentProvider};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// Terminal state of one invoice's retry chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Charged and marked PAID; carries the store's updated record
    Paid { invoice: Invoice, attempts: u32 },
    /// All attempts failed; the invoice is still PENDING
    Exhausted { invoice_id: InvoiceId, attempts: u32 },
    /// Charged, but the PAID update was rejected by the invoice store
    UpdateFailed {
        invoice_id: InvoiceId,
        attempts: u32,
        reason: String,
    },
    /// The cycle was stopped before the chain finished
    Cancelled { invoice_id: InvoiceId, attempts: u32 },
}

/// Per-batch tally of outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub paid: Vec<InvoiceId>,
    pub exhausted: Vec<InvoiceId>,
    pub update_failed: Vec<InvoiceId>,
    pub cancelled: Vec<InvoiceId>,
}

impl BatchReport {
    /// Report for a batch that never fired
    pub fn cancelled(invoice_ids: Vec<InvoiceId>) -> Self {
        Self {
            cancelled: invoice_ids,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: &ChargeOutcome) {
        match outcome {
            ChargeOutcome::Paid { invoice, .. } => self.paid.push(invoice.id),
            ChargeOutcome::Exhausted { invoice_id, .. } => self.exhausted.push(*invoice_id),
            ChargeOutcome::UpdateFailed { invoice_id, .. } => {
                self.update_failed.push(*invoice_id)
            }
            ChargeOutcome::Cancelled { invoice_id, .. } => self.cancelled.push(*invoice_id),
        }
    }
}

pub struct ChargeTask {
    invoices: Vec<Invoice>,
    payment_provider: Arc<dyn PaymentProvider>,
    invoice_repo: Arc<dyn InvoiceRepository>,
    policy: RetryPolicy,
    slots: Arc<Semaphore>,
    shutdown: ShutdownToken,
}

impl ChargeTask {
    /// Create a task bound to `invoices`
    ///
    /// # Arguments
    /// * `slots` - Worker pool shared by all batches of the cycle
    /// * `shutdown` - Cycle cancellation token
    pub fn new(
        invoices: Vec<Invoice>,
        payment_provider: Arc<dyn PaymentProvider>,
        invoice_repo: Arc<dyn InvoiceRepository>,
        policy: RetryPolicy,
        slots: Arc<Semaphore>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            invoices,
            payment_provider,
            invoice_repo,
            policy,
            slots,
            shutdown,
        }
    }

    pub fn invoice_ids(&self) -> Vec<InvoiceId> {
        self.invoices.iter().map(|i| i.id).collect()
    }

    /// Charge every invoice of the batch, concurrently and in no particular order
    pub async fn execute(&self) -> BatchReport {
        let outcomes = join_all(self.invoices.iter().map(|i| self.charge_with_retry(i))).await;

        let mut report = BatchReport::default();
        for outcome in &outcomes {
            report.record(outcome);
        }

        info!(
            paid = report.paid.len(),
            exhausted = report.exhausted.len(),
            update_failed = report.update_failed.len(),
            cancelled = report.cancelled.len(),
            "Charge batch finished"
        );
        report
    }

    /// Drive one invoice through charge attempts until it is paid, the
    /// policy gives up, or the cycle is cancelled
    pub async fn charge_with_retry(&self, invoice: &Invoice) -> ChargeOutcome {
        let mut shutdown = self.shutdown.clone();
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_shutdown() {
                return ChargeOutcome::Cancelled {
                    invoice_id: invoice.id,
                    attempts: attempt,
                };
            }

            let charged = match self.attempt_charge(invoice, attempt).await {
                Some(charged) => charged,
                None => {
                    return ChargeOutcome::Cancelled {
                        invoice_id: invoice.id,
                        attempts: attempt,
                    }
                }
            };

            if charged {
                return self.mark_paid(invoice, attempt + 1).await;
            }

            match self.policy.should_retry(attempt) {
                RetryDecision::Retry(delay) => {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.wait() => {
                            info!(invoice_id = %invoice.id, "Retry cancelled");
                            return ChargeOutcome::Cancelled {
                                invoice_id: invoice.id,
                                attempts: attempt + 1,
                            };
                        }
                    }
                    attempt += 1;
                }
                RetryDecision::Exhausted => {
                    warn!(
                        invoice_id = %invoice.id,
                        attempts = attempt + 1,
                        "Giving up on invoice for this cycle, it stays PENDING"
                    );
                    return ChargeOutcome::Exhausted {
                        invoice_id: invoice.id,
                        attempts: attempt + 1,
                    };
                }
            }
        }
    }

    /// One payment call under a pool slot
    ///
    /// Returns `None` if the pool was closed (cycle stopped).
    async fn attempt_charge(&self, invoice: &Invoice, attempt: u32) -> Option<bool> {
        let _slot = self.slots.acquire().await.ok()?;

        let result = match self.policy.charge_timeout {
            Some(limit) => match timeout(limit, self.payment_provider.charge(invoice)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        invoice_id = %invoice.id,
                        attempt = attempt,
                        timeout_ms = limit.as_millis() as u64,
                        "Charge timed out"
                    );
                    return Some(false);
                }
            },
            None => self.payment_provider.charge(invoice).await,
        };

        match result {
            Ok(true) => Some(true),
            Ok(false) => {
                warn!(invoice_id = %invoice.id, attempt = attempt, "Charge declined");
                Some(false)
            }
            Err(e) => {
                warn!(invoice_id = %invoice.id, attempt = attempt, error = %e, "Charge failed");
                Some(false)
            }
        }
    }

    async fn mark_paid(&self, invoice: &Invoice, attempts: u32) -> ChargeOutcome {
        match self
            .invoice_repo
            .update_status(invoice.id, InvoiceStatus::Paid)
            .await
        {
            Ok(updated) => {
                info!(
                    invoice_id = %updated.id,
                    status = %updated.status,
                    amount = %updated.amount,
                    attempts = attempts,
                    "Invoice charged"
                );
                ChargeOutcome::Paid {
                    invoice: updated,
                    attempts,
                }
            }
            Err(e) => {
                // Charging again would bill the customer twice
                error!(
                    invoice_id = %invoice.id,
                    error = %e,
                    "Invoice charged but PAID update failed"
                );
                ChargeOutcome::UpdateFailed {
                    invoice_id: invoice.id,
                    attempts,
                    reason: e.to_string(),
                }
            }
        }
    }
}
